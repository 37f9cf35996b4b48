//! Offline writer for the static dictionary format.
//!
//! The builder takes a parsed entry list plus header properties,
//! canonicalizes and sorts the entries under the dictionary's collation,
//! computes the sparse position index, and streams out the header and the
//! entry region. With SHCM enabled it first runs the frequency pass over
//! every keyword and description, then stores each field encoded and
//! escaped, with the packed tree in the `shcm-tree` property.

use std::collections::{BTreeMap, HashSet};
use std::io::{self, Write};

use tracing::warn;

use crate::collation::Collation;
use crate::dict::DictError;
use crate::escape::{escape, DATA_DELIMITER, WORD_DELIMITER};
use crate::shcm::{Shcm, ShcmBuilder, ShcmError};

/// A new index anchor is emitted once the entry region has grown this many
/// bytes past the previous anchor.
pub const INDEX_STRIDE: i64 = 32768;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMethod {
    #[default]
    None,
    Shcm,
}

impl CompressionMethod {
    fn property_value(self) -> &'static str {
        match self {
            CompressionMethod::None => "none",
            CompressionMethod::Shcm => "shcm",
        }
    }
}

impl std::str::FromStr for CompressionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(CompressionMethod::None),
            "shcm" => Ok(CompressionMethod::Shcm),
            other => Err(format!("unknown compression method '{other}'")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("{0}")]
    Usage(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Dict(#[from] DictError),

    #[error("compression error: {0}")]
    Shcm(#[from] ShcmError),
}

#[derive(Debug, Default)]
pub struct BuildStats {
    pub entries: usize,
    /// Entries whose canonized keyword collided with their predecessor.
    /// Collisions are warnings, never errors.
    pub duplicates: usize,
    pub index_anchors: usize,
    pub data_size: u64,
}

struct BuildEntry {
    word: String,
    canon: Vec<u16>,
    stored_word: Vec<u8>,
    stored_sense: Vec<u8>,
}

/// Sort `entries` and write a complete static dictionary to `out`.
///
/// `properties` must carry `id`; `char-precedence` and
/// `search-ignore-chars` configure the collation with the same defaulting
/// the reader applies (no precedence means `-.` is ignored). The length
/// bounds, `compression-method`, `index`, `dict-size`, `items` and
/// `builddate` properties are stamped here and override anything passed
/// in.
pub fn build_static(
    entries: Vec<(String, String)>,
    mut properties: BTreeMap<String, String>,
    compression: CompressionMethod,
    out: &mut dyn Write,
) -> Result<BuildStats, BuildError> {
    if !properties.contains_key("id") {
        return Err(BuildError::Usage(
            "missing required 'id' property in the header".into(),
        ));
    }
    if entries.is_empty() {
        return Err(BuildError::Usage("the source contains no entries".into()));
    }

    let precedence = properties
        .get("char-precedence")
        .cloned()
        .unwrap_or_default();
    let mut ignore = properties
        .get("search-ignore-chars")
        .cloned()
        .unwrap_or_default();
    if ignore.is_empty() {
        ignore = if precedence.is_empty() {
            "-.".to_owned()
        } else {
            String::new()
        };
        properties.insert("search-ignore-chars".to_owned(), ignore.clone());
    }
    let collation = Collation::new(&precedence, &ignore);

    let codec = match compression {
        CompressionMethod::Shcm => {
            let mut model = ShcmBuilder::new();
            for (word, sense) in &entries {
                model.accumulate(word.as_bytes());
                model.accumulate(sense.as_bytes());
            }
            Some(model.finish()?)
        }
        CompressionMethod::None => None,
    };

    let mut warned: HashSet<char> = HashSet::new();
    let mut sorted: Vec<BuildEntry> = Vec::with_capacity(entries.len());
    for (word, sense) in &entries {
        if collation.uses_char_precedence() {
            for ch in word.chars() {
                if warned.insert(ch) && !collation.covers(ch) {
                    warn!(
                        "character '{ch}' is missing from both search-ignore-chars \
                         and char-precedence (entry '{word}')"
                    );
                }
            }
        }
        let (stored_word, stored_sense) = stored_fields(word, sense, codec.as_ref())?;
        sorted.push(BuildEntry {
            word: word.clone(),
            canon: collation.canonize(word),
            stored_word,
            stored_sense,
        });
    }

    sorted.sort_by(|a, b| collation.compare(&a.canon, &b.canon));

    let mut stats = BuildStats {
        entries: sorted.len(),
        ..BuildStats::default()
    };
    for pair in sorted.windows(2) {
        if collation.compare(&pair[0].canon, &pair[1].canon) == std::cmp::Ordering::Equal {
            warn!("duplicate entry '{}'", pair[1].word);
            stats.duplicates += 1;
        }
    }

    let mut max_word_length = 0usize;
    let mut max_entry_length = 0usize;
    let mut offsets = Vec::with_capacity(sorted.len());
    let mut data_size = 0u64;
    for entry in &sorted {
        let record_len = entry.stored_word.len() + entry.stored_sense.len() + 2;
        max_word_length = max_word_length.max(entry.stored_word.len());
        max_entry_length = max_entry_length.max(record_len);
        offsets.push(data_size);
        data_size += record_len as u64;
    }
    stats.data_size = data_size;

    // One anchor per INDEX_STRIDE bytes of entry data; the last entry never
    // gets one. The seed puts the first entry in the index unconditionally.
    let mut index_value: Vec<u8> = Vec::new();
    let mut last_anchor = -INDEX_STRIDE - 1;
    for (entry, &offset) in sorted.iter().zip(&offsets).take(sorted.len() - 1) {
        if last_anchor + INDEX_STRIDE < offset as i64 {
            index_value.push(DATA_DELIMITER);
            index_value.extend_from_slice(entry.word.as_bytes());
            index_value.push(WORD_DELIMITER);
            index_value.extend_from_slice(offset.to_string().as_bytes());
            last_anchor = offset as i64;
            stats.index_anchors += 1;
        }
    }

    properties.insert("max-entry-length".to_owned(), max_entry_length.to_string());
    properties.insert("max-word-length".to_owned(), max_word_length.to_string());
    properties.insert(
        "compression-method".to_owned(),
        compression.property_value().to_owned(),
    );
    properties.insert("dict-size".to_owned(), data_size.to_string());
    properties.insert("items".to_owned(), sorted.len().to_string());
    if let Ok(stamp) =
        time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc2822)
    {
        properties.insert("builddate".to_owned(), stamp);
    }

    let mut wire: BTreeMap<String, Vec<u8>> = properties
        .into_iter()
        .map(|(name, value)| (name, value.into_bytes()))
        .collect();
    wire.remove("shcm-tree");
    if let Some(codec) = &codec {
        // stored with one redundant escape pass, as existing files have it;
        // the reader strips both
        wire.insert("shcm-tree".to_owned(), escape(&codec.packed_tree()));
    }
    if index_value.is_empty() {
        wire.remove("index");
    } else {
        wire.insert("index".to_owned(), index_value);
    }

    for (name, value) in &wire {
        out.write_all(&escape(name.as_bytes()))?;
        out.write_all(b"=")?;
        out.write_all(&escape(value))?;
        out.write_all(&[WORD_DELIMITER])?;
    }
    out.write_all(&[DATA_DELIMITER])?;

    for entry in &sorted {
        out.write_all(&entry.stored_word)?;
        out.write_all(&[WORD_DELIMITER])?;
        out.write_all(&entry.stored_sense)?;
        out.write_all(&[DATA_DELIMITER])?;
    }
    out.flush()?;

    Ok(stats)
}

fn stored_fields(
    word: &str,
    sense: &str,
    codec: Option<&Shcm>,
) -> Result<(Vec<u8>, Vec<u8>), BuildError> {
    Ok(match codec {
        Some(codec) => (
            escape(&codec.encode(word.as_bytes())?),
            escape(&codec.encode(sense.as_bytes())?),
        ),
        None => (escape(word.as_bytes()), escape(sense.as_bytes())),
    })
}
