//! The static-file engine.
//!
//! On-disk layout: a property header (`name=value` lines, `0x0A`
//! terminated, closed by a single `0x00`) followed by entries, each an
//! escaped keyword, `0x0A`, an escaped description and a terminating
//! `0x00`. Entries are sorted under the dictionary's collation, which is
//! what makes the delimiter-framed binary search below work: any file
//! offset can be snapped back to the nearest record start, read, and
//! compared against the query.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use rand::Rng;

use crate::block::{open_block_file, BlockRead};
use crate::collation::{shared, Collation, SharedCollation};
use crate::dict::index::SparseIndex;
use crate::dict::{DictError, Dictionary, Lookup};
use crate::escape::{unescape, DATA_DELIMITER, WORD_DELIMITER};
use crate::shcm::Shcm;

enum Sense {
    Plain(String),
    /// Unescaped but still SHCM-compressed; decoded on first access.
    Packed(Vec<u8>),
}

enum Cursor {
    Unset,
    At { word: String, sense: Sense },
    End,
}

pub struct StaticDict {
    file: Box<dyn BlockRead>,
    file_name: String,
    name: String,
    properties: BTreeMap<String, String>,
    collation: SharedCollation,
    compressor: Option<Shcm>,
    index: SparseIndex,
    first_entry_pos: u64,
    last_entry_pos: u64,
    max_word_length: usize,
    max_entry_length: usize,
    curr_pos: u64,
    next_pos: Option<u64>,
    cursor: Cursor,
}

impl StaticDict {
    /// Open a dictionary file, plain or dictzip.
    ///
    /// `check_integrity` runs the trailer and index-anchor checks before
    /// returning; for large files this costs a handful of extra reads.
    pub fn open(path: &Path, check_integrity: bool) -> Result<Self, DictError> {
        let file = open_block_file(path)?;
        Self::from_block(file, path.to_string_lossy().into_owned(), check_integrity)
    }

    pub(crate) fn from_block(
        mut file: Box<dyn BlockRead>,
        file_name: String,
        check_integrity: bool,
    ) -> Result<Self, DictError> {
        let (raw_properties, first_entry_pos) = read_header(file.as_mut())?;

        let mut properties: BTreeMap<String, String> = BTreeMap::new();
        let mut shcm_tree: Option<Vec<u8>> = None;
        let mut index_value: Option<Vec<u8>> = None;
        for (name, value) in raw_properties {
            match name.as_str() {
                "index" => index_value = Some(value),
                "shcm-tree" => shcm_tree = Some(value),
                _ => {
                    properties.insert(name, String::from_utf8_lossy(&value).into_owned());
                }
            }
        }

        let name = properties.get("id").cloned().unwrap_or_default();
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

        let max_word_length = parse_limit(properties.get("max-word-length"), 50, 5);
        let max_entry_length = parse_limit(properties.get("max-entry-length"), 16384, 10);

        let method = properties
            .get("compression-method")
            .map(String::as_str)
            .unwrap_or("none");
        let compressor = if method == "shcm" {
            let tree = shcm_tree.ok_or_else(|| {
                DictError::Format("compression-method is shcm but shcm-tree is missing".into())
            })?;
            // Tolerate the doubly-escaped tree older writers produce: a raw
            // packed tree always contains a 0x00 (the count word's high
            // bytes), so a value without one is still escaped.
            let tree = if tree.contains(&0) {
                tree
            } else {
                unescape(&tree)
            };
            Some(Shcm::from_packed_tree(&tree)?)
        } else {
            None
        };

        let mut index = match index_value {
            Some(value) => SparseIndex::parse(&value, &collation),
            None => SparseIndex::empty(),
        };
        index.rebase(first_entry_pos);

        let size = file.size();
        if size < 2 || first_entry_pos >= size {
            return Err(DictError::Format("dictionary has no entries".into()));
        }

        let mut dict = Self {
            file,
            file_name,
            name,
            properties,
            collation: shared(collation),
            compressor,
            index,
            first_entry_pos,
            last_entry_pos: size - 2,
            max_word_length,
            max_entry_length,
            curr_pos: first_entry_pos,
            next_pos: None,
            cursor: Cursor::Unset,
        };

        // Locate the last record, tolerating a trailing editor-inserted
        // 0x0A after the final delimiter.
        dict.last_entry_pos = dict.find_prev(size - 2)?;
        let mut tail = [1u8; 2];
        dict.file.read(size - 2, &mut tail)?;
        if tail == [DATA_DELIMITER, WORD_DELIMITER] {
            dict.last_entry_pos = dict.find_prev(dict.last_entry_pos.saturating_sub(2))?;
        }

        if check_integrity {
            dict.check_integrity()?;
        }
        Ok(dict)
    }

    /// Position on the last entry.
    pub fn last_entry(&mut self) -> Result<bool, DictError> {
        self.read_entry(self.last_entry_pos)?;
        Ok(true)
    }

    /// Position on a uniformly drawn file offset, snapped forward to the
    /// next record start. Nearly uniform over entries when entry lengths
    /// do not vary wildly.
    pub fn random_entry(&mut self) -> Result<bool, DictError> {
        let offset = rand::thread_rng().gen_range(self.first_entry_pos..=self.last_entry_pos);
        let pos = self.find_next(offset)?.min(self.last_entry_pos);
        self.read_entry(pos)?;
        Ok(true)
    }

    /// The underlying block source, for I/O diagnostics.
    pub(crate) fn block(&self) -> &dyn BlockRead {
        self.file.as_ref()
    }

    /// Declared keyword length bound (`max-word-length` plus slack).
    pub fn max_word_length(&self) -> usize {
        self.max_word_length
    }

    /// Declared entry length bound (`max-entry-length` plus slack).
    pub fn max_entry_length(&self) -> usize {
        self.max_entry_length
    }

    /// The exposed property map (without the consumed `index` value).
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    fn cursor_word(&self) -> &str {
        match &self.cursor {
            Cursor::At { word, .. } => word,
            _ => "",
        }
    }

    /// Read the record starting at `pos` into the cursor. The keyword is
    /// decoded eagerly, the description lazily on first access.
    fn read_entry(&mut self, pos: u64) -> Result<(), DictError> {
        let pos = pos.min(self.last_entry_pos);
        self.curr_pos = pos;
        self.next_pos = None;

        let chunk = (self.max_entry_length / 4).max(1);
        let mut buf: Vec<u8> = Vec::with_capacity(chunk);
        let mut end = None;
        while buf.len() < self.max_entry_length {
            let want = chunk.min(self.max_entry_length - buf.len());
            let start = buf.len();
            buf.resize(start + want, 0);
            let n = self.file.read(pos + start as u64, &mut buf[start..])?;
            buf.truncate(start + n);
            if n == 0 {
                break;
            }
            if let Some(i) = buf[start..].iter().position(|&b| b == DATA_DELIMITER) {
                end = Some(start + i);
                break;
            }
        }
        let Some(end) = end else {
            return Err(DictError::Format(format!(
                "entry at offset {pos} exceeds max-entry-length"
            )));
        };

        let body = &buf[..end];
        let sep = body
            .iter()
            .position(|&b| b == WORD_DELIMITER)
            .ok_or_else(|| {
                DictError::Format(format!("entry at offset {pos} has no keyword delimiter"))
            })?;

        let word_raw = unescape(&body[..sep]);
        let sense_raw = unescape(&body[sep + 1..]);
        let (word, sense) = match &self.compressor {
            Some(codec) => (utf8(codec.decode(&word_raw)?)?, Sense::Packed(sense_raw)),
            None => (utf8(word_raw)?, Sense::Plain(utf8(sense_raw)?)),
        };

        self.next_pos = Some(pos + end as u64 + 1);
        self.cursor = Cursor::At { word, sense };
        Ok(())
    }

    /// Start offset of the most recent record at or before `pos`, clamped
    /// to the entry region. Scans backward in 256-byte windows for a
    /// delimiter.
    fn find_prev(&mut self, pos: u64) -> Result<u64, DictError> {
        if pos < self.first_entry_pos {
            return Ok(self.first_entry_pos);
        }
        let pos = pos.min(self.last_entry_pos);

        let mut buf = [0u8; 256];
        let mut n = pos;
        while n > self.first_entry_pos {
            let len = (n - self.first_entry_pos + 1).min(buf.len() as u64) as usize;
            let start = n - len as u64 + 1;
            let k = self.file.read(start, &mut buf[..len])?;
            if k != len {
                return Err(DictError::Format(
                    "short read while scanning for an entry start".into(),
                ));
            }
            for i in (0..len).rev() {
                if buf[i] == DATA_DELIMITER {
                    return Ok(start + i as u64 + 1);
                }
            }
            n = start - 1;
        }
        Ok(self.first_entry_pos)
    }

    /// Start offset of the first record strictly after the delimiter that
    /// follows `pos`. Out-of-range inputs clamp to the entry region.
    fn find_next(&mut self, pos: u64) -> Result<u64, DictError> {
        if pos < self.first_entry_pos {
            return Ok(self.first_entry_pos);
        }
        if pos > self.last_entry_pos {
            return Ok(self.last_entry_pos);
        }

        let mut buf = [0u8; 256];
        let mut pos = pos;
        loop {
            let n = self.file.read(pos, &mut buf)?;
            if n == 0 {
                return Err(DictError::Format(
                    "unterminated entry at end of file".into(),
                ));
            }
            if let Some(i) = buf[..n].iter().position(|&b| b == DATA_DELIMITER) {
                return Ok(pos + i as u64 + 1);
            }
            pos += n as u64;
        }
    }
}

impl Dictionary for StaticDict {
    fn name(&self) -> &str {
        &self.name
    }

    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn keyword(&self) -> Option<&str> {
        match &self.cursor {
            Cursor::At { word, .. } => Some(word),
            _ => None,
        }
    }

    fn description(&mut self) -> Result<Option<String>, DictError> {
        let compressor = &self.compressor;
        match &mut self.cursor {
            Cursor::At { sense, .. } => {
                if let Sense::Packed(bytes) = sense {
                    let codec = compressor.as_ref().ok_or_else(|| {
                        DictError::Format("compressed entry without a codec".into())
                    })?;
                    *sense = Sense::Plain(utf8(codec.decode(bytes)?)?);
                }
                match sense {
                    Sense::Plain(s) => Ok(Some(s.clone())),
                    Sense::Packed(_) => unreachable!("sense was just decoded"),
                }
            }
            _ => Ok(None),
        }
    }

    fn first_entry(&mut self) -> Result<bool, DictError> {
        self.read_entry(self.first_entry_pos)?;
        Ok(true)
    }

    fn next_entry(&mut self) -> Result<bool, DictError> {
        match self.cursor {
            Cursor::Unset => return self.first_entry(),
            Cursor::End => return Ok(false),
            Cursor::At { .. } => {}
        }

        let pos = match self.next_pos {
            Some(p) => p,
            None => self.find_next(self.curr_pos + 1)?,
        };
        let pos = pos.min(self.last_entry_pos);
        if pos == self.curr_pos {
            self.cursor = Cursor::End;
            return Ok(false);
        }
        self.read_entry(pos)?;
        Ok(true)
    }

    /// Index probe, then a binary search over the delimiter-framed
    /// records: snap the midpoint back to a record start, read it, compare
    /// canonized keywords, and shrink the interval until it collapses.
    fn find_entry(&mut self, word: &str) -> Result<Lookup, DictError> {
        let collation = Arc::clone(&self.collation);
        let coll = collation.read().unwrap();
        let query = coll.canonize(word);

        let (mut b, mut e) =
            self.index
                .probe(&query, &coll, self.first_entry_pos, self.last_entry_pos);

        let mut found = false;
        while b < e {
            let m = self.find_prev((b + e) / 2)?;
            self.read_entry(m)?;
            let cw = coll.canonize(self.cursor_word());
            match coll.compare(&query, &cw) {
                std::cmp::Ordering::Equal => {
                    found = true;
                    break;
                }
                std::cmp::Ordering::Less => {
                    // a snap onto the upper bound cannot shrink the interval
                    if self.curr_pos == e {
                        break;
                    }
                    e = self.curr_pos;
                }
                std::cmp::Ordering::Greater => b = self.find_next(m + 1)?,
            }
        }

        if !found {
            // the interval collapsed; the record at b is the nearest >=
            self.read_entry(b)?;
        }
        let cw = coll.canonize(self.cursor_word());
        let matches = found || coll.compare(&query, &cw) == std::cmp::Ordering::Equal;
        let subword = !matches && cw.starts_with(&query);
        Ok(Lookup { matches, subword })
    }

    fn at_end(&self) -> bool {
        matches!(self.cursor, Cursor::End)
    }

    fn property(&mut self, name: &str) -> Result<Option<String>, DictError> {
        Ok(self.properties.get(name).cloned())
    }

    fn collation(&self) -> SharedCollation {
        Arc::clone(&self.collation)
    }

    /// Trailer bytes plus seven evenly spaced index anchors: each anchor
    /// must sit one byte past a delimiter.
    fn check_integrity(&mut self) -> Result<(), DictError> {
        let size = self.file.size();
        let mut tail = [1u8; 2];
        self.file.read(size - 2, &mut tail)?;
        let clean = tail[1] == DATA_DELIMITER;
        let trailing_newline = tail[0] == DATA_DELIMITER && tail[1] == WORD_DELIMITER;
        if !clean && !trailing_newline {
            return Err(DictError::Integrity("bad trailer".into()));
        }

        let step = (self.index.len() / 7).max(1);
        for i in (0..self.index.len()).step_by(step) {
            let pos = self.index.anchors()[i].pos;
            let mut before = [12u8];
            self.file.read(pos - 1, &mut before)?;
            if before[0] != DATA_DELIMITER {
                return Err(DictError::Integrity(format!(
                    "index anchor at offset {pos} does not start an entry"
                )));
            }
        }
        Ok(())
    }
}

fn utf8(bytes: Vec<u8>) -> Result<String, DictError> {
    String::from_utf8(bytes).map_err(|_| DictError::Format("entry is not valid UTF-8".into()))
}

fn parse_limit(value: Option<&String>, default: usize, slack: usize) -> usize {
    match value.and_then(|s| s.trim().parse::<usize>().ok()) {
        Some(n) => n + slack,
        None => default,
    }
}

/// Read `name=value` lines until the `0x00` header terminator, returning
/// the unescaped pairs and the offset of the first entry.
fn read_header(file: &mut dyn BlockRead) -> Result<(Vec<(String, Vec<u8>)>, u64), DictError> {
    let mut properties = Vec::new();
    let mut pos = 0u64;
    loop {
        let Some(line) = read_header_line(file, &mut pos)? else {
            break;
        };
        let Some(eq) = line.iter().position(|&b| b == b'=') else {
            continue;
        };
        let name = utf8(unescape(&line[..eq]))?;
        let value = unescape(&line[eq + 1..]);
        properties.push((name, value));
    }
    Ok((properties, pos))
}

/// One header line, or `None` at the header terminator.
fn read_header_line(
    file: &mut dyn BlockRead,
    pos: &mut u64,
) -> Result<Option<Vec<u8>>, DictError> {
    let mut line = Vec::new();
    let mut buf = [0u8; 256];
    loop {
        let n = file.read(*pos, &mut buf)?;
        if n == 0 {
            return Err(DictError::Format("unterminated dictionary header".into()));
        }
        for (i, &b) in buf[..n].iter().enumerate() {
            match b {
                DATA_DELIMITER => {
                    *pos += i as u64 + 1;
                    return Ok(None);
                }
                WORD_DELIMITER => {
                    line.extend_from_slice(&buf[..i]);
                    *pos += i as u64 + 1;
                    return Ok(Some(line));
                }
                _ => {}
            }
        }
        line.extend_from_slice(&buf[..n]);
        *pos += n as u64;
    }
}
