//! Dictionary engines and the capability surface they share.
//!
//! [`StaticDict`] serves the read-only on-disk format, [`SqlDict`] is the
//! editable SQLite store, and [`HybridDict`] overlays the two. The
//! [`Dictionary`] trait is the read capability set; [`EditableDictionary`]
//! extends it with mutation. [`open_dictionary`] picks the backend from the
//! file name suffix.

mod hybrid;
mod index;
mod sql_dict;
mod static_dict;
#[cfg(test)]
mod tests;

pub use hybrid::HybridDict;
pub use sql_dict::SqlDict;
pub use static_dict::StaticDict;

use std::io;
use std::path::Path;

use crate::collation::SharedCollation;
use crate::shcm::ShcmError;

/// Unified error type for every engine.
///
/// Covers block-file I/O, on-disk format violations, integrity checks,
/// SHCM decoding and the SQLite layer, so one `Result` type flows through
/// the whole capability surface.
#[derive(Debug, thiserror::Error)]
pub enum DictError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("format error: {0}")]
    Format(String),

    #[error("integrity failure: {0}")]
    Integrity(String),

    #[error("inflate error: {0}")]
    Inflate(String),

    #[error("compression error: {0}")]
    Shcm(#[from] ShcmError),

    #[error("storage error: {0}")]
    Sql(#[from] rusqlite::Error),
}

/// Result of a lookup: whether the cursor landed on an exact match, and
/// whether the found keyword extends the query (a strict prefix hit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookup {
    pub matches: bool,
    pub subword: bool,
}

/// The read capability set every backend offers.
///
/// Each engine owns one cursor. Movement operations position it;
/// [`keyword`](Self::keyword) and [`description`](Self::description) read
/// it. A cursor that has walked past the last entry is *at end*:
/// `keyword()` returns `None` and `next_entry` keeps returning `false`.
pub trait Dictionary {
    /// The dictionary name from the `id` property.
    fn name(&self) -> &str;

    fn file_name(&self) -> &str;

    /// Keyword under the cursor; `None` at end or before first positioning.
    fn keyword(&self) -> Option<&str>;

    /// Description under the cursor. Decoded lazily where the backend
    /// stores it compressed or out-of-row.
    fn description(&mut self) -> Result<Option<String>, DictError>;

    /// Position on the first entry. Returns `false` for an empty
    /// dictionary.
    fn first_entry(&mut self) -> Result<bool, DictError>;

    /// Advance the cursor. Returns `false` once the cursor is at end.
    fn next_entry(&mut self) -> Result<bool, DictError>;

    /// Backward iteration is not supported by any current backend.
    fn previous_entry(&mut self) -> Result<bool, DictError> {
        Ok(false)
    }

    /// Position the cursor at the first entry whose canonized keyword is
    /// `>=` the canonized query.
    fn find_entry(&mut self, word: &str) -> Result<Lookup, DictError>;

    fn at_end(&self) -> bool;

    fn property(&mut self, name: &str) -> Result<Option<String>, DictError>;

    /// The collation this engine orders by, shareable with overlays and
    /// store callbacks.
    fn collation(&self) -> SharedCollation;

    fn check_integrity(&mut self) -> Result<(), DictError> {
        Ok(())
    }

    fn is_dynamic(&self) -> bool {
        false
    }

    /// Whether properties may be edited; implies [`is_dynamic`](Self::is_dynamic).
    fn is_meta_editable(&self) -> bool {
        false
    }
}

/// Mutation capabilities of the dynamic backends.
pub trait EditableDictionary: Dictionary {
    /// Insert a keyword with no description yet and position the cursor on
    /// it. Fails if the keyword already exists.
    fn insert_entry(&mut self, keyword: &str) -> Result<(), DictError>;

    /// Set the description of an existing keyword.
    fn update_entry(&mut self, keyword: &str, description: &str) -> Result<(), DictError>;

    fn remove_entry(&mut self, keyword: &str) -> Result<(), DictError>;

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), DictError>;
}

/// A dictionary opened by [`open_dictionary`]: the backend is picked from
/// the file suffix, and editing is exposed only where the backend has it.
pub enum AnyDictionary {
    Static(StaticDict),
    Dynamic(SqlDict),
    Hybrid(HybridDict),
}

/// Open `path`, selecting the backend by suffix: `.edic` is a dynamic
/// dictionary, `.hdic` a hybrid overlay, anything else the static format
/// (plain or dictzip). `check_integrity` runs the static trailer/anchor
/// check at open; it can be slow for large files.
pub fn open_dictionary(path: &Path, check_integrity: bool) -> Result<AnyDictionary, DictError> {
    let name = path.to_string_lossy();
    if name.ends_with(".edic") {
        Ok(AnyDictionary::Dynamic(SqlDict::load(path)?))
    } else if name.ends_with(".hdic") {
        Ok(AnyDictionary::Hybrid(HybridDict::load(path)?))
    } else {
        Ok(AnyDictionary::Static(StaticDict::open(
            path,
            check_integrity,
        )?))
    }
}

impl AnyDictionary {
    fn inner(&self) -> &dyn Dictionary {
        match self {
            AnyDictionary::Static(d) => d,
            AnyDictionary::Dynamic(d) => d,
            AnyDictionary::Hybrid(d) => d,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Dictionary {
        match self {
            AnyDictionary::Static(d) => d,
            AnyDictionary::Dynamic(d) => d,
            AnyDictionary::Hybrid(d) => d,
        }
    }

    /// The editing surface, where the backend has one.
    pub fn as_editable(&mut self) -> Option<&mut dyn EditableDictionary> {
        match self {
            AnyDictionary::Static(_) => None,
            AnyDictionary::Dynamic(d) => Some(d),
            AnyDictionary::Hybrid(d) => Some(d),
        }
    }
}

impl Dictionary for AnyDictionary {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn file_name(&self) -> &str {
        self.inner().file_name()
    }

    fn keyword(&self) -> Option<&str> {
        self.inner().keyword()
    }

    fn description(&mut self) -> Result<Option<String>, DictError> {
        self.inner_mut().description()
    }

    fn first_entry(&mut self) -> Result<bool, DictError> {
        self.inner_mut().first_entry()
    }

    fn next_entry(&mut self) -> Result<bool, DictError> {
        self.inner_mut().next_entry()
    }

    fn find_entry(&mut self, word: &str) -> Result<Lookup, DictError> {
        self.inner_mut().find_entry(word)
    }

    fn at_end(&self) -> bool {
        self.inner().at_end()
    }

    fn property(&mut self, name: &str) -> Result<Option<String>, DictError> {
        self.inner_mut().property(name)
    }

    fn collation(&self) -> SharedCollation {
        self.inner().collation()
    }

    fn check_integrity(&mut self) -> Result<(), DictError> {
        self.inner_mut().check_integrity()
    }

    fn is_dynamic(&self) -> bool {
        self.inner().is_dynamic()
    }

    fn is_meta_editable(&self) -> bool {
        self.inner().is_meta_editable()
    }
}
