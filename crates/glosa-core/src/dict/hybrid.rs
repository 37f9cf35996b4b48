//! The hybrid overlay: a small editable dictionary on top of a large
//! static one.
//!
//! Both sides keep their own cursor; the overlay tracks which side is
//! currently in front. The order is recomputed lazily by comparing the two
//! current keywords under the dynamic side's collation, with an exhausted
//! side sorting last. When both sides sit on the same canonized keyword
//! the dynamic entry shadows the static one — shadowing happens at
//! iteration time, never by touching the static file.

use std::cell::Cell;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use crate::collation::SharedCollation;
use crate::dict::{DictError, Dictionary, EditableDictionary, Lookup, SqlDict, StaticDict};

#[derive(Clone, Copy, PartialEq, Eq)]
enum MergeOrder {
    NoOrder,
    StaticFirst,
    DynamicFirst,
    BothSame,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Static,
    Dynamic,
}

pub struct HybridDict {
    static_dic: StaticDict,
    dynamic_dic: SqlDict,
    order: Cell<MergeOrder>,
}

impl HybridDict {
    /// Load an overlay: `name.hdic` is the dynamic side, its sibling
    /// `name.dic.dz` the static side.
    pub fn load(path: &Path) -> Result<Self, DictError> {
        let static_path = Self::static_sibling(path)?;
        let dynamic_dic = SqlDict::load(path)?;
        let static_dic = StaticDict::open(&static_path, false)?;
        Ok(Self {
            static_dic,
            dynamic_dic,
            order: Cell::new(MergeOrder::NoOrder),
        })
    }

    /// Create the dynamic overlay for an already-open static dictionary,
    /// copying its collation configuration so both sides sort identically.
    pub fn create(path: &Path, mut static_dic: StaticDict) -> Result<Self, DictError> {
        let mut dynamic_dic = SqlDict::create(path, static_dic.name())?;

        if let Some(precedence) = static_dic.property("char-precedence")? {
            dynamic_dic.set_property("collation", &precedence)?;
        }
        if let Some(ignore) = static_dic.property("search-ignore-chars")? {
            let ignore = if ignore.is_empty() { "-." } else { &ignore };
            dynamic_dic.set_property("search-ignore-chars", ignore)?;
        }

        Ok(Self {
            static_dic,
            dynamic_dic,
            order: Cell::new(MergeOrder::NoOrder),
        })
    }

    fn static_sibling(path: &Path) -> Result<PathBuf, DictError> {
        let name = path.to_string_lossy();
        let Some(base) = name.strip_suffix(".hdic") else {
            return Err(DictError::Format(format!(
                "{name}: hybrid dictionaries use the .hdic suffix"
            )));
        };
        Ok(PathBuf::from(format!("{base}.dic.dz")))
    }

    /// Which side's cursor is in front, deciding the order first if an
    /// advance invalidated it.
    fn leading_side(&self) -> Side {
        if self.order.get() == MergeOrder::NoOrder {
            let order = {
                let collation = self.dynamic_dic.collation();
                let coll = collation.read().unwrap();
                match (self.static_dic.keyword(), self.dynamic_dic.keyword()) {
                    (None, _) => MergeOrder::DynamicFirst,
                    (Some(_), None) => MergeOrder::StaticFirst,
                    (Some(s), Some(d)) => {
                        match coll.compare(&coll.canonize(s), &coll.canonize(d)) {
                            Ordering::Less => MergeOrder::StaticFirst,
                            Ordering::Greater => MergeOrder::DynamicFirst,
                            // the dynamic entry shadows the static one
                            Ordering::Equal => MergeOrder::BothSame,
                        }
                    }
                }
            };
            self.order.set(order);
        }
        match self.order.get() {
            MergeOrder::StaticFirst => Side::Static,
            _ => Side::Dynamic,
        }
    }
}

impl Dictionary for HybridDict {
    fn name(&self) -> &str {
        self.static_dic.name()
    }

    fn file_name(&self) -> &str {
        self.dynamic_dic.file_name()
    }

    fn keyword(&self) -> Option<&str> {
        match self.leading_side() {
            Side::Static => self.static_dic.keyword(),
            Side::Dynamic => self.dynamic_dic.keyword(),
        }
    }

    fn description(&mut self) -> Result<Option<String>, DictError> {
        match self.leading_side() {
            Side::Static => self.static_dic.description(),
            Side::Dynamic => self.dynamic_dic.description(),
        }
    }

    fn first_entry(&mut self) -> Result<bool, DictError> {
        self.static_dic.first_entry()?;
        self.dynamic_dic.first_entry()?;
        self.order.set(MergeOrder::NoOrder);
        Ok(!self.at_end())
    }

    fn next_entry(&mut self) -> Result<bool, DictError> {
        match self.leading_side() {
            Side::Static => {
                self.static_dic.next_entry()?;
            }
            Side::Dynamic => {
                self.dynamic_dic.next_entry()?;
                if self.order.get() == MergeOrder::BothSame {
                    self.static_dic.next_entry()?;
                }
            }
        }
        self.order.set(MergeOrder::NoOrder);
        Ok(!self.at_end())
    }

    /// Search both sides and compose: a hit on either side is a hit.
    fn find_entry(&mut self, word: &str) -> Result<Lookup, DictError> {
        let on_static = self.static_dic.find_entry(word)?;
        let on_dynamic = self.dynamic_dic.find_entry(word)?;
        self.order.set(MergeOrder::NoOrder);
        Ok(Lookup {
            matches: on_static.matches || on_dynamic.matches,
            subword: on_static.subword || on_dynamic.subword,
        })
    }

    fn at_end(&self) -> bool {
        self.static_dic.at_end() && self.dynamic_dic.at_end()
    }

    /// Dynamic properties win; empty or missing values fall back to the
    /// static header.
    fn property(&mut self, name: &str) -> Result<Option<String>, DictError> {
        if let Some(value) = self.dynamic_dic.property(name)? {
            if !value.is_empty() {
                return Ok(Some(value));
            }
        }
        self.static_dic.property(name)
    }

    fn collation(&self) -> SharedCollation {
        self.dynamic_dic.collation()
    }

    fn is_dynamic(&self) -> bool {
        true
    }

    fn is_meta_editable(&self) -> bool {
        false
    }
}

impl EditableDictionary for HybridDict {
    fn insert_entry(&mut self, keyword: &str) -> Result<(), DictError> {
        self.order.set(MergeOrder::NoOrder);
        self.dynamic_dic.insert_entry(keyword)
    }

    /// Updating an entry that only exists on the static side first
    /// materializes it into the dynamic side, where the new description
    /// then shadows the static one.
    fn update_entry(&mut self, keyword: &str, description: &str) -> Result<(), DictError> {
        if !self.dynamic_dic.find_entry(keyword)?.matches {
            self.dynamic_dic.insert_entry(keyword)?;
        }
        self.order.set(MergeOrder::NoOrder);
        self.dynamic_dic.update_entry(keyword, description)
    }

    fn remove_entry(&mut self, keyword: &str) -> Result<(), DictError> {
        self.order.set(MergeOrder::NoOrder);
        self.dynamic_dic.remove_entry(keyword)
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), DictError> {
        self.dynamic_dic.set_property(name, value)
    }
}
