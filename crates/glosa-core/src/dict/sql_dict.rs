//! The editable SQLite-backed engine.
//!
//! Two tables: `entries` keyed by keyword, and a `properties` tag/value
//! map. Ordering is delegated to the store through a collation callback
//! named `bedic` (the name existing dictionary databases were created
//! with), registered at connection open; it canonizes both sides and
//! compares them under the shared [`Collation`]. Range scans over the
//! keyword column therefore walk in exactly the order the static format
//! is sorted in, which is what lets the hybrid overlay merge the two.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension};

use crate::collation::{shared, Collation, SharedCollation};
use crate::dict::{DictError, Dictionary, EditableDictionary, Lookup};

/// Precedence installed when a freshly created dictionary has no collation
/// of its own: digits, then case-insensitive Latin letter groups.
const DEFAULT_COLLATION: &str = "0123456789{Aa}{Bb}{Cc}{Dd}{Ee}{Ff}{Gg}{Hh}{Ii}{Jj}{Kk}{Ll}\
                                 {Mm}{Nn}{Oo}{Pp}{Qq}{Rr}{Ss}{Tt}{Uu}{Vv}{Ww}{Xx}{Yy}{Zz}";

const SCHEMA: &str = "\
CREATE TABLE entries (
  keyword varchar(200) PRIMARY KEY COLLATE bedic,
  description varchar(1024000),
  create_date int,
  modif_date int );
CREATE TABLE properties (
  tag varchar(200) PRIMARY KEY,
  value varchar(1024000) );";

enum Cursor {
    Unset,
    At {
        keyword: String,
        description: Option<String>,
    },
    End,
}

pub struct SqlDict {
    conn: Connection,
    name: String,
    file_name: String,
    collation: SharedCollation,
    cursor: Cursor,
}

impl SqlDict {
    /// Open an existing dictionary database.
    pub fn load(path: &Path) -> Result<Self, DictError> {
        if !path.exists() {
            return Err(DictError::Format(format!(
                "{}: no such dictionary",
                path.display()
            )));
        }
        let mut dict = Self::open_connection(path)?;
        dict.bind()?;
        Ok(dict)
    }

    /// Create a new dictionary database. Refuses to overwrite an existing
    /// file. The store starts with the default collation; overlays replace
    /// it before inserting anything.
    pub fn create(path: &Path, name: &str) -> Result<Self, DictError> {
        if path.exists() {
            return Err(DictError::Format(format!(
                "{}: file exists",
                path.display()
            )));
        }
        let mut dict = Self::open_connection(path)?;
        dict.conn.execute_batch(SCHEMA)?;
        dict.set_property("id", name)?;
        dict.set_property("collation", DEFAULT_COLLATION)?;
        // a non-empty collation makes this property required for bind()
        dict.set_property("search-ignore-chars", "")?;
        dict.set_property("glosa-version", env!("CARGO_PKG_VERSION"))?;
        dict.bind()?;
        Ok(dict)
    }

    fn open_connection(path: &Path) -> Result<Self, DictError> {
        let conn = Connection::open(path)?;
        let collation = shared(Collation::default());

        let callback_collation = Arc::clone(&collation);
        conn.create_collation("bedic", move |a, b| {
            let coll = callback_collation.read().unwrap();
            coll.compare(&coll.canonize(a), &coll.canonize(b))
        })?;

        Ok(Self {
            conn,
            name: String::new(),
            file_name: path.to_string_lossy().into_owned(),
            collation,
            cursor: Cursor::Unset,
        })
    }

    /// Bind the engine to the store's properties: `id` is required, the
    /// `collation` and `search-ignore-chars` properties configure the
    /// comparator the `bedic` callback consults.
    fn bind(&mut self) -> Result<(), DictError> {
        let id = self
            .get_property("id")?
            .filter(|v| !v.is_empty())
            .ok_or_else(|| DictError::Format("dictionary has no 'id' property".into()))?;
        self.name = id;

        let collation_def = self.get_property("collation")?.unwrap_or_default();
        let ignore = self.get_property("search-ignore-chars")?.unwrap_or_default();
        *self.collation.write().unwrap() = Collation::new(&collation_def, &ignore);
        Ok(())
    }

    fn get_property(&self, name: &str) -> Result<Option<String>, DictError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT value FROM properties WHERE tag = ?1")?;
        Ok(stmt
            .query_row([name], |row| row.get::<_, Option<String>>(0))
            .optional()?
            .flatten())
    }

    /// First keyword after `keyword` in collation order; `or_same` makes
    /// the bound inclusive. `None` past the last entry.
    fn scan_next(&self, keyword: &str, or_same: bool) -> Result<Option<String>, DictError> {
        let sql = if or_same {
            "SELECT keyword FROM entries WHERE keyword >= ?1 ORDER BY keyword LIMIT 1"
        } else {
            "SELECT keyword FROM entries WHERE keyword > ?1 ORDER BY keyword LIMIT 1"
        };
        let mut stmt = self.conn.prepare_cached(sql)?;
        Ok(stmt
            .query_row([keyword], |row| row.get::<_, String>(0))
            .optional()?)
    }

    fn unix_now() -> i64 {
        time::OffsetDateTime::now_utc().unix_timestamp()
    }
}

impl Dictionary for SqlDict {
    fn name(&self) -> &str {
        &self.name
    }

    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn keyword(&self) -> Option<&str> {
        match &self.cursor {
            Cursor::At { keyword, .. } => Some(keyword),
            _ => None,
        }
    }

    fn description(&mut self) -> Result<Option<String>, DictError> {
        let Cursor::At {
            keyword,
            description,
        } = &mut self.cursor
        else {
            return Ok(None);
        };
        if description.is_none() {
            let mut stmt = self
                .conn
                .prepare_cached("SELECT description FROM entries WHERE keyword = ?1")?;
            let fetched = stmt
                .query_row([keyword.as_str()], |row| row.get::<_, Option<String>>(0))
                .optional()?;
            // a NULL column reads as empty; a vanished row as no description
            match fetched {
                Some(value) => *description = Some(value.unwrap_or_default()),
                None => return Ok(None),
            }
        }
        Ok(description.clone())
    }

    fn first_entry(&mut self) -> Result<bool, DictError> {
        match self.scan_next("", false)? {
            Some(keyword) => {
                self.cursor = Cursor::At {
                    keyword,
                    description: None,
                };
                Ok(true)
            }
            None => {
                self.cursor = Cursor::End;
                Ok(false)
            }
        }
    }

    fn next_entry(&mut self) -> Result<bool, DictError> {
        let current = match &self.cursor {
            Cursor::Unset => return self.first_entry(),
            Cursor::End => return Ok(false),
            Cursor::At { keyword, .. } => keyword.clone(),
        };
        match self.scan_next(&current, false)? {
            Some(keyword) => {
                self.cursor = Cursor::At {
                    keyword,
                    description: None,
                };
                Ok(true)
            }
            None => {
                self.cursor = Cursor::End;
                Ok(false)
            }
        }
    }

    fn find_entry(&mut self, word: &str) -> Result<Lookup, DictError> {
        match self.scan_next(word, true)? {
            Some(found) => {
                let coll = self.collation.read().unwrap();
                let query = coll.canonize(word);
                let canon = coll.canonize(&found);
                let matches = coll.compare(&query, &canon) == Ordering::Equal;
                let subword = !matches && canon.starts_with(&query);
                drop(coll);
                self.cursor = Cursor::At {
                    keyword: found,
                    description: None,
                };
                Ok(Lookup { matches, subword })
            }
            None => {
                self.cursor = Cursor::End;
                Ok(Lookup {
                    matches: false,
                    subword: false,
                })
            }
        }
    }

    fn at_end(&self) -> bool {
        matches!(self.cursor, Cursor::End)
    }

    fn property(&mut self, name: &str) -> Result<Option<String>, DictError> {
        self.get_property(name)
    }

    fn collation(&self) -> SharedCollation {
        Arc::clone(&self.collation)
    }

    fn is_dynamic(&self) -> bool {
        true
    }

    fn is_meta_editable(&self) -> bool {
        true
    }
}

impl EditableDictionary for SqlDict {
    fn insert_entry(&mut self, keyword: &str) -> Result<(), DictError> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO entries (keyword, create_date, modif_date) VALUES (?1, ?2, ?2)",
        )?;
        stmt.execute(rusqlite::params![keyword, Self::unix_now()])?;
        drop(stmt);
        self.cursor = Cursor::At {
            keyword: keyword.to_owned(),
            description: None,
        };
        Ok(())
    }

    fn update_entry(&mut self, keyword: &str, description: &str) -> Result<(), DictError> {
        let mut stmt = self.conn.prepare_cached(
            "UPDATE entries SET description = ?2, modif_date = ?3 WHERE keyword = ?1",
        )?;
        stmt.execute(rusqlite::params![keyword, description, Self::unix_now()])?;
        drop(stmt);
        // drop a stale cached description if the cursor sits on this entry
        if let Cursor::At {
            keyword: at,
            description: cached,
        } = &mut self.cursor
        {
            if at == keyword {
                *cached = None;
            }
        }
        Ok(())
    }

    fn remove_entry(&mut self, keyword: &str) -> Result<(), DictError> {
        let mut stmt = self
            .conn
            .prepare_cached("DELETE FROM entries WHERE keyword = ?1")?;
        stmt.execute([keyword])?;
        Ok(())
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), DictError> {
        let mut stmt = self
            .conn
            .prepare_cached("INSERT OR REPLACE INTO properties (tag, value) VALUES (?1, ?2)")?;
        stmt.execute([name, value])?;
        drop(stmt);
        // collation changes take effect immediately so overlays can
        // configure a store they just created
        if name == "collation" || name == "search-ignore-chars" {
            self.bind()?;
        }
        Ok(())
    }
}
