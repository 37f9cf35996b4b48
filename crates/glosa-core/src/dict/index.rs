//! Sparse position index parsed from the `index` header property.
//!
//! One anchor per ~32 KiB of entry data: the anchor's canonized keyword
//! compares `<=` the entry at its offset, and the following anchor's
//! keyword compares `>`, so a binary search over the anchors pins the file
//! region a query can live in.

use std::cmp::Ordering;

use tracing::debug;

use crate::collation::{CanonizedWord, Collation};
use crate::escape::WORD_DELIMITER;

pub(crate) struct IndexAnchor {
    pub word: CanonizedWord,
    pub pos: u64,
}

pub(crate) struct SparseIndex {
    anchors: Vec<IndexAnchor>,
}

impl SparseIndex {
    pub fn empty() -> Self {
        Self {
            anchors: Vec::new(),
        }
    }

    /// Parse the property value: a sequence of `0x00`-prefixed records,
    /// each `keyword '\n' ascii-offset`. A single malformed record
    /// discards the whole index; lookups still work, just without the
    /// probe.
    pub fn parse(value: &[u8], collation: &Collation) -> Self {
        let mut anchors = Vec::new();
        for record in value.split(|&b| b == 0) {
            if record.is_empty() {
                continue;
            }
            let parsed = parse_record(record, collation);
            let Some(anchor) = parsed else {
                debug!("discarding malformed sparse index");
                return Self::empty();
            };
            anchors.push(anchor);
        }
        Self { anchors }
    }

    /// Shift anchor offsets by the header length: on disk they are
    /// relative to the start of the entry region.
    pub fn rebase(&mut self, first_entry_pos: u64) {
        for anchor in &mut self.anchors {
            anchor.pos += first_entry_pos;
        }
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn anchors(&self) -> &[IndexAnchor] {
        &self.anchors
    }

    /// Narrow `[lo, hi]` to the region between the two anchors that
    /// bracket `word`. With fewer than two anchors the bounds pass
    /// through unchanged.
    pub fn probe(
        &self,
        word: &CanonizedWord,
        collation: &Collation,
        lo: u64,
        hi: u64,
    ) -> (u64, u64) {
        if self.anchors.len() <= 1 {
            return (lo, hi);
        }

        let mut ib = 0usize;
        let mut ie = self.anchors.len() - 1;
        let mut m = 0usize;
        while ib < ie {
            m = (ib + ie) / 2;
            match collation.compare(word, &self.anchors[m].word) {
                Ordering::Equal => break,
                Ordering::Less => ie = m,
                Ordering::Greater => {
                    ib = m + 1;
                    m += 1;
                }
            }
        }
        debug_assert!(m < self.anchors.len());

        if m > 0 && collation.compare(word, &self.anchors[m].word) == Ordering::Less {
            m -= 1;
        }
        let b = self.anchors[m].pos;
        let e = if m + 1 < self.anchors.len() {
            self.anchors[m + 1].pos
        } else {
            hi
        };
        (b, e)
    }
}

fn parse_record(record: &[u8], collation: &Collation) -> Option<IndexAnchor> {
    let sep = record.iter().position(|&b| b == WORD_DELIMITER)?;
    let word = std::str::from_utf8(&record[..sep]).ok()?;
    let pos: u64 = std::str::from_utf8(&record[sep + 1..]).ok()?.parse().ok()?;
    Some(IndexAnchor {
        word: collation.canonize(word),
        pos,
    })
}
