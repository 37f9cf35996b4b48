//! Collation: canonicalization and total order over keywords.
//!
//! A dictionary declares its ordering with a `char-precedence` string: code
//! points listed left to right get increasing precedence, and `{…}` brackets
//! collect characters into an equivalence group. Grouped characters tie on
//! the primary comparison pass and break the tie on a secondary pass, so
//! `{aá}` sorts `a` and `á` together while keeping them distinguishable.
//! `search-ignore-chars` lists substrings erased from every keyword before
//! it is compared at all.
//!
//! Without a precedence string the order falls back to uppercased code
//! points, which is what plain ASCII dictionaries want.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// The opaque comparison key: one 16-bit precedence code per code point.
pub type CanonizedWord = Vec<u16>;

/// A collation handle shared between an engine, its SQL comparator callback
/// and a hybrid overlay. Engines replace the contents when they re-bind
/// their header properties; readers only ever canonize and compare.
pub type SharedCollation = Arc<RwLock<Collation>>;

pub fn shared(collation: Collation) -> SharedCollation {
    Arc::new(RwLock::new(collation))
}

pub struct Collation {
    ignore_chars: Vec<String>,
    char_precedence: HashMap<char, u16>,
    precedence_groups: Vec<u16>,
    use_char_precedence: bool,
    unknown_precedence: u16,
}

impl Collation {
    /// Parse a `char-precedence` definition and a `search-ignore-chars`
    /// string.
    ///
    /// An empty `precedence_def` disables the precedence table entirely;
    /// comparisons then use uppercased code points. One precedence index
    /// past the listed characters is reserved for code points outside the
    /// table.
    pub fn new(precedence_def: &str, ignore_chars: &str) -> Self {
        let mut char_precedence = HashMap::new();
        let mut precedence_groups = Vec::new();
        let mut order: u16 = 0;
        let mut group: u16 = 1;
        let mut in_group = false;

        for ch in precedence_def.chars() {
            match ch {
                '{' => in_group = true,
                '}' => {
                    in_group = false;
                    group += 1;
                }
                _ => {
                    char_precedence.insert(ch, order);
                    precedence_groups.push(group);
                    order += 1;
                    if !in_group {
                        group += 1;
                    }
                }
            }
        }
        // the group id shared by every unknown code point
        precedence_groups.push(group);

        Self {
            ignore_chars: ignore_chars.chars().map(String::from).collect(),
            char_precedence,
            precedence_groups,
            use_char_precedence: !precedence_def.is_empty(),
            unknown_precedence: order,
        }
    }

    pub fn uses_char_precedence(&self) -> bool {
        self.use_char_precedence
    }

    /// Whether `ch` is accounted for: listed in the precedence table or
    /// erased as an ignore string. Only meaningful when a precedence table
    /// is active; the builder warns about keyword characters this returns
    /// false for.
    pub fn covers(&self, ch: char) -> bool {
        self.char_precedence.contains_key(&ch)
            || self.ignore_chars.iter().any(|ic| ic.chars().eq([ch]))
    }

    /// Reduce a keyword to its comparison key.
    ///
    /// Every occurrence of each ignore string is erased first (greedy, left
    /// to right), then each remaining code point maps to its precedence
    /// index. Code points outside the table map to `unknown + code_point`,
    /// clamped below `u16::MAX`; dictionaries are expected to list every
    /// character they actually use. Without a precedence table the mapping
    /// is the uppercased code point instead.
    pub fn canonize(&self, word: &str) -> CanonizedWord {
        let mut s = word.to_owned();
        for ic in &self.ignore_chars {
            while let Some(n) = s.find(ic.as_str()) {
                s.replace_range(n..n + ic.len(), "");
            }
        }

        let clamp = |c: u32| c.min(u32::from(u16::MAX) - 1) as u16;
        s.chars()
            .map(|ch| {
                if self.use_char_precedence {
                    match self.char_precedence.get(&ch) {
                        Some(&index) => index,
                        None => clamp(u32::from(self.unknown_precedence) + ch as u32),
                    }
                } else {
                    let upper = ch.to_uppercase().next().unwrap_or(ch);
                    clamp(upper as u32)
                }
            })
            .collect()
    }

    /// Total order over canonized words.
    ///
    /// With a precedence table this is a two-weight comparison: group ids
    /// decide first, and only words whose groups agree over their whole
    /// length fall through to the raw precedence indices. A word that is a
    /// prefix of the other sorts first. Without a table the order is
    /// plain lexicographic.
    pub fn compare(&self, a: &CanonizedWord, b: &CanonizedWord) -> Ordering {
        if !self.use_char_precedence {
            return a.cmp(b);
        }

        let group_of = |code: u16| {
            let index = code.min(self.unknown_precedence);
            self.precedence_groups[usize::from(index)]
        };
        for (&x, &y) in a.iter().zip(b.iter()) {
            match group_of(x).cmp(&group_of(y)) {
                Ordering::Equal => {}
                other => return other,
            }
        }
        if a.len() != b.len() {
            return a.len().cmp(&b.len());
        }
        a.cmp(b)
    }
}

impl Default for Collation {
    fn default() -> Self {
        Self::new("", "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouped_characters_tie_on_primary_pass() {
        let coll = Collation::new("{aá}{B}", "-");
        let a = coll.canonize("a");
        let acute = coll.canonize("á");
        // same group, distinct precedence index
        assert_ne!(a, acute);
        assert_eq!(coll.compare(&a, &acute), Ordering::Less);

        // words differing only in grouped characters compare by the
        // secondary pass, so áB < aC-like orderings cannot happen
        let ab = coll.canonize("aB");
        let acute_b = coll.canonize("áB");
        assert_eq!(coll.compare(&ab, &acute_b), Ordering::Less);
    }

    #[test]
    fn ignore_chars_are_erased() {
        let coll = Collation::new("{aá}{B}{b}", "-");
        assert_eq!(coll.canonize("a-b"), coll.canonize("ab"));
        assert_eq!(
            coll.compare(&coll.canonize("a-b"), &coll.canonize("ab")),
            Ordering::Equal
        );
    }

    #[test]
    fn group_order_decides_first() {
        let coll = Collation::new("{aá}{B}", "-");
        assert_eq!(
            coll.compare(&coll.canonize("B"), &coll.canonize("a")),
            Ordering::Greater
        );
        assert_eq!(
            coll.compare(&coll.canonize("B"), &coll.canonize("á")),
            Ordering::Greater
        );
    }

    #[test]
    fn prefix_sorts_first() {
        let coll = Collation::new("abc", "");
        assert_eq!(
            coll.compare(&coll.canonize("ab"), &coll.canonize("abc")),
            Ordering::Less
        );
        let plain = Collation::default();
        assert_eq!(
            plain.compare(&plain.canonize("ab"), &plain.canonize("abc")),
            Ordering::Less
        );
    }

    #[test]
    fn uppercase_fallback_without_precedence() {
        let coll = Collation::default();
        assert_eq!(coll.canonize("abc"), coll.canonize("ABC"));
        assert_eq!(
            coll.compare(&coll.canonize("Beta"), &coll.canonize("alpha")),
            Ordering::Greater
        );
    }

    #[test]
    fn default_ignore_chars() {
        let coll = Collation::new("", "-.");
        assert_eq!(coll.canonize("e-mail"), coll.canonize("email"));
        assert_eq!(coll.canonize("e.g"), coll.canonize("eg"));
    }

    #[test]
    fn unknown_code_points_sort_after_known() {
        let coll = Collation::new("ab", "");
        let known = coll.canonize("b");
        let unknown = coll.canonize("z");
        assert_eq!(coll.compare(&known, &unknown), Ordering::Less);
        // unknown mapping is clamped, not wrapped
        let high = coll.canonize("\u{10FFFF}");
        assert_eq!(high[0], u16::MAX - 1);
    }

    #[test]
    fn canonize_is_pure() {
        let coll = Collation::new("{aá}bc", "-");
        let w1 = coll.canonize("a-bc");
        let w2 = coll.canonize("a-bc");
        assert_eq!(w1, w2);
    }

    #[test]
    fn compare_is_total_on_sample() {
        let coll = Collation::new("{aá}{Bb}c", "-");
        let words: Vec<CanonizedWord> = ["a", "á", "ab", "áB", "c", "ca", "z", ""]
            .iter()
            .map(|w| coll.canonize(w))
            .collect();
        for x in &words {
            assert_eq!(coll.compare(x, x), Ordering::Equal);
            for y in &words {
                assert_eq!(coll.compare(x, y), coll.compare(y, x).reverse());
                for z in &words {
                    // transitivity: x <= y <= z implies x <= z
                    if coll.compare(x, y) != Ordering::Greater
                        && coll.compare(y, z) != Ordering::Greater
                    {
                        assert_ne!(coll.compare(x, z), Ordering::Greater);
                    }
                }
            }
        }
    }
}
