//! Per-chapter index page map (spec §4.4, §4.6): for each physical
//! chapter, the highest delta-list key recorded on each of its chapter
//! index pages. A key lookup binary-searches this small sorted vector to
//! find the one index page worth reading, instead of scanning every index
//! page in the chapter.
//!
//! Grounded on the teacher's `dir.rs` directory-of-buckets approach: a
//! compact, purely-in-memory routing structure kept separate from the
//! bulky pages it routes into.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct IndexPageMap {
    per_chapter: HashMap<u64, Vec<u64>>,
}

impl IndexPageMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `highest_per_page` (ascending, one entry per index page) for
    /// `physical_chapter`, produced by `volume::chapter_index::pack`.
    pub fn record(&mut self, physical_chapter: u64, highest_per_page: Vec<u64>) {
        self.per_chapter.insert(physical_chapter, highest_per_page);
    }

    pub fn forget(&mut self, physical_chapter: u64) {
        self.per_chapter.remove(&physical_chapter);
    }

    /// The index page within `physical_chapter` that may contain `key`, if
    /// the chapter has been written. Pages partition the key space by their
    /// highest key in ascending order, so the first page whose highest key
    /// is `>= key` is the only candidate.
    pub fn page_for_key(&self, physical_chapter: u64, key: u64) -> Option<u32> {
        let highs = self.per_chapter.get(&physical_chapter)?;
        match highs.binary_search(&key) {
            Ok(idx) => Some(idx as u32),
            Err(idx) => {
                if idx < highs.len() {
                    Some(idx as u32)
                } else {
                    None
                }
            }
        }
    }

    pub fn pages_written(&self, physical_chapter: u64) -> Option<usize> {
        self.per_chapter.get(&physical_chapter).map(|v| v.len())
    }

    /// Every `(physical_chapter, highest_per_page)` pair, for a save-slot
    /// snapshot (spec §4.6 save/load).
    pub fn entries(&self) -> Vec<(u64, Vec<u64>)> {
        self.per_chapter.iter().map(|(k, v)| (*k, v.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_key_to_containing_page() {
        let mut m = IndexPageMap::new();
        m.record(3, vec![100, 200, 300]);
        assert_eq!(m.page_for_key(3, 50), Some(0));
        assert_eq!(m.page_for_key(3, 150), Some(1));
        assert_eq!(m.page_for_key(3, 300), Some(2));
        assert_eq!(m.page_for_key(3, 301), None);
    }

    #[test]
    fn unwritten_chapter_has_no_route() {
        let m = IndexPageMap::new();
        assert_eq!(m.page_for_key(9, 1), None);
    }

    #[test]
    fn forget_drops_the_chapter() {
        let mut m = IndexPageMap::new();
        m.record(1, vec![10]);
        m.forget(1);
        assert_eq!(m.page_for_key(1, 5), None);
    }
}
