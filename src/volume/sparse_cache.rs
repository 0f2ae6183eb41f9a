//! Small LRU of decoded chapter-index pages for sparse chapters only
//! (spec §4.2, §4.5). Mutated only under the barrier protocol — a zone
//! calls [`SparseChapterCache::refresh`] while handling a
//! `SparseCacheBarrier{vcn}` control message — and is readable by any zone
//! between barriers without further synchronization, matching spec §5's
//! ownership table.

use std::collections::HashMap;

pub struct SparseChapterCache {
    cap: usize,
    entries: HashMap<u64, Vec<(u64, u32)>>,
    order: Vec<u64>,
}

impl SparseChapterCache {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn get(&self, vcn: u64) -> Option<&Vec<(u64, u32)>> {
        self.entries.get(&vcn)
    }

    pub fn contains(&self, vcn: u64) -> bool {
        self.entries.contains_key(&vcn)
    }

    /// Load (or refresh) the decoded index for `vcn`. Called exactly once
    /// per zone per barrier (spec §4.5: "the barrier guarantees every zone
    /// loads that sparse chapter into the sparse cache before answering").
    pub fn refresh(&mut self, vcn: u64, decoded: Vec<(u64, u32)>) {
        if !self.entries.contains_key(&vcn) {
            if self.order.len() >= self.cap {
                let victim = self.order.remove(0);
                self.entries.remove(&victim);
            }
            self.order.push(vcn);
        }
        self.entries.insert(vcn, decoded);
    }

    pub fn forget(&mut self, vcn: u64) {
        self.entries.remove(&vcn);
        self.order.retain(|&v| v != vcn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_then_get_hits() {
        let mut c = SparseChapterCache::new(2);
        c.refresh(5, vec![(1, 0)]);
        assert_eq!(c.get(5), Some(&vec![(1, 0)]));
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let mut c = SparseChapterCache::new(1);
        c.refresh(5, vec![]);
        c.refresh(6, vec![]);
        assert!(!c.contains(5));
        assert!(c.contains(6));
    }
}
