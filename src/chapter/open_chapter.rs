//! The open chapter: a bounded hash table of up to `capacity` records,
//! per zone (spec §4.4). Sized to `records_per_chapter / zone_count`.
//!
//! Grounded on the teacher's `page_rh/table.rs` open-addressing table, but
//! deliberately simplified to the spec's stated contract: `put` never
//! fails (duplicates replace), `search` is a short linear probe, `remove`
//! tombstones rather than compacting (spec §4.4: "the chapter will still
//! be fully packed on seal, but the deleted entry is suppressed").

use crate::fingerprint::{Fingerprint, Metadata};

#[derive(Clone, Copy)]
enum Slot {
    Empty,
    Occupied(Fingerprint, Metadata),
    Deleted,
}

pub struct OpenChapter {
    capacity: usize,
    slots: Vec<Slot>,
    len: usize,
}

impl OpenChapter {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: vec![Slot::Empty; capacity.max(1)],
            len: 0,
        }
    }

    fn index_for(&self, fp: &Fingerprint) -> usize {
        let mut h: u64 = 1469598103934665603;
        for &b in fp.as_bytes() {
            h ^= b as u64;
            h = h.wrapping_mul(1099511628211);
        }
        (h as usize) % self.slots.len()
    }

    /// Insert or replace. Returns the chapter's remaining capacity
    /// (spec §4.4: `put` returns the remaining capacity and never fails).
    pub fn put(&mut self, fp: Fingerprint, meta: Metadata) -> usize {
        let start = self.index_for(&fp);
        let n = self.slots.len();
        let mut first_free: Option<usize> = None;
        for probe in 0..n {
            let idx = (start + probe) % n;
            match self.slots[idx] {
                Slot::Occupied(existing, _) if existing == fp => {
                    self.slots[idx] = Slot::Occupied(fp, meta);
                    return self.remaining();
                }
                Slot::Empty => {
                    let target = first_free.unwrap_or(idx);
                    self.slots[target] = Slot::Occupied(fp, meta);
                    self.len += 1;
                    return self.remaining();
                }
                Slot::Deleted => {
                    if first_free.is_none() {
                        first_free = Some(idx);
                    }
                }
                Slot::Occupied(_, _) => {}
            }
        }
        // Table is full of live/tombstoned entries with no matching live
        // key and no free slot found by a full probe cycle; this only
        // happens when the caller ignored `is_full()` before calling.
        if let Some(idx) = first_free {
            self.slots[idx] = Slot::Occupied(fp, meta);
            self.len += 1;
        }
        self.remaining()
    }

    pub fn search(&self, fp: &Fingerprint) -> Option<Metadata> {
        let start = self.index_for(fp);
        let n = self.slots.len();
        for probe in 0..n {
            let idx = (start + probe) % n;
            match self.slots[idx] {
                Slot::Occupied(existing, meta) if existing == *fp => return Some(meta),
                Slot::Empty => return None,
                _ => continue,
            }
        }
        None
    }

    pub fn remove(&mut self, fp: &Fingerprint) -> bool {
        let start = self.index_for(fp);
        let n = self.slots.len();
        for probe in 0..n {
            let idx = (start + probe) % n;
            match self.slots[idx] {
                Slot::Occupied(existing, _) if existing == *fp => {
                    self.slots[idx] = Slot::Deleted;
                    self.len -= 1;
                    return true;
                }
                Slot::Empty => return false,
                _ => continue,
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.len)
    }

    /// All live records, in slot order. Used by the chapter writer to pack
    /// a sealed chapter onto disk (spec §4.4 seal protocol).
    pub fn live_records(&self) -> Vec<(Fingerprint, Metadata)> {
        self.slots
            .iter()
            .filter_map(|s| match s {
                Slot::Occupied(fp, meta) => Some((*fp, *meta)),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(b: u8) -> Fingerprint {
        Fingerprint([b; 16])
    }
    fn md(b: u8) -> Metadata {
        Metadata([b; 16])
    }

    #[test]
    fn put_search_remove() {
        let mut c = OpenChapter::new(8);
        c.put(fp(1), md(1));
        assert_eq!(c.search(&fp(1)), Some(md(1)));
        assert!(c.remove(&fp(1)));
        assert_eq!(c.search(&fp(1)), None);
    }

    #[test]
    fn duplicate_put_replaces_without_growing_len() {
        let mut c = OpenChapter::new(8);
        c.put(fp(1), md(1));
        c.put(fp(1), md(2));
        assert_eq!(c.len(), 1);
        assert_eq!(c.search(&fp(1)), Some(md(2)));
    }

    #[test]
    fn never_exceeds_zone_capacity_without_rotation() {
        let mut c = OpenChapter::new(4);
        for b in 0..4u8 {
            c.put(fp(b), md(b));
        }
        assert!(c.is_full());
        assert_eq!(c.remaining(), 0);
    }

    #[test]
    fn deleted_entry_suppressed_from_live_records() {
        let mut c = OpenChapter::new(8);
        c.put(fp(1), md(1));
        c.put(fp(2), md(2));
        c.remove(&fp(1));
        let live = c.live_records();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].0, fp(2));
    }
}
