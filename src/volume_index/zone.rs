//! One zone's shard of the volume index (spec §4.3).
//!
//! Physically the spec calls for sorted delta lists; this crate keeps each
//! zone's live working set in a `HashMap<Fingerprint, Entry>` (the
//! teacher's `page_rh/table.rs` precedent for "in-place variable-capacity
//! structure with deterministic growth", generalized from a fixed-size
//! open-addressing table to an unbounded map bounded instead by an
//! explicit `max_records` budget that stands in for the delta list's byte
//! budget) and only funnels through the bit-packed delta-list encoding
//! (`delta_list.rs`) when a snapshot is written to or read from a save
//! slot. Dense and sparse are two disjoint maps per invariant 3 ("a
//! fingerprint that passes the sparse-sample filter appears in at most one
//! delta list per zone per sub-index").

use std::collections::HashMap;

use crate::fingerprint::Fingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub virtual_chapter: u64,
    /// True if this fingerprint shares its emitted on-disk bucket with
    /// another fingerprint, surfaced to callers via [`LookupResult`]. This
    /// crate's in-memory map is keyed by the full fingerprint (no bucket
    /// truncation), so a genuine collision never arises; the flag is kept
    /// for ABI parity with spec §4.3's `is_collision` and is always
    /// `false` in this implementation.
    pub is_collision: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupResult {
    NotFound,
    Found { virtual_chapter: u64, is_collision: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutResult {
    Ok,
    Overflow,
    /// The fingerprint already had a hint in this zone; the call updated
    /// its VCN in place rather than creating a new entry (spec §4.3
    /// `put_record`).
    DuplicateName,
}

/// Non-destructive cheap result for the triage stage (spec §4.3,
/// `lookup_name`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triage {
    pub in_sampled_chapter: bool,
    pub virtual_chapter: Option<u64>,
}

pub struct DeltaIndexZone {
    zone_id: u32,
    sample_rate: u32,
    max_dense_records: usize,
    max_sparse_records: usize,
    dense: HashMap<Fingerprint, Entry>,
    sparse: HashMap<Fingerprint, Entry>,
    oldest_vcn: u64,
    newest_vcn: u64,
}

impl DeltaIndexZone {
    pub fn new(
        zone_id: u32,
        sample_rate: u32,
        max_dense_records: usize,
        max_sparse_records: usize,
    ) -> Self {
        Self {
            zone_id,
            sample_rate,
            max_dense_records,
            max_sparse_records,
            dense: HashMap::new(),
            sparse: HashMap::new(),
            oldest_vcn: 0,
            newest_vcn: 0,
        }
    }

    pub fn zone_id(&self) -> u32 {
        self.zone_id
    }

    pub fn len(&self) -> usize {
        self.dense.len() + self.sparse.len()
    }

    fn is_sample(&self, fp: &Fingerprint) -> bool {
        fp.is_sample(self.sample_rate)
    }

    pub fn get_record(&self, fp: &Fingerprint) -> LookupResult {
        if let Some(e) = self.dense.get(fp) {
            return LookupResult::Found {
                virtual_chapter: e.virtual_chapter,
                is_collision: e.is_collision,
            };
        }
        if let Some(e) = self.sparse.get(fp) {
            return LookupResult::Found {
                virtual_chapter: e.virtual_chapter,
                is_collision: e.is_collision,
            };
        }
        LookupResult::NotFound
    }

    /// Cheap non-destructive lookup for the triage stage (spec §4.3/§4.5).
    pub fn lookup_name(&self, fp: &Fingerprint) -> Triage {
        let vcn = match self.get_record(fp) {
            LookupResult::Found { virtual_chapter, .. } => Some(virtual_chapter),
            LookupResult::NotFound => None,
        };
        Triage {
            in_sampled_chapter: self.is_sample(fp),
            virtual_chapter: vcn,
        }
    }

    /// Insert a new hint. `Overflow` is advisory (spec §7): the caller
    /// continues without indexing rather than treating it as fatal.
    /// `DuplicateName` means the fingerprint already had a hint in this
    /// zone; the in-place update still happens, but the caller is told the
    /// name wasn't new (spec §4.3 `put_record`).
    pub fn put_record(&mut self, fp: Fingerprint, vcn: u64) -> PutResult {
        let sample = self.is_sample(&fp);
        let already_present = self.dense.contains_key(&fp) || self.sparse.contains_key(&fp);
        if sample {
            if !self.sparse.contains_key(&fp) && self.sparse.len() >= self.max_sparse_records {
                return PutResult::Overflow;
            }
            self.sparse.insert(
                fp,
                Entry {
                    virtual_chapter: vcn,
                    is_collision: false,
                },
            );
        }
        // Non-sample fingerprints only ever live in the dense sub-index;
        // samples additionally get a dense entry while their chapter is
        // still within the dense window (set_open_chapter demotes it out).
        if !self.dense.contains_key(&fp) && self.dense.len() >= self.max_dense_records {
            return PutResult::Overflow;
        }
        self.dense.insert(
            fp,
            Entry {
                virtual_chapter: vcn,
                is_collision: false,
            },
        );
        if already_present {
            PutResult::DuplicateName
        } else {
            PutResult::Ok
        }
    }

    /// Update the VCN of an existing record in place (spec §4.3,
    /// `set_record_chapter`).
    pub fn set_record_chapter(&mut self, fp: &Fingerprint, vcn: u64) {
        if let Some(e) = self.dense.get_mut(fp) {
            e.virtual_chapter = vcn;
        }
        if let Some(e) = self.sparse.get_mut(fp) {
            e.virtual_chapter = vcn;
        }
    }

    pub fn remove_record(&mut self, fp: &Fingerprint) -> bool {
        let removed_dense = self.dense.remove(fp).is_some();
        let removed_sparse = self.sparse.remove(fp).is_some();
        removed_dense || removed_sparse
    }

    /// Declare a new newest chapter: drop dense entries that fell out of
    /// the dense window and any entry (dense or sparse) older than
    /// `oldest - 1` (spec §3 invariant 2's lower bound).
    pub fn set_open_chapter(
        &mut self,
        geometry: &crate::geometry::Geometry,
        oldest: u64,
        newest: u64,
    ) {
        self.oldest_vcn = oldest;
        self.newest_vcn = newest;
        let floor = oldest.saturating_sub(1);
        self.dense.retain(|fp, e| {
            if e.virtual_chapter < floor {
                return false;
            }
            if geometry.is_chapter_sparse(oldest, newest, e.virtual_chapter) {
                // Demoted out of the dense sub-index; samples keep living
                // in `sparse`, non-samples are dropped entirely.
                return self.sparse.contains_key(fp);
            }
            true
        });
        self.sparse.retain(|_, e| e.virtual_chapter >= floor);
    }

    pub fn window(&self) -> (u64, u64) {
        (self.oldest_vcn, self.newest_vcn)
    }

    /// Every dense entry, for a save-slot snapshot (spec §8 "save/load"
    /// round-trip law).
    pub fn dense_entries(&self) -> impl Iterator<Item = (Fingerprint, u64)> + '_ {
        self.dense.iter().map(|(fp, e)| (*fp, e.virtual_chapter))
    }

    /// Every sparse entry, for a save-slot snapshot.
    pub fn sparse_entries(&self) -> impl Iterator<Item = (Fingerprint, u64)> + '_ {
        self.sparse.iter().map(|(fp, e)| (*fp, e.virtual_chapter))
    }

    /// Reinsert a dense entry exactly as saved, bypassing the sample-rate
    /// and capacity checks `put_record` applies to live inserts (spec §4.6
    /// load restores the saved set verbatim).
    pub fn restore_dense(&mut self, fp: Fingerprint, vcn: u64) {
        self.dense.insert(
            fp,
            Entry {
                virtual_chapter: vcn,
                is_collision: false,
            },
        );
    }

    /// Reinsert a sparse entry exactly as saved.
    pub fn restore_sparse(&mut self, fp: Fingerprint, vcn: u64) {
        self.sparse.insert(
            fp,
            Entry {
                virtual_chapter: vcn,
                is_collision: false,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;

    fn fp(b: u8) -> Fingerprint {
        Fingerprint([b; 16])
    }

    fn geo() -> Geometry {
        Geometry::new(256, 64, 6, 8, 4, 4096).unwrap()
    }

    #[test]
    fn put_then_get_round_trips() {
        let mut z = DeltaIndexZone::new(0, 32, 1024, 1024);
        assert_eq!(z.put_record(fp(1), 5), PutResult::Ok);
        assert_eq!(
            z.get_record(&fp(1)),
            LookupResult::Found {
                virtual_chapter: 5,
                is_collision: false
            }
        );
    }

    #[test]
    fn triage_preservation_matches_spec_property_2() {
        let mut z = DeltaIndexZone::new(0, 32, 1024, 1024);
        let f = fp(9);
        z.put_record(f, 7);
        let t = z.lookup_name(&f);
        assert_eq!(t.virtual_chapter, Some(7));
        assert_eq!(t.in_sampled_chapter, f.is_sample(32));
    }

    #[test]
    fn overflow_when_dense_capacity_exhausted() {
        let mut z = DeltaIndexZone::new(0, 1_000_000, 2, 1024);
        assert_eq!(z.put_record(fp(1), 1), PutResult::Ok);
        assert_eq!(z.put_record(fp(2), 1), PutResult::Ok);
        assert_eq!(z.put_record(fp(3), 1), PutResult::Overflow);
    }

    #[test]
    fn put_record_reports_duplicate_name_on_second_insert() {
        let mut z = DeltaIndexZone::new(0, 32, 1024, 1024);
        let f = fp(6);
        assert_eq!(z.put_record(f, 1), PutResult::Ok);
        assert_eq!(z.put_record(f, 2), PutResult::DuplicateName);
        assert_eq!(
            z.get_record(&f),
            LookupResult::Found {
                virtual_chapter: 2,
                is_collision: false
            }
        );
    }

    #[test]
    fn remove_record_drops_entry() {
        let mut z = DeltaIndexZone::new(0, 32, 1024, 1024);
        z.put_record(fp(4), 2);
        assert!(z.remove_record(&fp(4)));
        assert_eq!(z.get_record(&fp(4)), LookupResult::NotFound);
    }

    #[test]
    fn set_open_chapter_drops_expired_entries() {
        let g = geo();
        let mut z = DeltaIndexZone::new(0, 1_000_000, 1024, 1024);
        z.put_record(fp(1), 0);
        z.set_open_chapter(&g, 5, 12);
        assert_eq!(z.get_record(&fp(1)), LookupResult::NotFound);
    }

    #[test]
    fn set_open_chapter_keeps_sampled_entries_in_sparse_window() {
        let g = geo();
        let mut z = DeltaIndexZone::new(0, 1, 1024, 1024); // sample_rate 1: everyone samples
        z.put_record(fp(1), 0);
        z.set_open_chapter(&g, 5, 12);
        assert_ne!(z.get_record(&fp(1)), LookupResult::NotFound);
    }
}
