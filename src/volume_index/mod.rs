//! In-memory delta-compressed mapping fingerprint -> virtual chapter
//! (spec §4.3). Sharded by zone; each [`zone::DeltaIndexZone`] owns a
//! disjoint partition and is only ever mutated from its owning zone's
//! worker thread (spec §4.3 "Concurrency", §5).

pub mod delta_list;
pub mod zone;

use crate::fingerprint::Fingerprint;
use crate::geometry::Geometry;
pub use zone::{DeltaIndexZone, LookupResult, PutResult, Triage};

/// Owns every zone's shard. `get_zone` is a pure projection so any thread
/// may compute routing without touching zone state (spec §4.3).
pub struct VolumeIndex {
    zones: Vec<DeltaIndexZone>,
    sample_rate: u32,
}

impl VolumeIndex {
    pub fn new(zone_count: u32, sample_rate: u32, mean_delta: u32, chapters_per_volume: u64) -> Self {
        // A zone's delta-list byte budget is proportional to
        // chapters_per_volume / mean_delta (spec §4.3: "sized by
        // mean_delta"); translate that into a record-count ceiling per
        // zone so `put_record` can return `Overflow` deterministically.
        let max_dense = ((chapters_per_volume.max(1) as u128 * 4096) / mean_delta.max(1) as u128)
            .max(1024) as usize;
        let max_sparse = max_dense;
        let zones = (0..zone_count)
            .map(|z| DeltaIndexZone::new(z, sample_rate, max_dense, max_sparse))
            .collect();
        Self { zones, sample_rate }
    }

    pub fn zone_count(&self) -> u32 {
        self.zones.len() as u32
    }

    /// Pure projection of the fingerprint onto one of `zone_count` zones
    /// (spec §4.3 `get_zone`).
    pub fn get_zone(&self, fp: &Fingerprint) -> u32 {
        fp.zone(self.zone_count())
    }

    pub fn zone(&self, id: u32) -> &DeltaIndexZone {
        &self.zones[id as usize]
    }

    pub fn zone_mut(&mut self, id: u32) -> &mut DeltaIndexZone {
        &mut self.zones[id as usize]
    }

    pub fn get_record(&self, fp: &Fingerprint) -> LookupResult {
        self.zone(self.get_zone(fp)).get_record(fp)
    }

    pub fn put_record(&mut self, fp: Fingerprint, vcn: u64) -> PutResult {
        let z = self.get_zone(&fp);
        let result = self.zone_mut(z).put_record(fp, vcn);
        if result == PutResult::Overflow {
            crate::metrics::record_volume_index_overflow();
        }
        result
    }

    pub fn remove_record(&mut self, fp: &Fingerprint) -> bool {
        let z = self.get_zone(fp);
        self.zone_mut(z).remove_record(fp)
    }

    pub fn set_record_chapter(&mut self, fp: &Fingerprint, vcn: u64) {
        let z = self.get_zone(fp);
        self.zone_mut(z).set_record_chapter(fp, vcn);
    }

    pub fn lookup_name(&self, fp: &Fingerprint) -> Triage {
        self.zone(self.get_zone(fp)).lookup_name(fp)
    }

    /// Declare a new newest chapter across every zone (spec §4.3
    /// `set_open_chapter`). Called once per zone as that zone rotates; a
    /// caller driving all zones together (e.g. during rebuild) may call
    /// this per-zone in a loop.
    pub fn set_open_chapter_for_zone(
        &mut self,
        zone_id: u32,
        geometry: &Geometry,
        oldest: u64,
        newest: u64,
    ) {
        self.zone_mut(zone_id).set_open_chapter(geometry, oldest, newest);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn total_records(&self) -> usize {
        self.zones.iter().map(|z| z.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(b: u8) -> Fingerprint {
        Fingerprint([b; 16])
    }

    #[test]
    fn routes_to_a_single_zone_consistently() {
        let vi = VolumeIndex::new(4, 32, 4096, 1024);
        let f = fp(17);
        assert_eq!(vi.get_zone(&f), vi.get_zone(&f));
        assert!(vi.get_zone(&f) < 4);
    }

    #[test]
    fn put_get_remove_roundtrip_through_owner_zone() {
        let mut vi = VolumeIndex::new(4, 32, 4096, 1024);
        let f = fp(3);
        assert_eq!(vi.put_record(f, 11), PutResult::Ok);
        assert_eq!(
            vi.get_record(&f),
            LookupResult::Found {
                virtual_chapter: 11,
                is_collision: false
            }
        );
        assert!(vi.remove_record(&f));
        assert_eq!(vi.get_record(&f), LookupResult::NotFound);
    }
}
