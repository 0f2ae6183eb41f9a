//! Save-slot body: the structured (JSON) snapshot a save-slot file holds
//! (spec §4.6 save/load, §8 "save/load" round-trip law). Grounded on the
//! teacher's `meta.rs` body encoding, generalized from a single fixed
//! struct to `serde_json` since this snapshot's size varies with how many
//! records a zone holds — the fixed-width binary headers stay in
//! `geometry_block.rs`/`superblock.rs`, only this variable-length body
//! goes through serde.

use serde::{Deserialize, Serialize};

use crate::chapter::IndexPageMap;
use crate::config::Configuration;
use crate::fingerprint::{Fingerprint, Metadata};
use crate::geometry::Geometry;
use crate::layout::region_kind::RegionKind;
use crate::volume_index::VolumeIndex;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigSnapshot {
    memory_size: u64,
    offset: u64,
    record_pages_per_chapter: u32,
    chapters_per_volume: u64,
    sparse_chapters_per_volume: u64,
    bytes_per_page: u32,
    cache_chapters: u32,
    volume_index_mean_delta: u32,
    sparse_sample_rate: u32,
    zone_count: u32,
    nonce: u64,
    remapped_virtual: u64,
    remapped_physical: u64,
}

impl From<&Configuration> for ConfigSnapshot {
    fn from(c: &Configuration) -> Self {
        Self {
            memory_size: c.memory_size,
            offset: c.offset,
            record_pages_per_chapter: c.record_pages_per_chapter,
            chapters_per_volume: c.chapters_per_volume,
            sparse_chapters_per_volume: c.sparse_chapters_per_volume,
            bytes_per_page: c.bytes_per_page,
            cache_chapters: c.cache_chapters,
            volume_index_mean_delta: c.volume_index_mean_delta,
            sparse_sample_rate: c.sparse_sample_rate,
            zone_count: c.zone_count,
            nonce: c.nonce,
            remapped_virtual: c.remapped_virtual,
            remapped_physical: c.remapped_physical,
        }
    }
}

impl From<ConfigSnapshot> for Configuration {
    fn from(s: ConfigSnapshot) -> Self {
        Self {
            memory_size: s.memory_size,
            offset: s.offset,
            record_pages_per_chapter: s.record_pages_per_chapter,
            chapters_per_volume: s.chapters_per_volume,
            sparse_chapters_per_volume: s.sparse_chapters_per_volume,
            bytes_per_page: s.bytes_per_page,
            cache_chapters: s.cache_chapters,
            volume_index_mean_delta: s.volume_index_mean_delta,
            sparse_sample_rate: s.sparse_sample_rate,
            zone_count: s.zone_count,
            nonce: s.nonce,
            remapped_virtual: s.remapped_virtual,
            remapped_physical: s.remapped_physical,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ZoneSnapshot {
    dense: Vec<([u8; 16], u64)>,
    sparse: Vec<([u8; 16], u64)>,
    open_chapter: Vec<([u8; 16], [u8; 16])>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveSlotData {
    /// Always [`RegionKind::Save`]; lets `doctor`-style tooling confirm a
    /// slot file is a save-slot body without trusting the `slot_a`/`slot_b`
    /// filename convention.
    kind: RegionKind,
    config_kind: RegionKind,
    config: ConfigSnapshot,
    oldest_vcn: u64,
    newest_vcn: u64,
    volume_index_kind: RegionKind,
    open_chapter_kind: RegionKind,
    zones: Vec<ZoneSnapshot>,
    index_page_map_kind: RegionKind,
    /// `(physical_chapter, highest_key_per_page)`, flattened for JSON since
    /// map keys must be strings in `serde_json`'s default object encoding.
    index_page_map: Vec<(u64, Vec<u64>)>,
}

pub fn build(
    config: &Configuration,
    window: (u64, u64),
    volume_index: &VolumeIndex,
    zone_open_chapters: &[Vec<(Fingerprint, Metadata)>],
    index_page_map: &IndexPageMap,
) -> SaveSlotData {
    let zones = (0..volume_index.zone_count())
        .map(|z| {
            let zone = volume_index.zone(z);
            let dense = zone.dense_entries().map(|(fp, vcn)| (*fp.as_bytes(), vcn)).collect();
            let sparse = zone.sparse_entries().map(|(fp, vcn)| (*fp.as_bytes(), vcn)).collect();
            let open_chapter = zone_open_chapters
                .get(z as usize)
                .map(|records| records.iter().map(|(fp, md)| (*fp.as_bytes(), md.0)).collect())
                .unwrap_or_default();
            ZoneSnapshot {
                dense,
                sparse,
                open_chapter,
            }
        })
        .collect();

    SaveSlotData {
        kind: RegionKind::Save,
        config_kind: RegionKind::Config,
        config: ConfigSnapshot::from(config),
        oldest_vcn: window.0,
        newest_vcn: window.1,
        volume_index_kind: RegionKind::VolumeIndex,
        open_chapter_kind: RegionKind::OpenChapter,
        zones,
        index_page_map_kind: RegionKind::IndexPageMap,
        index_page_map: index_page_map_entries(index_page_map),
    }
}

/// Flatten the map into `(physical_chapter, highest_per_page)` pairs for
/// serialization; restored on load via `IndexPageMap::record`.
fn index_page_map_entries(map: &IndexPageMap) -> Vec<(u64, Vec<u64>)> {
    map.entries()
}

pub fn restore(
    geometry: &Geometry,
    data: &SaveSlotData,
) -> (VolumeIndex, (u64, u64), Vec<Vec<(Fingerprint, Metadata)>>, IndexPageMap) {
    let config: Configuration = data.config.clone().into();
    let mut volume_index = VolumeIndex::new(
        config.zone_count,
        config.sparse_sample_rate,
        config.volume_index_mean_delta,
        config.chapters_per_volume,
    );

    let mut open_chapters = Vec::with_capacity(data.zones.len());
    for (z, zone_snapshot) in data.zones.iter().enumerate() {
        let zone = volume_index.zone_mut(z as u32);
        for (fp_bytes, vcn) in &zone_snapshot.dense {
            zone.restore_dense(Fingerprint::new(*fp_bytes), *vcn);
        }
        for (fp_bytes, vcn) in &zone_snapshot.sparse {
            zone.restore_sparse(Fingerprint::new(*fp_bytes), *vcn);
        }
        zone.set_open_chapter(geometry, data.oldest_vcn, data.newest_vcn);
        let records = zone_snapshot
            .open_chapter
            .iter()
            .map(|(fp_bytes, md_bytes)| (Fingerprint::new(*fp_bytes), Metadata::new(*md_bytes)))
            .collect();
        open_chapters.push(records);
    }

    let mut index_page_map = IndexPageMap::new();
    for (physical_chapter, highest_per_page) in &data.index_page_map {
        index_page_map.record(*physical_chapter, highest_per_page.clone());
    }

    (volume_index, (data.oldest_vcn, data.newest_vcn), open_chapters, index_page_map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_populated_zone() {
        let config = Configuration {
            zone_count: 2,
            ..Configuration::default()
        };
        let geometry = config.to_geometry().unwrap();
        let mut vi = VolumeIndex::new(2, 1_000_000, config.volume_index_mean_delta, config.chapters_per_volume);
        let fp = Fingerprint::new([5u8; 16]);
        let z = vi.get_zone(&fp);
        vi.zone_mut(z).restore_dense(fp, 3);

        let open_chapters = vec![Vec::new(), Vec::new()];
        let map = IndexPageMap::new();
        let data = build(&config, (0, 3), &vi, &open_chapters, &map);

        let (restored_vi, window, _open, _map) = restore(&geometry, &data);
        assert_eq!(window, (0, 3));
        assert_eq!(
            restored_vi.get_record(&fp),
            crate::volume_index::LookupResult::Found {
                virtual_chapter: 3,
                is_collision: false
            }
        );
    }
}
