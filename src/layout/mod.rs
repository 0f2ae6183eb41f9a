//! On-disk layout: a geometry block, a superblock with dual A/B save
//! slots selected by sequence number, and the save/load/rebuild
//! orchestration that sits above them (spec §4.6, §6 "On-disk layout").
//!
//! Grounded on the teacher's `meta.rs`: a small fixed-layout header with a
//! CRC-32 trailer, written with the tmp-file-then-rename-then-fsync
//! pattern so a crash mid-write never leaves a half-written header behind.
//! Split the way `db/mod.rs` separates concerns: `geometry_block.rs` and
//! `superblock.rs` are the two small binary headers, `save_slot.rs` is the
//! larger structured snapshot (config + volume index + open chapters +
//! index page map) that a header's slot pointer locates.

pub mod geometry_block;
pub mod region_kind;
pub mod save_slot;
pub mod superblock;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};

use crate::chapter::IndexPageMap;
use crate::config::Configuration;
use crate::fingerprint::{Fingerprint, Metadata};
use crate::geometry::Geometry;
use crate::volume_index::VolumeIndex;

pub use geometry_block::GeometryBlock;
pub use save_slot::SaveSlotData;
pub use superblock::Superblock;

/// Filesystem layout rooted at the index directory: `LOCK` (session.rs /
/// lock.rs), `volume.bin` (the chaptered data region), and this module's
/// own `geometry.bin` / `super.bin` / `slot_a.json` / `slot_b.json`.
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn volume_path(&self) -> PathBuf {
        self.root.join("volume.bin")
    }

    fn geometry_path(&self) -> PathBuf {
        self.root.join("geometry.bin")
    }

    fn superblock_path(&self) -> PathBuf {
        self.root.join("super.bin")
    }

    fn slot_path(&self, slot: u8) -> PathBuf {
        self.root.join(if slot == 0 { "slot_a.json" } else { "slot_b.json" })
    }

    pub fn exists(&self) -> bool {
        self.superblock_path().exists()
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create layout dir {}", parent.display()))?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes).with_context(|| format!("write {}", tmp.display()))?;
        {
            let f = fs::File::open(&tmp).with_context(|| format!("reopen {}", tmp.display()))?;
            f.sync_all().ok();
        }
        fs::rename(&tmp, path).with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
        fsync_dir(path);
        Ok(())
    }

    pub fn write_geometry_block(&self, block: &GeometryBlock) -> Result<()> {
        Self::write_atomic(&self.geometry_path(), &block.encode())
    }

    pub fn read_geometry_block(&self) -> Result<Option<GeometryBlock>> {
        let path = self.geometry_path();
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        Ok(Some(GeometryBlock::decode(&bytes)?))
    }

    fn write_superblock(&self, sb: &Superblock) -> Result<()> {
        Self::write_atomic(&self.superblock_path(), &sb.encode())
    }

    fn read_superblock(&self) -> Result<Option<Superblock>> {
        let path = self.superblock_path();
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        Ok(Some(Superblock::decode(&bytes)?))
    }

    fn write_slot(&self, slot: u8, data: &SaveSlotData) -> Result<()> {
        let bytes = serde_json::to_vec(data).context("serialize save slot")?;
        Self::write_atomic(&self.slot_path(slot), &bytes)
    }

    fn read_slot(&self, slot: u8) -> Result<SaveSlotData> {
        let path = self.slot_path(slot);
        let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("deserialize {}", path.display()))
    }

    /// Write a fresh snapshot to the slot not currently marked active (the
    /// teacher's A/B double-buffer pattern generalized from `meta.rs`'s
    /// single region to two full slots), then atomically flip the
    /// superblock's active-slot pointer and sequence number once the new
    /// slot is durable on disk.
    pub fn save(&self, component_id: u32, data: &SaveSlotData) -> Result<()> {
        let existing = self.read_superblock()?;
        let (target, next_seq, other_seq) = match &existing {
            Some(sb) => {
                let target = 1 - sb.active_slot;
                let my_seq = if sb.active_slot == 0 { sb.slot_a_seq } else { sb.slot_b_seq };
                (target, my_seq + 1, my_seq)
            }
            None => (0u8, 1u64, 0u64),
        };
        self.write_slot(target, data)?;
        let sb = Superblock {
            component_id,
            major: superblock::CURRENT_MAJOR,
            minor: superblock::CURRENT_MINOR,
            active_slot: target,
            slot_a_seq: if target == 0 { next_seq } else { other_seq },
            slot_b_seq: if target == 1 { next_seq } else { other_seq },
        };
        self.write_superblock(&sb)?;
        info!("save slot {} committed at sequence {}", target, next_seq);
        Ok(())
    }

    /// Read the most recently committed slot. Falls back to the other slot
    /// if the active one fails to parse (corruption), logging a warning;
    /// returns `Ok(None)` if no superblock exists yet (fresh volume).
    pub fn load_latest(&self) -> Result<Option<SaveSlotData>> {
        let sb = match self.read_superblock()? {
            Some(sb) => sb,
            None => return Ok(None),
        };
        if !sb.is_compatible(superblock::CURRENT_MAJOR) {
            anyhow::bail!(crate::error::IndexError::new(
                crate::error::ErrorKind::UnsupportedVersion,
                format!("save slot major version {} unsupported", sb.major)
            ));
        }
        match self.read_slot(sb.active_slot) {
            Ok(data) => Ok(Some(data)),
            Err(e) => {
                warn!("active save slot {} unreadable ({e:#}), trying the other slot", sb.active_slot);
                let other = 1 - sb.active_slot;
                self.read_slot(other).map(Some)
            }
        }
    }
}

#[cfg(unix)]
fn fsync_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn fsync_dir(_path: &Path) {}

/// Build the [`SaveSlotData`] a running session needs to persist: the
/// configuration, window, every zone's volume-index contents and open
/// chapter, and the chapter writer's index page map.
pub fn build_snapshot(
    config: &Configuration,
    window: (u64, u64),
    volume_index: &VolumeIndex,
    zone_open_chapters: &[Vec<(Fingerprint, Metadata)>],
    index_page_map: &IndexPageMap,
) -> SaveSlotData {
    save_slot::build(config, window, volume_index, zone_open_chapters, index_page_map)
}

/// Restore a [`SaveSlotData`] snapshot into fresh in-memory structures,
/// returning the reconstructed volume index, window, and open-chapter
/// records for each zone (spec §8 "save/load" round-trip law).
pub fn restore_snapshot(
    geometry: &Geometry,
    data: &SaveSlotData,
) -> (VolumeIndex, (u64, u64), Vec<Vec<(Fingerprint, Metadata)>>, IndexPageMap) {
    save_slot::restore(geometry, data)
}
