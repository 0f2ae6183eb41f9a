//! Rebuild-from-volume-scan (spec §4.6 "Rebuild", §7 "During rebuild, a
//! single-chapter corruption is logged and skipped; a boundary-
//! inconsistency (lowest > highest) is fatal").
//!
//! Invoked when [`crate::config::LoadType::Rebuild`] is requested and no
//! clean save slot is present (spec §6 "Session lifecycle"). Grounded on
//! the teacher's `wal/replay.rs` (scan every segment in order, replay each
//! record into the live structure, skip a segment whose checksum fails
//! rather than aborting the whole replay) generalized from WAL segments to
//! volume chapters.

use anyhow::{bail, Result};
use log::warn;

use crate::error::{ErrorKind, IndexError};
use crate::pipeline::session::SessionShared;
use crate::volume::cache::{PageKind, ProbeHint};
use crate::volume::{record_page, LookupMode};

/// Re-derive the volume index from durable chapter data alone, with no
/// save slot to lean on. `shared.volume_index` and `shared.window` are
/// replaced in place; every other field of `shared` (the volume, the
/// chapter writer's index page map) is read-only during rebuild.
pub fn rebuild(shared: &SessionShared) -> Result<()> {
    let (lowest, highest, is_empty) = shared.volume.find_volume_chapter_boundaries()?;
    if is_empty {
        // spec §8 "Boundary behaviours: Empty volume... rebuild leaves
        // newest=oldest=0".
        *shared.window.lock().unwrap() = (0, 0);
        return Ok(());
    }
    if lowest > highest {
        bail!(IndexError::new(
            ErrorKind::AssertionFailed,
            format!("rebuild boundary inconsistency: lowest {lowest} > highest {highest}"),
        ));
    }

    let geometry = shared.geometry;
    let oldest = if highest + 1 > geometry.chapters_per_volume {
        highest + 1 - geometry.chapters_per_volume
    } else {
        0
    }
    .max(lowest);

    {
        let mut vi = shared.volume_index.lock().unwrap();
        for zone in 0..vi.zone_count() {
            vi.set_open_chapter_for_zone(zone, &geometry, oldest, highest);
        }
    }

    for vcn in lowest..=highest {
        if shared.shutdown.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(IndexError::new(ErrorKind::Disabled, "rebuild cancelled at chapter boundary").into());
        }
        replay_chapter(shared, vcn, oldest, highest);
    }

    *shared.window.lock().unwrap() = (oldest, highest);
    Ok(())
}

/// Replay every record page of physical chapter `vcn mod P` back into the
/// volume index, skipping records whose final disposition is sparse and
/// whose fingerprint fails the sample filter (spec §4.6). A checksum-style
/// failure (here: a record page with no valid header) marks the chapter
/// corrupt and excludes it from the window rather than aborting the scan
/// (spec §4.2 "Failure semantics", §7 "a single-chapter corruption is
/// logged and skipped").
fn replay_chapter(shared: &SessionShared, vcn: u64, oldest: u64, newest: u64) {
    let geometry = shared.geometry;
    let physical = geometry.map_to_physical_chapter(vcn);
    let is_sparse = geometry.is_chapter_sparse(oldest, newest, vcn);
    let sample_rate = shared.volume_index.lock().unwrap().sample_rate();

    let mut replayed = 0u64;
    for page_index in 0..geometry.record_pages_per_chapter {
        let page = match shared.volume.get_volume_page(
            physical,
            page_index,
            PageKind::Record,
            ProbeHint::RecordFirst,
            LookupMode::ForRebuild,
        ) {
            Ok(buf) => buf,
            Err(e) => {
                warn!("chapter {vcn} page {page_index} unreadable during rebuild, skipping chapter: {e:#}");
                crate::metrics::record_rebuild_chapter_skipped_corrupt();
                return;
            }
        };
        if page_index == 0 && record_page::read_header(&page) != Some(vcn) {
            // Page 0 doesn't carry this VCN: the chapter was never written
            // (empty volume window) or has been overwritten since — either
            // way there's nothing of this VCN's to replay here.
            crate::metrics::record_rebuild_chapter_skipped_corrupt();
            return;
        }
        let records = record_page::decode(&page);
        let mut vi = shared.volume_index.lock().unwrap();
        for record in records {
            if is_sparse && !record.fingerprint.is_sample(sample_rate) {
                continue;
            }
            let _ = vi.put_record(record.fingerprint, vcn);
            replayed += 1;
        }
    }
    crate::metrics::record_rebuild_chapter_scanned();
    crate::metrics::record_rebuild_records_replayed(replayed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Configuration, LoadType};
    use crate::fingerprint::{Fingerprint, Metadata};
    use crate::pipeline::session::Session;

    fn test_config(zone_count: u32) -> Configuration {
        Configuration {
            chapters_per_volume: 8,
            sparse_chapters_per_volume: 2,
            record_pages_per_chapter: 2,
            bytes_per_page: 4096,
            zone_count,
            ..Configuration::default()
        }
    }

    fn fp(i: u16) -> Fingerprint {
        let mut bytes = [0u8; 16];
        bytes[0..2].copy_from_slice(&i.to_le_bytes());
        Fingerprint::new(bytes)
    }

    #[test]
    fn rebuild_recovers_a_sealed_chapter_after_unsaved_teardown() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(1);
        let md = Metadata::new([6u8; 16]);
        // One zone's open-chapter capacity at this configuration is
        // record_pages_per_chapter * records_per_page: 2 * 128 = 256.
        // Posting one more than that forces exactly one rotation, sealing
        // chapter 0 to disk; the 257th record lands in the new open
        // chapter and is lost on an unsaved close, same as real crash
        // recovery only recovering durable chapters.
        let sealed_count: u16 = 256;
        {
            let session = Session::open(dir.path(), cfg.clone(), LoadType::Create).unwrap();
            for i in 0..=sealed_count {
                session.post(fp(i), md).unwrap();
            }
            session.flush();
            // No save(): the superblock never gets written, forcing the
            // next open to fall back to a volume scan.
            session.close(false).unwrap();
        }
        let session = Session::open(dir.path(), cfg, LoadType::Rebuild).unwrap();
        for i in 0..sealed_count {
            let outcome = session.query(fp(i)).unwrap();
            assert!(outcome.found, "record {i} from the sealed chapter should survive rebuild");
            assert_eq!(outcome.metadata, Some(md));
        }
        session.close(false).unwrap();
    }

    #[test]
    fn rebuild_on_empty_volume_leaves_window_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::open(dir.path(), test_config(1), LoadType::Rebuild).unwrap();
        let outcome = session.query(Fingerprint::new([9u8; 16])).unwrap();
        assert!(!outcome.found);
        session.close(false).unwrap();
    }
}
