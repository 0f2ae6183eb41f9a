//! Per-zone dispatch loop (spec §4.5, §5): one named thread per zone,
//! owning that zone's [`OpenChapter`] exclusively and consuming its own
//! funnel queue of requests and control messages. Grounded on the
//! teacher's `wal/writer.rs` single-owner-thread-plus-shared-state shape,
//! generalized from "one WAL" to "one zone".

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::chapter::OpenChapter;
use crate::fingerprint::{Fingerprint, Metadata};
use crate::volume::cache::{PageKind, ProbeHint};
use crate::volume::{chapter_index, record_page, LookupMode};
use crate::volume_index::LookupResult;

use super::control::{ControlMessage, ZoneMessage};
use super::request::{Location, Operation, Outcome, Request};
use super::session::SessionShared;

/// Run zone `zone_id` until the session requests shutdown. Owns the open
/// chapter locally; nothing else ever reads or mutates it (spec §5
/// ownership table: "Open chapter for zone z: owner zone z").
pub fn run(zone_id: u32, shared: Arc<SessionShared>) {
    let queue = Arc::clone(&shared.zone_queues[zone_id as usize]);
    let capacity = shared.zone_open_chapter_capacity();
    let mut open_chapter = OpenChapter::new(capacity);
    let mut current_vcn = shared.window.lock().unwrap().1;
    let mut pending_seal: Option<u64> = None;

    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }
        let msg = match queue.poll_timeout(Duration::from_millis(50)) {
            Some(m) => m,
            None => continue,
        };
        match msg {
            ZoneMessage::Control(ControlMessage::SparseCacheBarrier { vcn }) => {
                handle_barrier(&shared, vcn);
            }
            ZoneMessage::Control(ControlMessage::ChapterClosedAnnouncement { vcn }) => {
                if vcn == current_vcn {
                    debug!("zone {zone_id} force-sealing chapter {vcn} on sibling announcement");
                    if let Some(p) = pending_seal.take() {
                        shared.chapter_writer.wait_for_seal(p);
                    }
                    rotate(zone_id, &shared, &mut open_chapter, &mut current_vcn, &mut pending_seal);
                }
            }
            ZoneMessage::Control(ControlMessage::Snapshot(tx)) => {
                let _ = tx.send(open_chapter.live_records());
            }
            ZoneMessage::Control(ControlMessage::Restore(records)) => {
                for (fp, md) in records {
                    open_chapter.put(fp, md);
                }
            }
            ZoneMessage::Request(req) => {
                dispatch(zone_id, &shared, &mut open_chapter, &mut current_vcn, &mut pending_seal, req);
            }
        }
    }
}

fn handle_barrier(shared: &SessionShared, vcn: u64) {
    if shared.volume.sparse_cache().lock().unwrap().contains(vcn) {
        return;
    }
    let physical = shared.geometry.map_to_physical_chapter(vcn);
    let decoded = read_all_index_pages(shared, physical);
    shared.volume.sparse_cache().lock().unwrap().refresh(vcn, decoded);
}

fn read_all_index_pages(shared: &SessionShared, physical_chapter: u64) -> Vec<(u64, u32)> {
    let mut all = Vec::new();
    let mut highs = Vec::new();
    for i in 0..shared.geometry.index_pages_per_chapter {
        let page_index = shared.geometry.record_pages_per_chapter + i;
        match shared
            .volume
            .get_volume_page(physical_chapter, page_index, PageKind::Index, ProbeHint::IndexFirst, LookupMode::Normal)
        {
            Ok(buf) => {
                let decoded = chapter_index::decode_page(&buf);
                highs.push(decoded.last().map(|e| e.0).unwrap_or(0));
                all.extend(decoded);
            }
            Err(e) => {
                warn!("failed to read chapter {physical_chapter} index page {i}: {e:#}");
            }
        }
    }
    shared.chapter_writer.index_page_map().lock().unwrap().record(physical_chapter, highs);
    all
}

/// Resolve `fp`'s on-disk record within `physical_chapter`, consulting the
/// sparse cache for `sparse` chapters and the index-page-map route (with a
/// full-chapter-scan fallback that self-heals the map) for dense ones.
fn locate_in_chapter(shared: &SessionShared, physical_chapter: u64, vcn: u64, fp: &Fingerprint, sparse: bool) -> Option<Metadata> {
    let key = chapter_index::index_key(fp);
    let candidates: Vec<(u64, u32)> = if sparse {
        match shared.volume.sparse_cache().lock().unwrap().get(vcn) {
            Some(entries) => {
                crate::metrics::record_sparse_cache_hit();
                entries.clone()
            }
            None => {
                crate::metrics::record_sparse_cache_miss();
                read_all_index_pages(shared, physical_chapter)
            }
        }
    } else {
        let page = shared
            .chapter_writer
            .index_page_map()
            .lock()
            .unwrap()
            .page_for_key(physical_chapter, key);
        match page {
            Some(page_idx) => {
                let page_index = shared.geometry.record_pages_per_chapter + page_idx;
                match shared
                    .volume
                    .get_volume_page(physical_chapter, page_index, PageKind::Index, ProbeHint::IndexFirst, LookupMode::Normal)
                {
                    Ok(buf) => chapter_index::decode_page(&buf),
                    Err(_) => Vec::new(),
                }
            }
            None => read_all_index_pages(shared, physical_chapter),
        }
    };

    for (candidate_key, record_page_idx) in candidates {
        if candidate_key != key {
            continue;
        }
        if let Ok(buf) = shared.volume.get_volume_page(
            physical_chapter,
            record_page_idx,
            PageKind::Record,
            ProbeHint::RecordFirst,
            LookupMode::Normal,
        ) {
            for r in record_page::decode(&buf) {
                if r.fingerprint == *fp {
                    return Some(r.metadata);
                }
            }
        }
    }
    None
}

fn dispatch(
    zone_id: u32,
    shared: &SessionShared,
    open_chapter: &mut OpenChapter,
    current_vcn: &mut u64,
    pending_seal: &mut Option<u64>,
    req: Request,
) {
    let outcome = match req.operation {
        Operation::Post | Operation::Update => handle_write(zone_id, shared, open_chapter, current_vcn, pending_seal, &req),
        Operation::Query => handle_query(zone_id, shared, open_chapter, &req),
        Operation::Delete => handle_delete(shared, open_chapter, &req),
    };
    // Handed to the CALLBACK stage rather than invoked here, so a slow
    // caller callback never blocks this zone's dispatch loop (spec §4.5).
    shared.callback_queue.put((req, outcome));
}

fn handle_write(
    zone_id: u32,
    shared: &SessionShared,
    open_chapter: &mut OpenChapter,
    current_vcn: &mut u64,
    pending_seal: &mut Option<u64>,
    req: &Request,
) -> Outcome {
    let meta = req.new_metadata.unwrap_or(Metadata([0u8; 16]));
    open_chapter.put(req.fingerprint, meta);
    let vcn = *current_vcn;
    let _ = shared.volume_index.lock().unwrap().put_record(req.fingerprint, vcn);
    if open_chapter.is_full() {
        rotate(zone_id, shared, open_chapter, current_vcn, pending_seal);
    }
    Outcome {
        found: false,
        metadata: None,
        location: Location::InOpenChapter,
        error: None,
    }
}

fn handle_delete(shared: &SessionShared, open_chapter: &mut OpenChapter, req: &Request) -> Outcome {
    open_chapter.remove(&req.fingerprint);
    shared.volume_index.lock().unwrap().remove_record(&req.fingerprint);
    Outcome {
        found: false,
        metadata: None,
        location: Location::Unknown,
        error: None,
    }
}

fn handle_query(zone_id: u32, shared: &SessionShared, open_chapter: &OpenChapter, req: &Request) -> Outcome {
    if let Some(meta) = open_chapter.search(&req.fingerprint) {
        return Outcome {
            found: true,
            metadata: Some(meta),
            location: Location::InOpenChapter,
            error: None,
        };
    }
    if let Some(meta) = shared.chapter_writer.search_writing_chapter(zone_id, &req.fingerprint) {
        return Outcome {
            found: true,
            metadata: Some(meta),
            location: Location::InOpenChapter,
            error: None,
        };
    }
    match shared.volume_index.lock().unwrap().get_record(&req.fingerprint) {
        LookupResult::Found { virtual_chapter, .. } => {
            let (oldest, newest) = *shared.window.lock().unwrap();
            let sparse = shared.geometry.is_chapter_sparse(oldest, newest, virtual_chapter);
            let physical = shared.geometry.map_to_physical_chapter(virtual_chapter);
            match locate_in_chapter(shared, physical, virtual_chapter, &req.fingerprint, sparse) {
                Some(meta) => Outcome {
                    found: true,
                    metadata: Some(meta),
                    location: if sparse { Location::InSparse } else { Location::InDense },
                    error: None,
                },
                None => Outcome::not_found(),
            }
        }
        LookupResult::NotFound => Outcome::not_found(),
    }
}

/// Seal the currently-filling open chapter and begin the next one (spec
/// §4.4 seal protocol, steps 1-7).
fn rotate(
    zone_id: u32,
    shared: &SessionShared,
    open_chapter: &mut OpenChapter,
    current_vcn: &mut u64,
    pending_seal: &mut Option<u64>,
) {
    let (old_oldest, sealing_vcn, new_newest, new_oldest, expired, physical_chapter) = {
        let mut window = shared.window.lock().unwrap();
        let old_oldest = window.0;
        let sealing_vcn = window.1;
        let physical_chapter = shared.geometry.map_to_physical_chapter(sealing_vcn);
        let new_newest = sealing_vcn + 1;
        let expired = shared.geometry.chapters_to_expire(old_oldest, sealing_vcn, new_newest);
        let new_oldest = old_oldest + expired;
        window.1 = new_newest;
        window.0 = new_oldest;
        (old_oldest, sealing_vcn, new_newest, new_oldest, expired, physical_chapter)
    };

    let finished = shared
        .chapter_writer
        .start_closing_chapter(zone_id, shared.zone_count as usize, sealing_vcn, physical_chapter, open_chapter);
    *pending_seal = Some(sealing_vcn);
    *open_chapter = OpenChapter::new(open_chapter.capacity());
    *current_vcn = new_newest;

    shared
        .volume_index
        .lock()
        .unwrap()
        .set_open_chapter_for_zone(zone_id, &shared.geometry, new_oldest, new_newest);

    if finished == 1 && shared.zone_count > 1 {
        for (z, q) in shared.zone_queues.iter().enumerate() {
            if z as u32 != zone_id {
                q.put(ZoneMessage::Control(ControlMessage::ChapterClosedAnnouncement { vcn: sealing_vcn }));
            }
        }
        crate::metrics::record_chapter_closed_announcement();
    }

    if finished == shared.zone_count as usize {
        for vcn in old_oldest..new_oldest {
            let p = shared.geometry.map_to_physical_chapter(vcn);
            shared.volume.forget_chapter(p);
            shared.chapter_writer.index_page_map().lock().unwrap().forget(p);
        }
        if expired > 0 {
            crate::metrics::record_chapter_expired(expired);
        }
    }
}
