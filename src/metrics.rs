//! Lightweight global metrics for the deduplication index.
//!
//! Atomic counters for the subsystems spec.md treats as internal to the
//! core (cache hit/miss, chapter-writer appends, barrier broadcasts,
//! overflow rejections, rebuild progress). There is no exporter here —
//! spec §1 names "statistics aggregation" as an external collaborator —
//! only a serde-serializable [`Stats`] snapshot a caller's own exporter
//! can poll, mirroring the teacher's `metrics.rs` + `--json` status idiom.

use std::sync::atomic::{AtomicU64, Ordering};

static PAGE_CACHE_HITS: AtomicU64 = AtomicU64::new(0);
static PAGE_CACHE_MISSES: AtomicU64 = AtomicU64::new(0);
static PAGE_CACHE_QUEUED: AtomicU64 = AtomicU64::new(0);

static SPARSE_CACHE_HITS: AtomicU64 = AtomicU64::new(0);
static SPARSE_CACHE_MISSES: AtomicU64 = AtomicU64::new(0);

static CHAPTERS_WRITTEN: AtomicU64 = AtomicU64::new(0);
static CHAPTERS_EXPIRED: AtomicU64 = AtomicU64::new(0);
static CHAPTERS_CLOSED_ANNOUNCEMENTS: AtomicU64 = AtomicU64::new(0);

static BARRIERS_BROADCAST: AtomicU64 = AtomicU64::new(0);
static BARRIERS_SUPPRESSED: AtomicU64 = AtomicU64::new(0);

static VOLUME_INDEX_OVERFLOWS: AtomicU64 = AtomicU64::new(0);
static VOLUME_INDEX_COLLISIONS: AtomicU64 = AtomicU64::new(0);

static REBUILD_CHAPTERS_SCANNED: AtomicU64 = AtomicU64::new(0);
static REBUILD_RECORDS_REPLAYED: AtomicU64 = AtomicU64::new(0);
static REBUILD_CHAPTERS_SKIPPED_CORRUPT: AtomicU64 = AtomicU64::new(0);

static REQUESTS_QUEUED: AtomicU64 = AtomicU64::new(0);
static REQUESTS_COMPLETED: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    pub page_cache_hits: u64,
    pub page_cache_misses: u64,
    pub page_cache_queued: u64,
    pub sparse_cache_hits: u64,
    pub sparse_cache_misses: u64,
    pub chapters_written: u64,
    pub chapters_expired: u64,
    pub chapters_closed_announcements: u64,
    pub barriers_broadcast: u64,
    pub barriers_suppressed: u64,
    pub volume_index_overflows: u64,
    pub volume_index_collisions: u64,
    pub rebuild_chapters_scanned: u64,
    pub rebuild_records_replayed: u64,
    pub rebuild_chapters_skipped_corrupt: u64,
    pub requests_queued: u64,
    pub requests_completed: u64,
}

impl Stats {
    pub fn page_cache_hit_ratio(&self) -> f64 {
        let total = self.page_cache_hits + self.page_cache_misses;
        if total == 0 {
            0.0
        } else {
            self.page_cache_hits as f64 / total as f64
        }
    }
}

pub fn record_cache_hit() {
    PAGE_CACHE_HITS.fetch_add(1, Ordering::Relaxed);
}
pub fn record_cache_miss() {
    PAGE_CACHE_MISSES.fetch_add(1, Ordering::Relaxed);
}
pub fn record_cache_queued() {
    PAGE_CACHE_QUEUED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_sparse_cache_hit() {
    SPARSE_CACHE_HITS.fetch_add(1, Ordering::Relaxed);
}
pub fn record_sparse_cache_miss() {
    SPARSE_CACHE_MISSES.fetch_add(1, Ordering::Relaxed);
}
pub fn record_chapter_written() {
    CHAPTERS_WRITTEN.fetch_add(1, Ordering::Relaxed);
}
pub fn record_chapter_expired(n: u64) {
    CHAPTERS_EXPIRED.fetch_add(n, Ordering::Relaxed);
}
pub fn record_chapter_closed_announcement() {
    CHAPTERS_CLOSED_ANNOUNCEMENTS.fetch_add(1, Ordering::Relaxed);
}
pub fn record_barrier_broadcast() {
    BARRIERS_BROADCAST.fetch_add(1, Ordering::Relaxed);
}
pub fn record_barrier_suppressed() {
    BARRIERS_SUPPRESSED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_volume_index_overflow() {
    VOLUME_INDEX_OVERFLOWS.fetch_add(1, Ordering::Relaxed);
}
pub fn record_volume_index_collision() {
    VOLUME_INDEX_COLLISIONS.fetch_add(1, Ordering::Relaxed);
}
pub fn record_rebuild_chapter_scanned() {
    REBUILD_CHAPTERS_SCANNED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_rebuild_records_replayed(n: u64) {
    REBUILD_RECORDS_REPLAYED.fetch_add(n, Ordering::Relaxed);
}
pub fn record_rebuild_chapter_skipped_corrupt() {
    REBUILD_CHAPTERS_SKIPPED_CORRUPT.fetch_add(1, Ordering::Relaxed);
}
pub fn record_request_queued() {
    REQUESTS_QUEUED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_request_completed() {
    REQUESTS_COMPLETED.fetch_add(1, Ordering::Relaxed);
}

pub fn snapshot() -> Stats {
    Stats {
        page_cache_hits: PAGE_CACHE_HITS.load(Ordering::Relaxed),
        page_cache_misses: PAGE_CACHE_MISSES.load(Ordering::Relaxed),
        page_cache_queued: PAGE_CACHE_QUEUED.load(Ordering::Relaxed),
        sparse_cache_hits: SPARSE_CACHE_HITS.load(Ordering::Relaxed),
        sparse_cache_misses: SPARSE_CACHE_MISSES.load(Ordering::Relaxed),
        chapters_written: CHAPTERS_WRITTEN.load(Ordering::Relaxed),
        chapters_expired: CHAPTERS_EXPIRED.load(Ordering::Relaxed),
        chapters_closed_announcements: CHAPTERS_CLOSED_ANNOUNCEMENTS.load(Ordering::Relaxed),
        barriers_broadcast: BARRIERS_BROADCAST.load(Ordering::Relaxed),
        barriers_suppressed: BARRIERS_SUPPRESSED.load(Ordering::Relaxed),
        volume_index_overflows: VOLUME_INDEX_OVERFLOWS.load(Ordering::Relaxed),
        volume_index_collisions: VOLUME_INDEX_COLLISIONS.load(Ordering::Relaxed),
        rebuild_chapters_scanned: REBUILD_CHAPTERS_SCANNED.load(Ordering::Relaxed),
        rebuild_records_replayed: REBUILD_RECORDS_REPLAYED.load(Ordering::Relaxed),
        rebuild_chapters_skipped_corrupt: REBUILD_CHAPTERS_SKIPPED_CORRUPT.load(Ordering::Relaxed),
        requests_queued: REQUESTS_QUEUED.load(Ordering::Relaxed),
        requests_completed: REQUESTS_COMPLETED.load(Ordering::Relaxed),
    }
}

/// Reset all counters. Test-only: production callers never need to zero a
/// running index's lifetime counters.
#[cfg(test)]
pub fn reset() {
    for c in [
        &PAGE_CACHE_HITS,
        &PAGE_CACHE_MISSES,
        &PAGE_CACHE_QUEUED,
        &SPARSE_CACHE_HITS,
        &SPARSE_CACHE_MISSES,
        &CHAPTERS_WRITTEN,
        &CHAPTERS_EXPIRED,
        &CHAPTERS_CLOSED_ANNOUNCEMENTS,
        &BARRIERS_BROADCAST,
        &BARRIERS_SUPPRESSED,
        &VOLUME_INDEX_OVERFLOWS,
        &VOLUME_INDEX_COLLISIONS,
        &REBUILD_CHAPTERS_SCANNED,
        &REBUILD_RECORDS_REPLAYED,
        &REBUILD_CHAPTERS_SKIPPED_CORRUPT,
        &REQUESTS_QUEUED,
        &REQUESTS_COMPLETED,
    ] {
        c.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static SERIAL: Mutex<()> = Mutex::new(());

    #[test]
    fn hit_ratio_handles_zero_total() {
        let _g = SERIAL.lock().unwrap();
        reset();
        let s = snapshot();
        assert_eq!(s.page_cache_hit_ratio(), 0.0);
    }

    #[test]
    fn counters_accumulate() {
        let _g = SERIAL.lock().unwrap();
        reset();
        record_cache_hit();
        record_cache_hit();
        record_cache_miss();
        let s = snapshot();
        assert_eq!(s.page_cache_hits, 2);
        assert_eq!(s.page_cache_misses, 1);
        assert!((s.page_cache_hit_ratio() - (2.0 / 3.0)).abs() < 1e-9);
    }
}
