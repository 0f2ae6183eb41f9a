//! The persistent chaptered store (spec §4.2): a read-through page cache
//! over an [`IoRegion`], a sparse-chapter cache, and the chapter-boundary
//! scan `find_volume_chapter_boundaries` that rebuild relies on. Grounded
//! on the teacher's `pager/core.rs` (owns the file handle + cache together)
//! and `pager/cache.rs` (the LRU this crate's [`cache::PageCache`]
//! generalizes).

pub mod cache;
pub mod chapter_index;
pub mod io_region;
pub mod record_page;
pub mod sparse_cache;

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

use crate::geometry::Geometry;
use cache::{PageCache, PageKey, PageKind, ProbeHint};
use io_region::IoRegion;
use sparse_cache::SparseChapterCache;

/// Outcome of a page-cache probe (spec §4.2 `search_page_cache`). `Queued`
/// is not modeled here as a literal parked-request state — this crate's
/// reader path is synchronous — but the variant is kept so callers built
/// against the pipeline's vocabulary compile against the contract spec §4.2
/// promises; see `pipeline::zone_worker` for where a real async reader pool
/// would plug in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLookup {
    Found,
    NotFound,
}

/// `lookup_mode` toggle from spec §4.6: rebuild suppresses page-cache
/// promotion so a full volume scan doesn't thrash the cache with pages that
/// will never be touched again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    Normal,
    ForRebuild,
}

pub struct Volume {
    io: Arc<dyn IoRegion>,
    geometry: Geometry,
    page_cache: Mutex<PageCache>,
    sparse_cache: Mutex<SparseChapterCache>,
}

impl Volume {
    pub fn new(io: Arc<dyn IoRegion>, geometry: Geometry, cache_chapters: u32) -> Self {
        let pages_per_chapter = geometry.pages_per_chapter() as usize;
        let page_cache_cap = pages_per_chapter * cache_chapters.max(1) as usize;
        Self {
            io,
            geometry,
            page_cache: Mutex::new(PageCache::new(page_cache_cap)),
            sparse_cache: Mutex::new(SparseChapterCache::new(cache_chapters.max(1) as usize)),
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Read-through fetch of one page (spec §4.2 `get_volume_page`).
    pub fn get_volume_page(
        &self,
        physical_chapter: u64,
        page_index: u32,
        kind: PageKind,
        hint: ProbeHint,
        mode: LookupMode,
    ) -> Result<Vec<u8>> {
        let key = PageKey {
            physical_chapter,
            page_index,
        };
        if let Some(hit) = self.page_cache.lock().unwrap().get(key) {
            crate::metrics::record_cache_hit();
            return Ok(hit);
        }
        crate::metrics::record_cache_miss();
        let absolute = self.geometry.map_to_physical_page(physical_chapter, page_index);
        let mut buf = vec![0u8; self.geometry.bytes_per_page as usize];
        self.io
            .read_page(absolute, &mut buf)
            .with_context(|| format!("read volume page {absolute}"))?;
        if matches!(mode, LookupMode::Normal) {
            self.page_cache.lock().unwrap().put(key, kind, buf.clone(), hint);
        }
        Ok(buf)
    }

    pub fn write_volume_page(&self, physical_chapter: u64, page_index: u32, kind: PageKind, data: &[u8]) -> Result<()> {
        let absolute = self.geometry.map_to_physical_page(physical_chapter, page_index);
        self.io
            .write_page(absolute, data)
            .with_context(|| format!("write volume page {absolute}"))?;
        let key = PageKey {
            physical_chapter,
            page_index,
        };
        self.page_cache
            .lock()
            .unwrap()
            .put(key, kind, data.to_vec(), ProbeHint::RecordFirst);
        Ok(())
    }

    /// Non-blocking probe used once a caller already knows the record page
    /// (spec §4.2 `search_cached_record_page`): hit the cache only, never
    /// touch the underlying region.
    pub fn search_cached_record_page(&self, physical_chapter: u64, page_index: u32) -> PageLookup {
        let key = PageKey {
            physical_chapter,
            page_index,
        };
        if self.page_cache.lock().unwrap().contains(key) {
            PageLookup::Found
        } else {
            PageLookup::NotFound
        }
    }

    /// Advisory prefetch (spec §4.2 `prefetch_pages`): failures are
    /// swallowed since prefetching never changes correctness, only latency.
    pub fn prefetch_pages(&self, physical_chapter: u64, start_page: u32, count: u32) {
        for i in 0..count {
            let _ = self.get_volume_page(
                physical_chapter,
                start_page + i,
                PageKind::Record,
                ProbeHint::RecordFirst,
                LookupMode::Normal,
            );
        }
    }

    /// Drop all cached pages for `physical_chapter` (spec §4.2
    /// `forget_chapter`), called once a chapter leaves the window.
    pub fn forget_chapter(&self, physical_chapter: u64) {
        self.page_cache.lock().unwrap().forget_chapter(physical_chapter);
    }

    pub fn sparse_cache(&self) -> &Mutex<SparseChapterCache> {
        &self.sparse_cache
    }

    pub fn io(&self) -> &Arc<dyn IoRegion> {
        &self.io
    }

    /// Scan every physical chapter's first record page to find the min/max
    /// VCN written (spec §4.6 rebuild). Returns `(lowest, highest,
    /// is_empty)`; `is_empty` true means no chapter has ever been written
    /// (spec §8: lowest/highest are then unspecified).
    pub fn find_volume_chapter_boundaries(&self) -> Result<(u64, u64, bool)> {
        let mut lowest: Option<u64> = None;
        let mut highest: Option<u64> = None;
        for physical in 0..self.geometry.chapters_per_volume {
            let absolute = self.geometry.map_to_physical_page(physical, 0);
            let mut buf = vec![0u8; self.geometry.bytes_per_page as usize];
            self.io
                .read_page(absolute, &mut buf)
                .with_context(|| format!("scan chapter boundary page {absolute}"))?;
            if let Some(vcn) = record_page::read_header(&buf) {
                lowest = Some(lowest.map_or(vcn, |l| l.min(vcn)));
                highest = Some(highest.map_or(vcn, |h| h.max(vcn)));
            }
        }
        match (lowest, highest) {
            (Some(l), Some(h)) => Ok((l, h, false)),
            _ => Ok((0, 0, true)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use io_region::FileIoRegion;

    fn geo() -> Geometry {
        Geometry::new(4, 2, 1, 4, 1, 4096).unwrap()
    }

    fn volume() -> (Volume, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volume.bin");
        let g = geo();
        let io = FileIoRegion::create(&path, g.bytes_per_page, 0, g.chapters_per_volume * g.pages_per_chapter() as u64).unwrap();
        (Volume::new(Arc::new(io), g, 4), dir)
    }

    #[test]
    fn read_through_fills_cache() {
        let (v, _dir) = volume();
        let page = v
            .get_volume_page(0, 0, PageKind::Record, ProbeHint::RecordFirst, LookupMode::Normal)
            .unwrap();
        assert_eq!(page.len(), 4096);
        assert_eq!(v.search_cached_record_page(0, 0), PageLookup::Found);
    }

    #[test]
    fn forget_chapter_clears_cache_entries() {
        let (v, _dir) = volume();
        v.get_volume_page(1, 0, PageKind::Record, ProbeHint::RecordFirst, LookupMode::Normal)
            .unwrap();
        v.forget_chapter(1);
        assert_eq!(v.search_cached_record_page(1, 0), PageLookup::NotFound);
    }

    #[test]
    fn empty_volume_reports_is_empty() {
        let (v, _dir) = volume();
        let (lowest, highest, is_empty) = v.find_volume_chapter_boundaries().unwrap();
        assert!(is_empty);
        assert_eq!((lowest, highest), (0, 0));
    }

    #[test]
    fn written_chapter_boundary_is_discovered() {
        let (v, _dir) = volume();
        let records = vec![];
        let page = record_page::encode(7, &records, v.geometry().records_per_page, v.geometry().bytes_per_page);
        v.write_volume_page(2, 0, PageKind::Record, &page).unwrap();
        let (lowest, highest, is_empty) = v.find_volume_chapter_boundaries().unwrap();
        assert!(!is_empty);
        assert_eq!((lowest, highest), (7, 7));
    }
}
