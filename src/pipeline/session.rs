//! The public facade (spec §4.5, §6 "Session lifecycle"): owns every
//! thread, the durable layout, and the state machine a caller drives
//! through `open`/`suspend`/`resume`/`flush`/`save`/`close`.
//!
//! Grounded on the teacher's `Db` (`db/mod.rs`): a single struct holding
//! an `Arc` of shared state plus the background threads it spawned at
//! `open`, joined at `close`. State transitions use the same
//! `Mutex`+`Condvar` pattern as `wal/writer.rs`'s shutdown handshake.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use log::error;

use rand::RngCore;

use crate::chapter::ChapterWriter;
use crate::config::{Configuration, LoadType};
use crate::error::{from_anyhow, ErrorKind, IndexError, Result};
use crate::fingerprint::{Fingerprint, Metadata};
use crate::geometry::Geometry;
use crate::layout::geometry_block::GeometryBlock;
use crate::layout::Layout;
use crate::lock::{self, LockGuard};
use crate::volume::io_region::FileIoRegion;
use crate::volume::Volume;
use crate::volume_index::VolumeIndex;

const GEOMETRY_RELEASE_VERSION: u32 = 1;

use super::control::{ControlMessage, ZoneMessage};
use super::request::{Operation, Outcome, Request};
use super::FunnelQueue;

/// The handful of states spec §6 names for a session's lifecycle. Kept as
/// a plain enum rather than a bitset: this crate's states are mutually
/// exclusive, never combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Loading,
    Loaded,
    Suspended,
    Waiting,
    Closing,
    Destroying,
    Disabled,
}

/// State shared by every thread a session spawns. Nothing outside this
/// module touches its fields directly; `zone_worker` and `triage` borrow
/// it only through the accessor methods defined here.
pub struct SessionShared {
    pub(crate) root: PathBuf,
    pub(crate) geometry: Geometry,
    pub(crate) config: Configuration,
    pub(crate) volume: Arc<Volume>,
    pub(crate) volume_index: Mutex<VolumeIndex>,
    pub(crate) chapter_writer: ChapterWriter,
    /// `(oldest_vcn, newest_vcn)`, the rolling window every zone agrees on
    /// (spec §3 invariant 1).
    pub(crate) window: Mutex<(u64, u64)>,
    pub(crate) zone_count: u32,
    pub(crate) zone_queues: Vec<Arc<FunnelQueue<ZoneMessage>>>,
    pub(crate) triage_queue: Option<Arc<FunnelQueue<Request>>>,
    /// CALLBACK stage (spec §4.5): zone workers hand a finished request here
    /// instead of invoking its callback inline, so a slow caller callback
    /// never blocks a zone's dispatch loop.
    pub(crate) callback_queue: Arc<FunnelQueue<(Request, Outcome)>>,
    pub(crate) shutdown: AtomicBool,
}

impl SessionShared {
    /// Each zone's open chapter is sized so `zone_count` zones together
    /// cover one chapter's full record capacity (spec §4.4: "the open
    /// chapter for zone z holds this zone's share of the chapter
    /// currently being filled").
    pub fn zone_open_chapter_capacity(&self) -> usize {
        let slots = self.geometry.record_pages_per_chapter as u64 * self.geometry.records_per_page as u64;
        ((slots / self.zone_count.max(1) as u64).max(1)) as usize
    }
}

/// A running deduplication index (spec §6). Dropping it without calling
/// [`Session::close`] still shuts down every thread cleanly, but skips the
/// final save a caller may have wanted.
pub struct Session {
    shared: Arc<SessionShared>,
    state: Arc<(Mutex<SessionState>, Condvar)>,
    threads: Vec<JoinHandle<()>>,
    _lock: LockGuard,
    component_id: u32,
}

const COMPONENT_ID: u32 = 0x4442_4450; // "DBDP"

impl Session {
    /// Open (or create, or rebuild) a session rooted at `root` (spec §4.6,
    /// §6 "Session lifecycle").
    pub fn open(root: impl AsRef<Path>, config: Configuration, load_type: LoadType) -> Result<Self> {
        config.validate()?;
        let root = root.as_ref().to_path_buf();
        let file_lock = lock::acquire_exclusive_lock(&root).map_err(from_anyhow)?;

        let layout = Layout::new(&root);
        let geometry = config.to_geometry()?;
        reconcile_geometry_block(&layout, &config)?;

        let snapshot = layout.load_latest().map_err(from_anyhow)?;

        let (volume_index, window, open_chapters, index_page_map_data, needs_rebuild) = match (load_type, &snapshot) {
            (LoadType::Create, Some(_)) => {
                return Err(IndexError::new(ErrorKind::BadState, "volume already exists; refusing to re-create"));
            }
            (LoadType::Create, None) => {
                let vi = VolumeIndex::new(config.zone_count, config.sparse_sample_rate, config.volume_index_mean_delta, config.chapters_per_volume);
                (vi, (0u64, 0u64), vec![Vec::new(); config.zone_count as usize], Vec::new(), false)
            }
            (LoadType::Load, None) => {
                return Err(IndexError::new(ErrorKind::IndexNotSavedCleanly, "no save slot found"));
            }
            (LoadType::Load, Some(data)) => {
                let (vi, win, chapters, map) = crate::layout::restore_snapshot(&geometry, data);
                (vi, win, chapters, map.entries(), false)
            }
            (LoadType::Rebuild, Some(data)) => {
                let (vi, win, chapters, map) = crate::layout::restore_snapshot(&geometry, data);
                (vi, win, chapters, map.entries(), false)
            }
            (LoadType::Rebuild, None) => {
                let vi = VolumeIndex::new(config.zone_count, config.sparse_sample_rate, config.volume_index_mean_delta, config.chapters_per_volume);
                (vi, (0u64, 0u64), vec![Vec::new(); config.zone_count as usize], Vec::new(), true)
            }
        };

        let pages_per_volume = geometry.chapters_per_volume * geometry.pages_per_chapter() as u64;
        let volume_path = layout.volume_path();
        let io = if volume_path.exists() {
            FileIoRegion::open(&volume_path, geometry.bytes_per_page, config.offset)
        } else {
            FileIoRegion::create(&volume_path, geometry.bytes_per_page, config.offset, pages_per_volume)
        }
        .map_err(from_anyhow)?;

        let volume = Arc::new(Volume::new(Arc::new(io), geometry, config.cache_chapters));
        let chapter_writer = ChapterWriter::new(Arc::clone(&volume), geometry);
        {
            let mut map = chapter_writer.index_page_map().lock().unwrap();
            for (physical_chapter, highest_per_page) in index_page_map_data {
                map.record(physical_chapter, highest_per_page);
            }
        }

        let zone_queues: Vec<_> = (0..config.zone_count).map(|_| Arc::new(FunnelQueue::new())).collect();
        let use_triage = config.zone_count > 1 && geometry.sparse_chapters_per_volume > 0;
        let triage_queue = if use_triage { Some(Arc::new(FunnelQueue::new())) } else { None };
        let callback_queue = Arc::new(FunnelQueue::new());

        let shared = Arc::new(SessionShared {
            root: root.clone(),
            geometry,
            config: config.clone(),
            volume,
            volume_index: Mutex::new(volume_index),
            chapter_writer,
            window: Mutex::new(window),
            zone_count: config.zone_count,
            zone_queues,
            triage_queue,
            callback_queue,
            shutdown: AtomicBool::new(false),
        });

        if needs_rebuild {
            crate::recovery::rebuild(&shared).map_err(from_anyhow)?;
        }

        // Seed each zone's queue with its restored open-chapter records
        // before the worker thread starts draining it, so they land in the
        // in-memory open chapter ahead of any real request (spec §4.6 load).
        for (z, records) in open_chapters.into_iter().enumerate() {
            if !records.is_empty() {
                shared.zone_queues[z].put(ZoneMessage::Control(ControlMessage::Restore(records)));
            }
        }

        let mut threads = Vec::new();
        for z in 0..shared.zone_count {
            let s = Arc::clone(&shared);
            let name = format!("zone-{z}");
            let thread_name = name.clone();
            let handle = std::thread::Builder::new()
                .name(name)
                .spawn(move || run_guarded(&thread_name, Arc::clone(&s), move || super::zone_worker::run(z, Arc::clone(&s))))
                .expect("spawn zone worker thread");
            threads.push(handle);
        }
        if use_triage {
            let s = Arc::clone(&shared);
            let handle = std::thread::Builder::new()
                .name("triage".into())
                .spawn(move || run_guarded("triage", Arc::clone(&s), move || super::triage::run(Arc::clone(&s))))
                .expect("spawn triage thread");
            threads.push(handle);
        }
        {
            let s = Arc::clone(&shared);
            let handle = std::thread::Builder::new()
                .name("callback".into())
                .spawn(move || run_guarded("callback", Arc::clone(&s), move || super::callback::run(Arc::clone(&s))))
                .expect("spawn callback thread");
            threads.push(handle);
        }

        Ok(Self {
            shared,
            state: Arc::new((Mutex::new(SessionState::Loaded), Condvar::new())),
            threads,
            _lock: file_lock,
            component_id: COMPONENT_ID,
        })
    }

    pub fn state(&self) -> SessionState {
        *self.state.0.lock().unwrap()
    }

    fn set_state(&self, s: SessionState) {
        *self.state.0.lock().unwrap() = s;
        self.state.1.notify_all();
    }

    /// Pause request processing without tearing threads down (spec §6
    /// `suspend`). Blocks until any load currently in `Loading` reaches a
    /// safe suspend point (this crate's only `Loading` work happens inside
    /// `Session::open`, before a caller can observe the session at all, so
    /// in practice this never waits; the wait is kept so a future loading
    /// state added under `Loading` is covered for free).
    pub fn suspend(&self) {
        let (lock, cvar) = &*self.state;
        let mut guard = lock.lock().unwrap();
        guard = cvar.wait_while(guard, |s| *s == SessionState::Loading).unwrap();
        *guard = SessionState::Suspended;
        cvar.notify_all();
    }

    /// Resume request processing (spec §6 `resume`). Only meaningful from
    /// `Suspended`; a no-op otherwise.
    pub fn resume(&self) {
        let (lock, cvar) = &*self.state;
        let mut guard = lock.lock().unwrap();
        if *guard == SessionState::Suspended {
            *guard = SessionState::Loaded;
            cvar.notify_all();
        }
    }

    /// Write a fresh save slot (spec §4.6 `save`): drains every zone's open
    /// chapter via a `Snapshot` control message and waits for any seal in
    /// flight, so the written snapshot and the durable volume agree. Fails
    /// (and disables the session) if the chapter writer recorded a write
    /// failure since the last save — the volume index may reference a
    /// chapter that never made it to disk (spec §4.4).
    pub fn save(&self) -> Result<()> {
        self.shared.chapter_writer.wait_for_idle();
        if let Some(failure) = self.shared.chapter_writer.take_failure() {
            self.set_state(SessionState::Disabled);
            return Err(IndexError::new(
                ErrorKind::Unknown,
                format!("refusing to save: chapter writer failed: {failure}"),
            ));
        }
        let open_chapters = self.snapshot_open_chapters();
        let window = *self.shared.window.lock().unwrap();
        let index_page_map = self.shared.chapter_writer.index_page_map().lock().unwrap().clone();
        let data = {
            let vi = self.shared.volume_index.lock().unwrap();
            crate::layout::build_snapshot(&self.shared.config, window, &vi, &open_chapters, &index_page_map)
        };
        let layout = Layout::new(&self.shared.root);
        layout.save(self.component_id, &data).map_err(from_anyhow)
    }

    fn snapshot_open_chapters(&self) -> Vec<Vec<(Fingerprint, Metadata)>> {
        let mut out = Vec::with_capacity(self.shared.zone_count as usize);
        for q in &self.shared.zone_queues {
            let (tx, rx) = std::sync::mpsc::channel();
            q.put(ZoneMessage::Control(ControlMessage::Snapshot(tx)));
            out.push(rx.recv().unwrap_or_default());
        }
        out
    }

    /// Block until every zone's queue is idle and the chapter writer has no
    /// work in flight (spec §6 `flush`).
    pub fn flush(&self) {
        while self.shared.zone_queues.iter().any(|q| !q.is_idle()) {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        self.shared.chapter_writer.wait_for_idle();
    }

    /// Close the session (spec §6 `close`), optionally saving first. Refuses
    /// while suspended: a suspended session has a caller expecting to
    /// `resume()` it, and tearing its threads down out from under them would
    /// silently turn a pause into a close. Dropping a refused `Session`
    /// still shuts its threads down cleanly (see the struct's doc comment);
    /// it just skips the save.
    pub fn close(mut self, save_first: bool) -> Result<()> {
        if self.state() == SessionState::Suspended {
            return Err(IndexError::new(ErrorKind::BadState, "cannot close a suspended session; resume it first"));
        }
        self.set_state(SessionState::Closing);
        if save_first {
            if let Err(e) = self.save() {
                self.set_state(SessionState::Disabled);
                return Err(e);
            }
        }
        self.shutdown_threads();
        self.set_state(SessionState::Destroying);
        Ok(())
    }

    /// Tear down a volume entirely: shut down threads, then remove every
    /// file this session owns (spec §6 `destroy`). Irreversible. Unlike
    /// `close`, proceeds regardless of state: `destroy` forcibly terminates
    /// whatever a session is doing (spec §6 "destroy forces termination of
    /// an in-progress rebuild") rather than refusing.
    pub fn destroy(mut self) -> Result<()> {
        self.set_state(SessionState::Destroying);
        let root = self.shared.root.clone();
        self.shutdown_threads();
        std::fs::remove_dir_all(&root).map_err(IndexError::from)?;
        Ok(())
    }

    fn shutdown_threads(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }

    /// Enqueue `req`, routing through the triage stage when sparse routing
    /// is in use, directly to its owning zone otherwise (spec §4.5).
    pub fn submit(&self, req: Request) -> Result<()> {
        match self.state() {
            SessionState::Disabled => return Err(IndexError::new(ErrorKind::Disabled, "session is disabled")),
            SessionState::Suspended => return Err(IndexError::new(ErrorKind::BadState, "session is suspended")),
            _ => {}
        }
        crate::metrics::record_request_queued();
        if let Some(triage_queue) = &self.shared.triage_queue {
            triage_queue.put(req);
        } else {
            let zone = self.shared.volume_index.lock().unwrap().get_zone(&req.fingerprint);
            self.shared.zone_queues[zone as usize].put(ZoneMessage::Request(req));
        }
        Ok(())
    }

    fn blocking(&self, fingerprint: Fingerprint, operation: Operation, metadata: Option<Metadata>) -> Result<Outcome> {
        let (tx, rx) = std::sync::mpsc::channel();
        let req = Request::new(fingerprint, operation, metadata, move |outcome| {
            let _ = tx.send(outcome);
        });
        self.submit(req)?;
        rx.recv().map_err(|_| IndexError::new(ErrorKind::Unknown, "request dropped before completion"))
    }

    pub fn post(&self, fingerprint: Fingerprint, metadata: Metadata) -> Result<Outcome> {
        self.blocking(fingerprint, Operation::Post, Some(metadata))
    }

    pub fn update(&self, fingerprint: Fingerprint, metadata: Metadata) -> Result<Outcome> {
        self.blocking(fingerprint, Operation::Update, Some(metadata))
    }

    pub fn query(&self, fingerprint: Fingerprint) -> Result<Outcome> {
        self.blocking(fingerprint, Operation::Query, None)
    }

    pub fn delete(&self, fingerprint: Fingerprint) -> Result<Outcome> {
        self.blocking(fingerprint, Operation::Delete, None)
    }

    pub fn stats(&self) -> crate::metrics::Stats {
        crate::metrics::snapshot()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.threads.is_empty() {
            self.shutdown_threads();
        }
    }
}

/// Write the geometry block (spec §6 "Geometry block") on first creation
/// of a volume, or validate the existing one matches this configuration's
/// pinned `nonce` on every later open. A `nonce` of 0 (the default, spec
/// §6 "random 64-bit index identity") means the caller hasn't pinned an
/// identity and skips the check, the way the teacher's own open path lets
/// a fresh `QuiverConfig` attach to an existing store without re-deriving
/// every field from disk.
fn reconcile_geometry_block(layout: &Layout, config: &Configuration) -> Result<()> {
    match layout.read_geometry_block().map_err(from_anyhow)? {
        Some(existing) => {
            if config.nonce != 0 && existing.nonce != config.nonce {
                return Err(IndexError::new(
                    ErrorKind::InvalidArgument,
                    format!(
                        "configured nonce {} does not match volume's geometry block nonce {}",
                        config.nonce, existing.nonce
                    ),
                ));
            }
            Ok(())
        }
        None => {
            let nonce = if config.nonce != 0 { config.nonce } else { rand::thread_rng().next_u64() };
            let mut uuid = [0u8; 16];
            rand::thread_rng().fill_bytes(&mut uuid);
            let block = GeometryBlock {
                release_version: GEOMETRY_RELEASE_VERSION,
                nonce,
                uuid,
                bio_offset: config.offset,
                memory_size: config.memory_size,
                sparse_chapters_per_volume: config.sparse_chapters_per_volume,
            };
            layout.write_geometry_block(&block).map_err(from_anyhow)
        }
    }
}

/// Run `body` on a named thread, converting a panic into a disabled
/// session rather than an aborted process (spec §5 "every named thread
/// catches its own panics"; spec §7 fatal-error handling). Grounded on the
/// teacher's worker threads, which likewise never let a single bad request
/// take the whole process down.
fn run_guarded(name: &str, shared: Arc<SessionShared>, body: impl FnOnce()) {
    if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(body)) {
        let msg = panic_message(&panic);
        error!("thread '{name}' panicked: {msg}; disabling session");
        shared.shutdown.store(true, Ordering::SeqCst);
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;

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

    #[test]
    fn post_then_query_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::open(dir.path(), test_config(1), LoadType::Create).unwrap();
        let fp = Fingerprint::new([3u8; 16]);
        let md = Metadata::new([9u8; 16]);
        session.post(fp, md).unwrap();
        let outcome = session.query(fp).unwrap();
        assert!(outcome.found);
        assert_eq!(outcome.metadata, Some(md));
        session.close(false).unwrap();
    }

    #[test]
    fn query_for_unknown_fingerprint_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::open(dir.path(), test_config(1), LoadType::Create).unwrap();
        let outcome = session.query(Fingerprint::new([1u8; 16])).unwrap();
        assert!(!outcome.found);
        session.close(false).unwrap();
    }

    #[test]
    fn create_on_existing_volume_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::open(dir.path(), test_config(1), LoadType::Create).unwrap();
        session.save().unwrap();
        session.close(false).unwrap();
        let reopened = Session::open(dir.path(), test_config(1), LoadType::Create);
        assert!(reopened.is_err());
    }

    #[test]
    fn save_then_load_restores_a_posted_record() {
        let dir = tempfile::tempdir().unwrap();
        let fp = Fingerprint::new([4u8; 16]);
        let md = Metadata::new([8u8; 16]);
        {
            let session = Session::open(dir.path(), test_config(1), LoadType::Create).unwrap();
            session.post(fp, md).unwrap();
            session.save().unwrap();
            session.close(false).unwrap();
        }
        let session = Session::open(dir.path(), test_config(1), LoadType::Load).unwrap();
        let outcome = session.query(fp).unwrap();
        assert!(outcome.found);
        assert_eq!(outcome.metadata, Some(md));
        session.close(false).unwrap();
    }
}
