//! TRIAGE stage (spec §4.5): a single thread that looks up a request's
//! hinted chapter via the volume index and, if that chapter is in the
//! sparse tier, broadcasts a `SparseCacheBarrier` to every zone before
//! routing the request to its owning zone (testable property 3). Only
//! runs when `zone_count > 1` and a sparse tier is configured; otherwise
//! `Session::submit` routes directly and this thread is never spawned.
//!
//! Memoizes the last VCN a barrier was broadcast for (spec §9 open
//! question) and skips an identical back-to-back broadcast: the barrier
//! invariant only requires every zone to observe *a* barrier for a VCN
//! before that VCN is queried, not one per request, so eliding a repeat is
//! a pure latency win. The memo is a single thread-local (this is the only
//! triage thread), reset implicitly whenever a different VCN is hinted.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use super::control::ZoneMessage;
use super::request::Request;
use super::session::SessionShared;

pub fn run(shared: Arc<SessionShared>) {
    let queue = shared.triage_queue.as_ref().expect("triage thread requires a triage queue").clone();
    let mut last_barrier_vcn: Option<u64> = None;
    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }
        let req = match queue.poll_timeout(Duration::from_millis(50)) {
            Some(r) => r,
            None => continue,
        };
        route(&shared, req, &mut last_barrier_vcn);
    }
}

fn route(shared: &SessionShared, req: Request, last_barrier_vcn: &mut Option<u64>) {
    let zone = shared.volume_index.lock().unwrap().get_zone(&req.fingerprint);
    let triage = shared.volume_index.lock().unwrap().lookup_name(&req.fingerprint);
    if let Some(vcn) = triage.virtual_chapter {
        let (oldest, newest) = *shared.window.lock().unwrap();
        if shared.geometry.is_chapter_sparse(oldest, newest, vcn) {
            if *last_barrier_vcn == Some(vcn) {
                crate::metrics::record_barrier_suppressed();
            } else {
                crate::metrics::record_barrier_broadcast();
                for q in &shared.zone_queues {
                    q.put(ZoneMessage::Control(super::control::ControlMessage::SparseCacheBarrier { vcn }));
                }
                *last_barrier_vcn = Some(vcn);
            }
        }
    }
    shared.zone_queues[zone as usize].put(ZoneMessage::Request(req));
}
