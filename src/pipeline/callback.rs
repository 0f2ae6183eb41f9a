//! CALLBACK stage (spec §4.5): a single thread that invokes each request's
//! caller-supplied callback, kept off the zone threads so a slow callback
//! (a channel send that blocks, a caller doing real work in its closure)
//! never stalls that zone's dispatch loop. Grounded on the same
//! one-thread-drains-a-funnel-queue shape as `triage.rs` and `zone_worker.rs`.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use super::request::{Outcome, Request};
use super::session::SessionShared;

pub fn run(shared: Arc<SessionShared>) {
    let queue = Arc::clone(&shared.callback_queue);
    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }
        match queue.poll_timeout(Duration::from_millis(50)) {
            Some((req, outcome)) => deliver(req, outcome),
            None => continue,
        }
    }
    // Drain whatever zone workers enqueued between the shutdown flag being
    // set and this thread's last poll, so no caller is left waiting forever
    // on a channel that will never receive.
    while let Some((req, outcome)) = queue.poll() {
        deliver(req, outcome);
    }
}

fn deliver(req: Request, outcome: Outcome) {
    crate::metrics::record_request_completed();
    req.complete(outcome);
}
