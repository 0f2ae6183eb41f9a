//! Request pipeline (spec §4.5): TRIAGE -> INDEX -> MESSAGE -> CALLBACK.
//!
//! Split the way the teacher's `db/mod.rs` separates `open`/`kv`/`batch`:
//! `request.rs` is the request/outcome vocabulary, `control.rs` the
//! inter-zone control messages, `funnel_queue.rs` the MPSC queue every
//! stage hands work through, `triage.rs` the optional triage thread,
//! `zone_worker.rs` the per-zone dispatch loop, `callback.rs` the CALLBACK
//! stage thread, and `session.rs` the public facade tying threads, state,
//! and the on-disk layout together.

pub mod callback;
pub mod control;
pub mod funnel_queue;
pub mod request;
pub mod session;
pub mod triage;
pub mod zone_worker;

pub use control::ControlMessage;
pub use funnel_queue::FunnelQueue;
pub use request::{Location, Operation, Outcome, Request, Stage};
pub use session::Session;
