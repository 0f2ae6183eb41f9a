//! Inter-zone control messages (spec §4.5, §5, §8 boundary behaviours),
//! delivered through the same per-zone [`super::FunnelQueue`] as ordinary
//! requests so they are strictly ordered with respect to that zone's
//! request stream.

/// A message routed to a zone worker: either a request to service or a
/// control signal from the triage stage / a sibling zone.
pub enum ZoneMessage {
    Request(crate::pipeline::request::Request),
    Control(ControlMessage),
}

pub enum ControlMessage {
    /// Broadcast to every zone before a query dispatches against a sparse
    /// chapter, guaranteeing each zone's sparse cache holds that chapter's
    /// index before the query is serviced (spec §4.5, testable property 3).
    SparseCacheBarrier { vcn: u64 },
    /// Sent by the zone that completed a chapter's seal to every sibling
    /// zone still filling the same VCN, forcing an early rotation (spec
    /// §4.4 step 5, §8 "multi-zone sparse with Z=2").
    ChapterClosedAnnouncement { vcn: u64 },
    /// Request a snapshot of this zone's open chapter for `save`/`flush`.
    Snapshot(std::sync::mpsc::Sender<Vec<(crate::fingerprint::Fingerprint, crate::fingerprint::Metadata)>>),
    /// Seed a freshly spawned zone worker's open chapter with records
    /// restored from a save slot (spec §4.6 load), sent once before any
    /// ordinary request reaches the queue.
    Restore(Vec<(crate::fingerprint::Fingerprint, crate::fingerprint::Metadata)>),
}
