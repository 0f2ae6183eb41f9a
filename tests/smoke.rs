//! End-to-end lifecycle smoke test, the way the teacher's `tests/smoke.rs`
//! exercises a whole session open-to-close cycle rather than one function
//! in isolation.

use dedup_index::config::{Configuration, LoadType};
use dedup_index::fingerprint::{Fingerprint, Metadata};
use dedup_index::pipeline::Session;

fn config(zone_count: u32) -> Configuration {
    Configuration {
        chapters_per_volume: 16,
        sparse_chapters_per_volume: 4,
        record_pages_per_chapter: 2,
        bytes_per_page: 4096,
        zone_count,
        ..Configuration::default()
    }
}

#[test]
fn post_update_query_delete_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let session = Session::open(dir.path(), config(2), LoadType::Create).unwrap();

    let fp = Fingerprint::new([42u8; 16]);
    let md = Metadata::new([1u8; 16]);
    session.post(fp, md).unwrap();

    let found = session.query(fp).unwrap();
    assert!(found.found);
    assert_eq!(found.metadata, Some(md));

    let md2 = Metadata::new([2u8; 16]);
    session.update(fp, md2).unwrap();
    let after_update = session.query(fp).unwrap();
    assert_eq!(after_update.metadata, Some(md2));

    session.delete(fp).unwrap();
    let after_delete = session.query(fp).unwrap();
    assert!(!after_delete.found);

    session.close(false).unwrap();
}

#[test]
fn suspend_and_resume_do_not_lose_in_flight_state() {
    let dir = tempfile::tempdir().unwrap();
    let session = Session::open(dir.path(), config(1), LoadType::Create).unwrap();
    let fp = Fingerprint::new([7u8; 16]);
    let md = Metadata::new([8u8; 16]);
    session.post(fp, md).unwrap();

    session.suspend();
    session.resume();

    let outcome = session.query(fp).unwrap();
    assert!(outcome.found);
    session.close(false).unwrap();
}

#[test]
fn suspended_session_rejects_submits_until_resumed() {
    let dir = tempfile::tempdir().unwrap();
    let session = Session::open(dir.path(), config(1), LoadType::Create).unwrap();
    let fp = Fingerprint::new([11u8; 16]);
    let md = Metadata::new([12u8; 16]);

    session.suspend();
    assert!(session.post(fp, md).is_err());

    session.resume();
    session.post(fp, md).unwrap();
    let outcome = session.query(fp).unwrap();
    assert!(outcome.found);
    session.close(false).unwrap();
}

#[test]
fn close_refuses_a_suspended_session() {
    let dir = tempfile::tempdir().unwrap();
    let session = Session::open(dir.path(), config(1), LoadType::Create).unwrap();
    session.suspend();
    assert!(session.close(false).is_err(), "close must refuse a suspended session");
    // The refused `Session` was consumed by the call above; its `Drop`
    // still shuts every thread down, it just skipped the save.
}

#[test]
fn stats_reflect_request_traffic() {
    let dir = tempfile::tempdir().unwrap();
    let session = Session::open(dir.path(), config(1), LoadType::Create).unwrap();
    let before = session.stats().requests_completed;
    session.post(Fingerprint::new([1u8; 16]), Metadata::new([1u8; 16])).unwrap();
    session.query(Fingerprint::new([1u8; 16])).unwrap();
    let after = session.stats().requests_completed;
    assert!(after >= before + 2);
    session.close(false).unwrap();
}

#[test]
fn save_load_reopen_preserves_posted_records_across_zones() {
    let dir = tempfile::tempdir().unwrap();
    let fps: Vec<_> = (0..20u8).map(|b| Fingerprint::new([b; 16])).collect();
    let md = Metadata::new([99u8; 16]);
    {
        let session = Session::open(dir.path(), config(3), LoadType::Create).unwrap();
        for fp in &fps {
            session.post(*fp, md).unwrap();
        }
        session.flush();
        session.save().unwrap();
        session.close(false).unwrap();
    }
    let session = Session::open(dir.path(), config(3), LoadType::Load).unwrap();
    for fp in &fps {
        let outcome = session.query(*fp).unwrap();
        assert!(outcome.found, "fingerprint should survive a save/load round trip");
        assert_eq!(outcome.metadata, Some(md));
    }
    session.close(false).unwrap();
}
