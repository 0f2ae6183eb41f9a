//! Core deduplication index (spec.md §1): an append-only, chaptered
//! fingerprint -> storage-location index with a rolling LRU window of
//! sealed chapters on stable storage and an in-memory delta-compressed
//! volume index over it.
//!
//! This crate answers one question: *have we seen this fingerprint
//! before, and if so where?* It returns *advice*, not a guarantee — the
//! caller is expected to verify a hit by reading the underlying data
//! block before trusting it (spec §1 "Non-goals").
//!
//! # Layout
//!
//! Split the way the teacher crate (see `TEACHER.txt`) lays out a storage
//! engine: small leaf modules for pure data (`fingerprint`, `geometry`,
//! `bitcodec`), a `volume`/`volume_index`/`chapter` trio for the on-disk
//! and in-memory data model, `pipeline` for the request-processing
//! threads, and `layout`/`recovery` for durability and crash recovery.
//!
//! ```no_run
//! use dedup_index::{Configuration, Fingerprint, LoadType, Metadata, Session};
//!
//! let session = Session::open("/var/lib/dedup-index", Configuration::default(), LoadType::Create)?;
//! let fp = Fingerprint::new([0u8; 16]);
//! let md = Metadata::new([1u8; 16]);
//! session.post(fp, md)?;
//! let outcome = session.query(fp)?;
//! assert!(outcome.found);
//! session.close(true)?;
//! # Ok::<(), dedup_index::error::IndexError>(())
//! ```

pub mod bitcodec;
pub mod chapter;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod geometry;
pub mod layout;
pub mod lock;
pub mod metrics;
pub mod pipeline;
pub mod recovery;
pub mod volume;
pub mod volume_index;

pub use config::{ChapterSize, Configuration, ConfigurationBuilder, DeviceParams, LoadType};
pub use error::{ErrorClass, ErrorKind, IndexError, Result};
pub use fingerprint::{Fingerprint, Metadata, Record};
pub use geometry::Geometry;
pub use pipeline::{Location, Operation, Outcome, Session};
