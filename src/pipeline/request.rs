//! The request/outcome vocabulary a caller drives through [`super::Session`]
//! (spec §6 "Public request surface").

use crate::error::IndexError;
use crate::fingerprint::{Fingerprint, Metadata};

/// The four operations the index answers (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Post,
    Update,
    Query,
    Delete,
}

/// Where a fingerprint's record was ultimately found (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Unknown,
    Unavailable,
    InOpenChapter,
    InDense,
    InSparse,
}

/// Which pipeline stage currently owns a request (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Triage,
    Index,
    Message,
    Callback,
}

/// The result delivered to a request's callback once it clears CALLBACK.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub found: bool,
    pub metadata: Option<Metadata>,
    pub location: Location,
    pub error: Option<IndexError>,
}

impl Outcome {
    pub fn not_found() -> Self {
        Self {
            found: false,
            metadata: None,
            location: Location::Unknown,
            error: None,
        }
    }

    pub fn err(kind: crate::error::ErrorKind, message: impl Into<String>) -> Self {
        Self {
            found: false,
            metadata: None,
            location: Location::Unavailable,
            error: Some(IndexError::new(kind, message)),
        }
    }
}

/// One unit of work flowing through the pipeline. Carries the caller's
/// callback plus the internal fields spec §6 names (`zone`, `location`,
/// `status`, `requeued`).
pub struct Request {
    pub fingerprint: Fingerprint,
    pub operation: Operation,
    pub new_metadata: Option<Metadata>,
    pub old_metadata: Option<Metadata>,
    callback: Option<Box<dyn FnOnce(Outcome) + Send>>,
    pub(crate) zone: Option<u32>,
    pub(crate) location: Location,
    pub(crate) requeued: bool,
}

impl Request {
    pub fn new(
        fingerprint: Fingerprint,
        operation: Operation,
        new_metadata: Option<Metadata>,
        callback: impl FnOnce(Outcome) + Send + 'static,
    ) -> Self {
        Self {
            fingerprint,
            operation,
            new_metadata,
            old_metadata: None,
            callback: Some(Box::new(callback)),
            zone: None,
            location: Location::Unknown,
            requeued: false,
        }
    }

    /// Invoke the caller's callback exactly once (spec §4.5 CALLBACK stage).
    /// A second call is a programmer error in this crate's own dispatch code
    /// (every request path completes or errors exactly once), so it panics
    /// rather than silently dropping the outcome.
    pub(crate) fn complete(mut self, outcome: Outcome) {
        let cb = self.callback.take().expect("request completed twice");
        cb(outcome);
    }
}
