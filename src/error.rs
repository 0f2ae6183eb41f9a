//! Public error type for the deduplication index.
//!
//! Internal plumbing (file I/O, byte-level codec helpers, on-disk layout
//! parsing) uses `anyhow::Result` with `.context(...)`, the same way the
//! teacher crate does throughout `pager/` and `meta.rs`. This module is the
//! single place where that freeform error gets mapped onto the closed,
//! ABI-stable set of error kinds the index promises its callers.

use std::fmt;

/// Closed set of error kinds. Numbering is part of the index's ABI; unused
/// codes are reserved rather than renumbered. `Success` has no variant here
/// since it is represented by `Ok(())` / `Ok(T)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    Disabled,
    CorruptComponent,
    Unknown,
    UnsupportedVersion,
    CorruptData,
    ShortRead,
    ResourceLimitExceeded,
    VolumeOverflow,
    NoIndex,
    EndOfFile,
    IndexNotSavedCleanly,
    Overflow,
    InvalidArgument,
    BadState,
    DuplicateName,
    UnexpectedResult,
    AssertionFailed,
    Queued,
    BufferError,
    NoDirectory,
    CheckpointIncomplete,
    AlreadyRegistered,
    BadIoDirection,
    IncorrectAlignment,
    OutOfRange,
    CorruptFile,
}

impl ErrorKind {
    /// Stable short name, suitable for logs and for matching in tests.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Disabled => "DISABLED",
            ErrorKind::CorruptComponent => "CORRUPT_COMPONENT",
            ErrorKind::Unknown => "UNKNOWN",
            ErrorKind::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorKind::CorruptData => "CORRUPT_DATA",
            ErrorKind::ShortRead => "SHORT_READ",
            ErrorKind::ResourceLimitExceeded => "RESOURCE_LIMIT_EXCEEDED",
            ErrorKind::VolumeOverflow => "VOLUME_OVERFLOW",
            ErrorKind::NoIndex => "NO_INDEX",
            ErrorKind::EndOfFile => "END_OF_FILE",
            ErrorKind::IndexNotSavedCleanly => "INDEX_NOT_SAVED_CLEANLY",
            ErrorKind::Overflow => "OVERFLOW",
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::BadState => "BAD_STATE",
            ErrorKind::DuplicateName => "DUPLICATE_NAME",
            ErrorKind::UnexpectedResult => "UNEXPECTED_RESULT",
            ErrorKind::AssertionFailed => "ASSERTION_FAILED",
            ErrorKind::Queued => "QUEUED",
            ErrorKind::BufferError => "BUFFER_ERROR",
            ErrorKind::NoDirectory => "NO_DIRECTORY",
            ErrorKind::CheckpointIncomplete => "CHECKPOINT_INCOMPLETE",
            ErrorKind::AlreadyRegistered => "ALREADY_REGISTERED",
            ErrorKind::BadIoDirection => "BAD_IO_DIRECTION",
            ErrorKind::IncorrectAlignment => "INCORRECT_ALIGNMENT",
            ErrorKind::OutOfRange => "OUT_OF_RANGE",
            ErrorKind::CorruptFile => "CORRUPT_FILE",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ErrorKind {
    /// Error-handling class from spec §7: advisory errors don't disturb the
    /// request's contract, request-local ones are returned to the caller,
    /// chapter-scoped ones mark a chapter unusable, fatal ones disable the
    /// session.
    pub fn class(self) -> ErrorClass {
        match self {
            ErrorKind::Overflow => ErrorClass::Advisory,
            ErrorKind::Queued => ErrorClass::Advisory,
            ErrorKind::CorruptData | ErrorKind::CorruptFile | ErrorKind::CorruptComponent => {
                ErrorClass::ChapterScoped
            }
            ErrorKind::Disabled
            | ErrorKind::AssertionFailed
            | ErrorKind::ResourceLimitExceeded
            | ErrorKind::VolumeOverflow => ErrorClass::Fatal,
            _ => ErrorClass::RequestLocal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Advisory,
    RequestLocal,
    ChapterScoped,
    Fatal,
}

/// A deduplication-index error: a stable `kind` plus a free-form message for
/// logs and debugging. The message is not part of the ABI; only `kind` is.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct IndexError {
    pub kind: ErrorKind,
    message: String,
}

impl IndexError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind as IoKind;
        let kind = match e.kind() {
            IoKind::UnexpectedEof => ErrorKind::EndOfFile,
            IoKind::NotFound => ErrorKind::NoIndex,
            IoKind::InvalidInput | IoKind::InvalidData => ErrorKind::InvalidArgument,
            _ => ErrorKind::Unknown,
        };
        IndexError::new(kind, e.to_string())
    }
}

/// Converts a freeform internal error (the teacher's `anyhow` idiom) into the
/// ABI-stable shape at the public boundary. Used by `Session`/`Request`
/// entry points; internal helpers keep returning `anyhow::Result`.
pub fn from_anyhow(e: anyhow::Error) -> IndexError {
    match e.downcast::<IndexError>() {
        Ok(already) => already,
        Err(e) => IndexError::new(ErrorKind::UnexpectedResult, e.to_string()),
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_match_abi() {
        assert_eq!(ErrorKind::DuplicateName.as_str(), "DUPLICATE_NAME");
        assert_eq!(ErrorKind::Queued.as_str(), "QUEUED");
    }

    #[test]
    fn classification_matches_spec() {
        assert_eq!(ErrorKind::Overflow.class(), ErrorClass::Advisory);
        assert_eq!(ErrorKind::Disabled.class(), ErrorClass::Fatal);
        assert_eq!(ErrorKind::CorruptData.class(), ErrorClass::ChapterScoped);
        assert_eq!(ErrorKind::InvalidArgument.class(), ErrorClass::RequestLocal);
    }

    #[test]
    fn from_anyhow_roundtrips_index_error() {
        let original = IndexError::new(ErrorKind::BadState, "zone mismatch");
        let wrapped: anyhow::Error = anyhow::Error::new(original);
        let back = from_anyhow(wrapped);
        assert_eq!(back.kind(), ErrorKind::BadState);
    }

    #[test]
    fn from_anyhow_falls_back_to_unexpected_result() {
        let e = from_anyhow(anyhow::anyhow!("boom"));
        assert_eq!(e.kind(), ErrorKind::UnexpectedResult);
    }
}
