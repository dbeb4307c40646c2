use serde::Serialize;
use std::{io, path::PathBuf};

/// Shared error type used by the storage core and the command front end.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    /// File system I/O failure.
    #[error("I/O error while accessing {0}")]
    Io(PathBuf, #[source] io::Error),

    /// A path is malformed or tries to escape its root.
    #[error("invalid path: {0}")]
    PathInvalid(String),

    /// A path that was expected to exist does not.
    #[error("not found: {0}")]
    NotFound(String),

    /// Target is unwritable, or the owning root is read-only.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A conflict prevented the operation from proceeding.
    #[error("resource conflict: {0}")]
    Conflict(String),

    /// The requested byte range cannot be served.
    #[error("range not satisfiable for length {total}")]
    RangeNotSatisfiable { total: u64 },

    /// The root does not offer the requested capability (e.g. trash).
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// An operation was rejected due to configuration/argument issues.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The operation could not be completed because a pre-condition failed.
    #[error("pre-condition failed: {0}")]
    PreconditionFailed(String),
}

/// Coarse classification of an error, as rendered at the command boundary.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PathInvalid,
    NotFound,
    PermissionDenied,
    Conflict,
    PartialFailure,
    ProtocolRangeError,
    Internal,
}

impl CoreError {
    pub fn path_invalid(message: impl Into<String>) -> Self {
        Self::PathInvalid(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation(message.into())
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionFailed(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, error: io::Error) -> Self {
        Self::Io(path.into(), error)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PathInvalid(_) => ErrorKind::PathInvalid,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Io(_, err) if err.kind() == io::ErrorKind::NotFound => ErrorKind::NotFound,
            Self::Io(_, err) if err.kind() == io::ErrorKind::PermissionDenied => {
                ErrorKind::PermissionDenied
            }
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::RangeNotSatisfiable { .. } => ErrorKind::ProtocolRangeError,
            Self::Io(..)
            | Self::UnsupportedOperation(_)
            | Self::InvalidInput(_)
            | Self::PreconditionFailed(_) => ErrorKind::Internal,
        }
    }

    /// True when the error only means the path vanished underneath us.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Shared result alias for the core crate.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_kind() {
        let missing = CoreError::io("/x", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(missing.kind(), ErrorKind::NotFound);
        assert!(missing.is_not_found());

        let denied = CoreError::io("/x", io::Error::new(io::ErrorKind::PermissionDenied, "no"));
        assert_eq!(denied.kind(), ErrorKind::PermissionDenied);

        let other = CoreError::io("/x", io::Error::other("boom"));
        assert_eq!(other.kind(), ErrorKind::Internal);
    }

    #[test]
    fn range_error_is_protocol_error() {
        let err = CoreError::RangeNotSatisfiable { total: 10 };
        assert_eq!(err.kind(), ErrorKind::ProtocolRangeError);
        assert_eq!(err.to_string(), "range not satisfiable for length 10");
    }
}
