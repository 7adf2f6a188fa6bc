use draftsync_common::path::normalize::PathError;
use thiserror::Error;

use super::codec::OffsetOutOfRange;
use crate::fs::FsError;
use crate::store::backing::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Conflict,
    Storage,
    OutOfRange,
    Unknown,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Forbidden => "FORBIDDEN",
            Self::Conflict => "CONFLICT",
            Self::Storage => "STORAGE",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Status reported to endpoints: only a missing file is the client's fault.
    pub const fn status_code(self) -> u16 {
        match self {
            Self::NotFound => 400,
            _ => 500,
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkingCopyError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Storage(StorageError),

    #[error(transparent)]
    OutOfRange(#[from] OffsetOutOfRange),

    #[error("{0}")]
    Unknown(String),
}

impl WorkingCopyError {
    pub fn not_found(path: &str) -> Self {
        Self::NotFound(format!("Item '{path}' isn't found"))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Storage(_) => ErrorKind::Storage,
            Self::OutOfRange(_) => ErrorKind::OutOfRange,
            Self::Unknown(_) => ErrorKind::Unknown,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }
}

impl From<FsError> for WorkingCopyError {
    fn from(error: FsError) -> Self {
        match error {
            FsError::NotFound(_) => Self::NotFound(error.to_string()),
            FsError::WrongKind(..) | FsError::InvalidPath { .. } => {
                Self::Forbidden(error.to_string())
            }
            FsError::Conflict(_) => Self::Conflict(error.to_string()),
            FsError::Io { .. } => Self::Storage(StorageError::Fs(error)),
        }
    }
}

impl From<StorageError> for WorkingCopyError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Fs(fs) => fs.into(),
            other => Self::Storage(other),
        }
    }
}

impl From<PathError> for WorkingCopyError {
    fn from(error: PathError) -> Self {
        Self::Forbidden(format!("invalid path: {error}"))
    }
}
