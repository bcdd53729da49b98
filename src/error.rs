use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::base::staff::Role;

/// All errors produced by the case and backup services.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input or a missing required field.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },

    /// The caller's base version no longer matches the stored record.
    #[error("case `{id}` was modified concurrently: expected version {expected}, found {found}")]
    Conflict { id: Uuid, expected: u64, found: u64 },

    /// A unique key (registration code, national id) is already taken.
    #[error("duplicate {field}: `{value}`")]
    Duplicate { field: &'static str, value: String },

    #[error("missing or invalid actor identity")]
    Unauthorized,

    #[error("role `{0}` may not perform this operation")]
    Forbidden(Role),

    /// A blob upload failed or the blob store was unreachable. Aborts the write.
    #[error("upload failed: {0}")]
    Upload(String),

    #[error("snapshot is malformed: {0}")]
    MalformedSnapshot(String),

    #[error("snapshot version `{found}` is not supported (expected `{supported}`)")]
    UnsupportedSnapshotVersion { found: String, supported: &'static str },

    #[error("nothing to export: the store holds no records")]
    EmptyStore,

    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Machine-readable error classification. Drives the status code and the
/// localized message; the error's `Display` is for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Duplicate,
    Unauthorized,
    Forbidden,
    Upload,
    MalformedSnapshot,
    UnsupportedSnapshotVersion,
    EmptyStore,
    StoreUnavailable,
    Internal,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Duplicate => "duplicate",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Upload => "upload_error",
            ErrorKind::MalformedSnapshot => "malformed_snapshot",
            ErrorKind::UnsupportedSnapshotVersion => "unsupported_snapshot_version",
            ErrorKind::EmptyStore => "empty_store",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::Internal => "internal_error",
        }
    }

    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::Validation
            | ErrorKind::MalformedSnapshot
            | ErrorKind::UnsupportedSnapshotVersion => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound | ErrorKind::EmptyStore => StatusCode::NOT_FOUND,
            ErrorKind::Conflict | ErrorKind::Duplicate => StatusCode::CONFLICT,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Upload | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn case_not_found(id: Uuid) -> Self {
        Error::NotFound {
            entity: "case",
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Conflict { .. } => ErrorKind::Conflict,
            Error::Duplicate { .. } => ErrorKind::Duplicate,
            Error::Unauthorized => ErrorKind::Unauthorized,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::Upload(_) => ErrorKind::Upload,
            Error::MalformedSnapshot(_) => ErrorKind::MalformedSnapshot,
            Error::UnsupportedSnapshotVersion { .. } => ErrorKind::UnsupportedSnapshotVersion,
            Error::EmptyStore => ErrorKind::EmptyStore,
            Error::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Error::StoreUnavailable(e.to_string())
            }
            other => Error::Internal(other.into()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Internal(e.into())
    }
}

#[macro_export]
macro_rules! validation_bail {
    ( $fmt:literal $(, $($arg:tt)*)?) => {
        return Err($crate::error::Error::Validation(format!($fmt $(, $($arg)*)?)))
    };
}
