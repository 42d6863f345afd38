//! Error types surfaced by the synchronization API.

use std::fmt;

use strata_scene::PrimId;

use crate::backend::BackendError;

/// Errors returned to the orchestration layer.
///
/// Data problems inside a primitive never show up here; they are logged and
/// degraded in place.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    /// A representation was requested before it was configured.
    NotConfigured {
        /// The representation name.
        repr: String,
    },

    /// No primitive with this id has been inserted.
    UnknownPrim {
        /// The primitive id.
        id: PrimId,
    },

    /// The primitive exists but is not of the requested kind.
    WrongPrimType {
        /// The primitive id.
        id: PrimId,
        /// The kind the caller asked for.
        expected: &'static str,
    },

    /// The geometry backend refused an operation the engine itself needs.
    Backend(BackendError),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::NotConfigured { repr } => {
                write!(f, "Representation '{}' has not been configured", repr)
            }
            SyncError::UnknownPrim { id } => write!(f, "Unknown prim: {}", id),
            SyncError::WrongPrimType { id, expected } => {
                write!(f, "Prim {} is not a {}", id, expected)
            }
            SyncError::Backend(err) => write!(f, "Backend error: {}", err),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Backend(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BackendError> for SyncError {
    fn from(err: BackendError) -> Self {
        SyncError::Backend(err)
    }
}

/// Result type for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;
