use thiserror::Error;

use super::BatchStatus;

/// Errors from allocator, lifecycle and registry operations.
///
/// Every variant is returned before anything is committed: a failed operation
/// leaves batches, parcels and vehicles exactly as they were.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Bad input (negative volume, blank name, missing vehicle...).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The request clashes with existing records (duplicate name, vehicle
    /// bound to another batch, no free batch name).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The batch is not in a status that allows the operation.
    #[error("Cannot {operation} batch {batch_id}: current status is {status}")]
    InvalidState {
        batch_id: i64,
        status: BatchStatus,
        operation: &'static str,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The caller's role or driver assignment does not allow the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl DispatchError {
    pub fn batch_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "Batch",
            id: id.to_string(),
        }
    }

    pub fn parcel_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "Parcel",
            id: id.to_string(),
        }
    }

    pub fn vehicle_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "Vehicle",
            id: id.to_string(),
        }
    }
}

impl From<rusqlite::Error> for DispatchError {
    fn from(e: rusqlite::Error) -> Self {
        if e.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) {
            DispatchError::Conflict(e.to_string())
        } else {
            DispatchError::Database(e.to_string())
        }
    }
}
