pub mod models;
pub mod notify;
pub mod payment;
pub mod repository;

pub use models::{
    Booking, BookingStatus, FareBreakdown, Feedback, Stop, Trip, TripStatus, User,
};
pub use payment::{PaymentMethod, SettlementRecord, SettlementStatus, WalletDebit};
pub use repository::{BookingStore, StoreError, StoreResult, StoreTx};

/// Failure taxonomy of the reservation core.
///
/// Every variant aborts the enclosing transaction; callers map the kind onto
/// their own status codes.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(msg) => CoreError::Conflict(msg),
            other => CoreError::InternalError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_core_taxonomy() {
        let err: CoreError = StoreError::LockTimeout("trip row".into()).into();
        assert!(matches!(err, CoreError::InternalError(_)));

        let err: CoreError = StoreError::UniqueViolation("duplicate key".into()).into();
        assert_eq!(err, CoreError::Conflict("duplicate key".into()));
    }
}
