//! The booking side of the saga: records, collaborators and the orchestrator.

pub mod gateway;
pub mod orchestrator;
pub mod pricing;
pub mod store;

use crate::entities::BookingStatus;
use crate::framework::StoreError;
use gateway::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requested dates are taken.
    #[error("dates are not available")]
    Conflict,

    #[error("lock token is invalid or expired")]
    InvalidOrExpiredLock,

    #[error("not allowed: {0}")]
    Unauthorized(String),

    #[error("booking {booking_id} is {status:?}, operation not allowed")]
    InvalidState {
        booking_id: i64,
        status: BookingStatus,
    },

    #[error("booking {0} not found")]
    NotFound(i64),

    #[error("transaction {0} is already used by another booking")]
    DuplicateTransaction(String),

    /// A collaborator (property service, user service, event bus) failed.
    #[error("service integration failed: {0}")]
    ServiceIntegration(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BookingError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BookingError::Store(_) | BookingError::ServiceIntegration(_)
        )
    }
}

impl From<GatewayError> for BookingError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unavailable => BookingError::Conflict,
            GatewayError::InvalidOrExpiredLock => BookingError::InvalidOrExpiredLock,
            GatewayError::NotFound(what) => BookingError::Validation(what),
            GatewayError::Rejected(reason) => BookingError::Validation(reason),
            GatewayError::Transport(reason) => BookingError::ServiceIntegration(reason),
        }
    }
}
