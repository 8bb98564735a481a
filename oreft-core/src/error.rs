//! Error classification shared across services.
//!
//! Each service exposes its own `thiserror` enum; this module defines the
//! coarse classification an outer transport layer maps onto status codes.

/// Coarse classification of a service error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The addressed entity does not exist.
    NotFound,
    /// The request conflicts with existing state (duplicate, in-flight
    /// payout, concurrent modification that exhausted retries).
    Conflict,
    /// The request itself is malformed or out of range.
    InvalidArgument,
    /// The entity exists but is not in a state that permits the operation.
    PreconditionFailed,
    /// The payment gateway rejected, timed out, or was unreachable.
    Gateway,
    /// The caller's credentials are missing or invalid.
    Unauthorized,
    /// Storage or other internal failure.
    Internal,
}

/// Implemented by every service error enum.
pub trait ClassifiedError {
    fn kind(&self) -> ErrorKind;
}
