//! Domain error types.

use event_store::EventStoreError;
use serde::Serialize;
use thiserror::Error;

use crate::cart::CartError;
use crate::catalog::CatalogError;
use crate::order::OrderError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// A cart command was rejected.
    #[error("{0}")]
    Cart(#[from] CartError),

    /// An order command was rejected.
    #[error("{0}")]
    Order(#[from] OrderError),

    /// The catalog could not answer.
    #[error("{0}")]
    Catalog(#[from] CatalogError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification of a failure, as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Validation,
    EmptyCart,
    /// Lost an optimistic concurrency race; safe to retry.
    Conflict,
    /// A dependency timed out or is down; safe to retry.
    Transient,
    Internal,
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::EventStore(EventStoreError::ConcurrencyConflict { .. }) => {
                ErrorKind::Conflict
            }
            DomainError::EventStore(e) if e.is_transient() => ErrorKind::Transient,
            DomainError::EventStore(_) | DomainError::Serialization(_) => ErrorKind::Internal,
            DomainError::Cart(e) => e.kind(),
            DomainError::Order(e) => e.kind(),
            DomainError::Catalog(e) => e.kind(),
        }
    }
}
