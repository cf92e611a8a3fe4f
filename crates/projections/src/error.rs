//! Projection error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectionError {
    /// Reading the commit log failed.
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),
}

pub type Result<T> = std::result::Result<T, ProjectionError>;
