//! Core projection trait and position tracking.

use std::fmt;

use async_trait::async_trait;
use event_store::EventEnvelope;

use crate::Result;

/// Number of store events, in commit order, a projection has consumed.
///
/// Because every projection sees every event, this doubles as the offset to
/// resume streaming from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProjectionPosition {
    pub events_processed: u64,
}

impl ProjectionPosition {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn advance(self) -> Self {
        Self {
            events_processed: self.events_processed + 1,
        }
    }
}

impl fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "position({})", self.events_processed)
    }
}

/// A projection that processes events and updates a read model.
///
/// Every event in the store is delivered in commit order, including events of
/// aggregates the projection ignores, so that the position always equals the
/// number of store events seen.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    /// Applies one event and advances the position by one.
    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    async fn position(&self) -> ProjectionPosition;
}
