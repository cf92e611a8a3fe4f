//! Core aggregate and domain event traits.

use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name.
    ///
    /// This is used for serialization and event store filtering.
    fn event_type(&self) -> &'static str;
}

/// Trait for aggregates in an event-sourced system.
///
/// Aggregates are rebuilt by replaying their stream. Command methods inspect
/// the current state and return new events; `apply` folds an event into the
/// state and never fails.
pub trait Aggregate: Default + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors this aggregate can produce.
    type Error: std::error::Error + Send + Sync;

    /// Returns the aggregate type name.
    ///
    /// Used for event store organization and routing.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's unique identifier.
    ///
    /// Returns None while the aggregate does not exist, either because it
    /// was never created or because an event ended its life.
    fn id(&self) -> Option<AggregateId>;

    /// Returns the current version of the aggregate.
    ///
    /// Version starts at 0 for a new aggregate and increments with each event.
    fn version(&self) -> Version;

    /// Sets the aggregate version.
    ///
    /// Called by the command handler after loading events.
    fn set_version(&mut self, version: Version);

    /// Applies an event to the aggregate, updating its state.
    ///
    /// This method must be pure and deterministic:
    /// - Given the same state and event, it must always produce the same new state
    /// - It must not have side effects
    /// - It must not fail (events represent facts that have happened)
    fn apply(&mut self, event: Self::Event);

    /// Applies multiple events in sequence.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}

/// Trait for aggregates that support snapshotting.
///
/// A snapshot is taken whenever a command moves the aggregate across a
/// multiple of [`SnapshotCapable::snapshot_interval`]. Commands append several
/// events at once, so the version can skip over the exact multiple.
pub trait SnapshotCapable: Aggregate + Serialize + DeserializeOwned {
    /// Returns the snapshot interval (number of events between snapshots).
    fn snapshot_interval() -> usize {
        100
    }

    /// Returns whether a snapshot is due after moving from `previous` to the
    /// current version.
    fn should_snapshot(&self, previous: Version) -> bool {
        let interval = Self::snapshot_interval().max(1) as i64;
        let current = self.version().as_i64();
        current > previous.as_i64() && current / interval > previous.as_i64() / interval
    }
}
