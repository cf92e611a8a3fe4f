//! Append-only event storage.
//!
//! Every cart and every order is a stream of events keyed by [`AggregateId`].
//! Appends use optimistic concurrency on the stream version, and
//! [`EventStore::append_atomic`] commits several streams in one unit so a
//! checkout can create an order and close a cart together.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod snapshot;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use snapshot::Snapshot;
pub use store::{AppendBatch, AppendOptions, EventStore, EventStoreExt, EventStream};
