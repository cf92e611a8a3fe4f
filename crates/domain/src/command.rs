//! Command handling infrastructure.

use std::marker::PhantomData;

use common::AggregateId;
use event_store::{
    AppendBatch, AppendOptions, EventEnvelope, EventStore, EventStoreExt, Snapshot, Version,
};
use serde::de::DeserializeOwned;

use crate::aggregate::{Aggregate, DomainEvent, SnapshotCapable};
use crate::error::DomainError;

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were generated and persisted.
    pub events: Vec<A::Event>,

    /// The new version of the aggregate after the command.
    pub new_version: Version,
}

/// A request to change one aggregate.
pub trait Command: Send + Sync {
    /// The type of aggregate this command targets.
    type Aggregate: Aggregate;

    /// Returns the ID of the aggregate this command targets.
    fn aggregate_id(&self) -> AggregateId;
}

/// Loads aggregates from an event store and persists the events commands
/// produce, with optimistic concurrency on the stream version.
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    _phantom: PhantomData<A>,
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate + DeserializeOwned,
{
    /// Creates a new command handler with the given event store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an aggregate from its latest snapshot plus the events after it.
    ///
    /// A stream with no events yields `A::default()`.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        let (snapshot, events) = self.store.load_aggregate(aggregate_id).await?;

        let mut aggregate = match snapshot {
            Some(snapshot) => restore_from_snapshot(snapshot)?,
            None => A::default(),
        };

        for envelope in events {
            let event: A::Event = serde_json::from_value(envelope.payload)?;
            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }

    /// Loads an aggregate and runs `command_fn` against it.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let aggregate = self.load(aggregate_id).await?;
        self.execute_loaded(aggregate_id, aggregate, command_fn)
            .await
    }

    /// Runs `command_fn` against an aggregate the caller already loaded and
    /// appends the resulting events.
    ///
    /// The append expects the stream to still be at `aggregate.version()`; if
    /// another writer got there first the store rejects it with a
    /// concurrency conflict and nothing is written.
    pub async fn execute_loaded<F>(
        &self,
        aggregate_id: AggregateId,
        mut aggregate: A,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let current_version = aggregate.version();
        let events = command_fn(&aggregate)?;

        if events.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events: vec![],
                new_version: current_version,
            });
        }

        let batch = build_batch::<A>(aggregate_id, current_version, &events)?;
        let new_version = self.store.append(batch.events, batch.options).await?;

        aggregate.apply_events(events.iter().cloned());
        aggregate.set_version(new_version);

        Ok(CommandResult {
            aggregate,
            events,
            new_version,
        })
    }
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: SnapshotCapable,
{
    /// Saves a snapshot if the aggregate crossed a snapshot boundary since
    /// `previous`.
    pub async fn snapshot_if_due(
        &self,
        aggregate_id: AggregateId,
        aggregate: &A,
        previous: Version,
    ) -> Result<(), DomainError> {
        if !aggregate.should_snapshot(previous) {
            return Ok(());
        }

        let snapshot = Snapshot::from_state(
            aggregate_id,
            A::aggregate_type(),
            aggregate.version(),
            aggregate,
        )?;
        self.store.save_snapshot(snapshot).await?;
        tracing::debug!(%aggregate_id, version = %aggregate.version(), "snapshot saved");
        Ok(())
    }

    /// Runs a command against an already loaded aggregate and snapshots it
    /// when due.
    ///
    /// The events are committed before the snapshot is written, so a failed
    /// snapshot save is logged and the command still succeeds.
    pub async fn execute_loaded_with_snapshot<F>(
        &self,
        aggregate_id: AggregateId,
        aggregate: A,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let previous = aggregate.version();
        let result = self
            .execute_loaded(aggregate_id, aggregate, command_fn)
            .await?;
        if let Err(error) = self
            .snapshot_if_due(aggregate_id, &result.aggregate, previous)
            .await
        {
            metrics::counter!("snapshot_failures_total", "aggregate" => A::aggregate_type())
                .increment(1);
            tracing::warn!(%aggregate_id, %error, "snapshot save failed");
        }
        Ok(result)
    }
}

/// Wraps domain events in envelopes numbered after `current_version`, with
/// the append expecting the stream to still be at `current_version`.
pub fn build_batch<A: Aggregate>(
    aggregate_id: AggregateId,
    current_version: Version,
    events: &[A::Event],
) -> Result<AppendBatch, DomainError> {
    let mut envelopes = Vec::with_capacity(events.len());
    let mut version = current_version;

    for event in events {
        version = version.next();
        let envelope = EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type(A::aggregate_type())
            .event_type(event.event_type())
            .version(version)
            .payload(event)?
            .build()?;
        envelopes.push(envelope);
    }

    Ok(AppendBatch::new(
        envelopes,
        AppendOptions::expect_version(current_version),
    ))
}

fn restore_from_snapshot<A>(snapshot: Snapshot) -> Result<A, DomainError>
where
    A: Aggregate + DeserializeOwned,
{
    let mut aggregate: A = serde_json::from_value(snapshot.state)?;
    aggregate.set_version(snapshot.version);
    Ok(aggregate)
}
