use std::collections::HashSet;
use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Snapshot, Version};

/// Concurrency expectations for an append.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Version the stream must be at before the append. `None` skips the check.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Expects the stream to have no events yet.
    pub fn expect_new() -> Self {
        Self::expect_version(Version::initial())
    }
}

/// Events for one stream, committed as part of an [`EventStore::append_atomic`].
#[derive(Debug, Clone)]
pub struct AppendBatch {
    pub events: Vec<EventEnvelope>,
    pub options: AppendOptions,
}

impl AppendBatch {
    pub fn new(events: Vec<EventEnvelope>, options: AppendOptions) -> Self {
        Self { events, options }
    }

    /// Stream this batch writes to.
    pub fn aggregate_id(&self) -> Option<AggregateId> {
        self.events.first().map(|e| e.aggregate_id)
    }
}

/// A stream of events in commit order.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Persistence for event streams.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends batches to several streams as one unit.
    ///
    /// Every batch's expected version is checked before anything is written;
    /// if any check fails the store is left untouched and
    /// `ConcurrencyConflict` is returned. Returns the new version of each
    /// stream, in batch order.
    async fn append_atomic(&self, batches: Vec<AppendBatch>) -> Result<Vec<Version>>;

    /// Returns all events of one stream, oldest first.
    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>>;

    /// Returns the events of one stream with `version >= from_version`.
    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>>;

    /// Streams every event in commit order, skipping the first `position`.
    async fn stream_events_from(&self, position: u64) -> Result<EventStream>;

    /// Current version of a stream, or `None` if it has no events.
    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;

    /// Saves a snapshot, replacing any earlier one for the same stream.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>>;
}

/// Convenience methods available on every [`EventStore`].
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Appends events to a single stream.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        let versions = self
            .append_atomic(vec![AppendBatch::new(events, options)])
            .await?;
        versions
            .into_iter()
            .next()
            .ok_or_else(|| EventStoreError::InvalidAppend("append produced no version".into()))
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        self.stream_events_from(0).await
    }

    /// Loads the latest snapshot of a stream (if any) and the events after it.
    async fn load_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<(Option<Snapshot>, Vec<EventEnvelope>)> {
        if let Some(snapshot) = self.get_snapshot(aggregate_id).await? {
            let events = self
                .get_events_for_aggregate_from_version(aggregate_id, snapshot.version.next())
                .await?;
            Ok((Some(snapshot), events))
        } else {
            let events = self.get_events_for_aggregate(aggregate_id).await?;
            Ok((None, events))
        }
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

pub(crate) fn record_commit(streams: usize, events: usize) {
    metrics::counter!("events_appended_total").increment(events as u64);
    tracing::debug!(streams, events, "append committed");
}

/// Checks the shape of an atomic append before any stream is touched.
///
/// Each batch must be non-empty, target a single stream with sequential
/// versions, and no two batches may target the same stream.
pub fn validate_batches(batches: &[AppendBatch]) -> Result<()> {
    if batches.is_empty() {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty set of batches".into(),
        ));
    }

    let mut seen = HashSet::with_capacity(batches.len());
    for batch in batches {
        validate_events_for_append(&batch.events)?;
        if let Some(id) = batch.aggregate_id()
            && !seen.insert(id)
        {
            return Err(EventStoreError::InvalidAppend(format!(
                "aggregate {id} appears in more than one batch"
            )));
        }
    }

    Ok(())
}

fn validate_events_for_append(events: &[EventEnvelope]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty event list".into(),
        ));
    };

    let mut expected_version = first.version;
    for event in events.iter().skip(1) {
        if event.aggregate_id != first.aggregate_id
            || event.aggregate_type != first.aggregate_type
        {
            return Err(EventStoreError::InvalidAppend(
                "all events of a batch must belong to the same aggregate".into(),
            ));
        }
        expected_version = expected_version.next();
        if event.version != expected_version {
            return Err(EventStoreError::InvalidAppend(format!(
                "event versions must be sequential: expected {expected_version}, got {}",
                event.version
            )));
        }
    }

    Ok(())
}
