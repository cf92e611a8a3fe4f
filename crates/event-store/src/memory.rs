use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, Result, Snapshot, Version,
    store::{AppendBatch, EventStore, EventStream, record_commit, validate_batches},
};

#[derive(Default)]
struct MemoryState {
    /// All events in commit order.
    events: Vec<EventEnvelope>,
    /// Indexes into `events` per stream, in version order.
    streams: HashMap<AggregateId, Vec<usize>>,
    snapshots: HashMap<AggregateId, Snapshot>,
}

impl MemoryState {
    fn version_of(&self, aggregate_id: AggregateId) -> Version {
        self.streams
            .get(&aggregate_id)
            .and_then(|idx| idx.last())
            .and_then(|&i| self.events.get(i))
            .map(|e| e.version)
            .unwrap_or_default()
    }

    fn stream(&self, aggregate_id: AggregateId) -> impl Iterator<Item = &EventEnvelope> {
        self.streams
            .get(&aggregate_id)
            .into_iter()
            .flatten()
            .filter_map(|&i| self.events.get(i))
    }
}

/// In-process event store.
///
/// Used by tests and by the server when no database is configured. Each
/// append holds the write lock for its whole check-then-write sequence and
/// never yields in between, so a dropped request future cannot leave a
/// half-written batch behind.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.events.len()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_atomic(&self, batches: Vec<AppendBatch>) -> Result<Vec<Version>> {
        validate_batches(&batches)?;
        let event_count: usize = batches.iter().map(|b| b.events.len()).sum();

        let mut state = self.state.write().await;

        // Check every stream before writing any of them.
        for batch in &batches {
            let Some(first) = batch.events.first() else {
                continue;
            };
            let aggregate_id = first.aggregate_id;
            let current = state.version_of(aggregate_id);

            if let Some(expected) = batch.options.expected_version
                && current != expected
            {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id,
                    expected,
                    actual: current,
                });
            }

            if first.version != current.next() {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id,
                    expected: batch.options.expected_version.unwrap_or(current),
                    actual: current,
                });
            }
        }

        let mut versions = Vec::with_capacity(batches.len());
        for batch in batches {
            let mut last = Version::initial();
            for event in batch.events {
                last = event.version;
                let index = state.events.len();
                state
                    .streams
                    .entry(event.aggregate_id)
                    .or_default()
                    .push(index);
                state.events.push(event);
            }
            versions.push(last);
        }
        drop(state);

        record_commit(versions.len(), event_count);
        Ok(versions)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let state = self.state.read().await;
        Ok(state.stream(aggregate_id).cloned().collect())
    }

    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let state = self.state.read().await;
        Ok(state
            .stream(aggregate_id)
            .filter(|e| e.version >= from_version)
            .cloned()
            .collect())
    }

    async fn stream_events_from(&self, position: u64) -> Result<EventStream> {
        use futures_util::stream;

        let skip = usize::try_from(position).unwrap_or(usize::MAX);
        let events: Vec<_> = self
            .state
            .read()
            .await
            .events
            .iter()
            .skip(skip)
            .cloned()
            .collect();

        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let state = self.state.read().await;
        let version = state.version_of(aggregate_id);
        Ok((version != Version::initial()).then_some(version))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        self.state
            .write()
            .await
            .snapshots
            .insert(snapshot.aggregate_id, snapshot);
        Ok(())
    }

    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>> {
        Ok(self.state.read().await.snapshots.get(&aggregate_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AppendOptions, EventStoreExt};

    fn event(aggregate_id: AggregateId, aggregate_type: &str, version: i64) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type(aggregate_type)
            .event_type("TestEvent")
            .version(Version::new(version))
            .payload_raw(serde_json::json!({"test": true}))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn append_and_read_back() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        let version = store
            .append(
                vec![event(id, "Cart", 1), event(id, "Cart", 2)],
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();

        assert_eq!(version, Version::new(2));
        let events = store.get_events_for_aggregate(id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            store.get_aggregate_version(id).await.unwrap(),
            Some(Version::new(2))
        );
    }

    #[tokio::test]
    async fn stale_expected_version_conflicts() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(vec![event(id, "Cart", 1)], AppendOptions::expect_new())
            .await
            .unwrap();

        let result = store
            .append(vec![event(id, "Cart", 2)], AppendOptions::expect_new())
            .await;

        assert!(matches!(
            result,
            Err(EventStoreError::ConcurrencyConflict { .. })
        ));
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn atomic_append_writes_every_stream() {
        let store = InMemoryEventStore::new();
        let cart = AggregateId::new();
        let order = AggregateId::new();
        store
            .append(vec![event(cart, "Cart", 1)], AppendOptions::expect_new())
            .await
            .unwrap();

        let versions = store
            .append_atomic(vec![
                AppendBatch::new(
                    vec![event(cart, "Cart", 2)],
                    AppendOptions::expect_version(Version::first()),
                ),
                AppendBatch::new(vec![event(order, "Order", 1)], AppendOptions::expect_new()),
            ])
            .await
            .unwrap();

        assert_eq!(versions, vec![Version::new(2), Version::first()]);
        assert_eq!(store.event_count().await, 3);
    }

    #[tokio::test]
    async fn atomic_append_writes_nothing_when_any_stream_conflicts() {
        let store = InMemoryEventStore::new();
        let cart = AggregateId::new();
        let order = AggregateId::new();
        store
            .append(
                vec![event(cart, "Cart", 1), event(cart, "Cart", 2)],
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();

        // The order batch is valid but the cart batch is stale.
        let result = store
            .append_atomic(vec![
                AppendBatch::new(vec![event(order, "Order", 1)], AppendOptions::expect_new()),
                AppendBatch::new(
                    vec![event(cart, "Cart", 2)],
                    AppendOptions::expect_version(Version::first()),
                ),
            ])
            .await;

        assert!(matches!(
            result,
            Err(EventStoreError::ConcurrencyConflict { .. })
        ));
        assert!(
            store
                .get_events_for_aggregate(order)
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(store.event_count().await, 2);
    }

    #[tokio::test]
    async fn events_from_version_skips_older_events() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(
                (1..=3).map(|v| event(id, "Cart", v)).collect(),
                AppendOptions::new(),
            )
            .await
            .unwrap();

        let tail = store
            .get_events_for_aggregate_from_version(id, Version::new(2))
            .await
            .unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].version, Version::new(2));
    }

    #[tokio::test]
    async fn stream_from_position_follows_commit_order() {
        use futures_util::StreamExt;

        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();
        store
            .append(vec![event(a, "Cart", 1)], AppendOptions::new())
            .await
            .unwrap();
        store
            .append(vec![event(b, "Order", 1)], AppendOptions::new())
            .await
            .unwrap();
        store
            .append(vec![event(a, "Cart", 2)], AppendOptions::new())
            .await
            .unwrap();

        let all: Vec<_> = store.stream_all_events().await.unwrap().collect().await;
        assert_eq!(all.len(), 3);

        let tail: Vec<_> = store.stream_events_from(1).await.unwrap().collect().await;
        let tail: Vec<_> = tail.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].aggregate_id, b);
        assert_eq!(tail[1].aggregate_id, a);
    }

    #[tokio::test]
    async fn snapshot_replaces_previous() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        for version in [5, 10] {
            let snapshot = Snapshot::from_state(
                id,
                "Cart",
                Version::new(version),
                &serde_json::json!({ "v": version }),
            )
            .unwrap();
            store.save_snapshot(snapshot).await.unwrap();
        }

        let snapshot = store.get_snapshot(id).await.unwrap().unwrap();
        assert_eq!(snapshot.version, Version::new(10));
        assert!(store.get_snapshot(AggregateId::new()).await.unwrap().is_none());
    }
}
