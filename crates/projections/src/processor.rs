//! Projection processor for feeding events to projections.

use event_store::EventStore;
use futures_util::StreamExt;
use tokio::sync::Mutex;

use crate::Result;
use crate::projection::Projection;

/// Delivers events from an event store to registered projections.
///
/// Catch-up resumes from the lowest position among the projections, so each
/// call only reads events committed since the slowest projection last ran.
/// Concurrent catch-ups are serialized; an event is never handled twice by
/// the same projection.
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Box<dyn Projection>>,
    running: Mutex<()>,
}

impl<S: EventStore> ProjectionProcessor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
            running: Mutex::new(()),
        }
    }

    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Brings every projection up to the end of the store.
    ///
    /// Returns the number of store events read.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<u64> {
        let _running = self.running.lock().await;

        let mut start: Option<u64> = None;
        for projection in &self.projections {
            let processed = projection.position().await.events_processed;
            start = Some(start.map_or(processed, |s| s.min(processed)));
        }
        let Some(start) = start else {
            return Ok(0);
        };

        let mut stream = self.store.stream_events_from(start).await?;
        let mut event_index = start;

        while let Some(result) = stream.next().await {
            let event = result?;
            event_index += 1;

            for projection in &self.projections {
                let pos = projection.position().await;
                if pos.events_processed < event_index {
                    projection.handle(&event).await?;
                    let name = projection.name();
                    metrics::counter!("projections_events_processed", "projection" => name)
                        .increment(1);
                }
            }
        }

        let read = event_index - start;
        if read > 0 {
            tracing::debug!(from = start, events_read = read, "catch-up complete");
        }

        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::ProjectionPosition;
    use async_trait::async_trait;
    use common::AggregateId;
    use event_store::{AppendOptions, EventEnvelope, EventStoreExt, InMemoryEventStore, Version};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    /// Counts every event it is handed.
    struct CountingProjection {
        count: Arc<RwLock<u64>>,
        position: Arc<RwLock<ProjectionPosition>>,
    }

    impl CountingProjection {
        fn new() -> Self {
            Self::starting_at(0)
        }

        fn starting_at(events_processed: u64) -> Self {
            Self {
                count: Arc::new(RwLock::new(0)),
                position: Arc::new(RwLock::new(ProjectionPosition { events_processed })),
            }
        }
    }

    #[async_trait]
    impl Projection for CountingProjection {
        fn name(&self) -> &'static str {
            "CountingProjection"
        }

        async fn handle(&self, _event: &EventEnvelope) -> Result<()> {
            *self.count.write().await += 1;
            let mut pos = self.position.write().await;
            *pos = pos.advance();
            Ok(())
        }

        async fn position(&self) -> ProjectionPosition {
            *self.position.read().await
        }
    }

    fn test_event(aggregate_id: AggregateId, version: i64) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("Cart")
            .event_type("TestEvent")
            .version(Version::new(version))
            .payload_raw(serde_json::json!({"test": true}))
            .build()
            .unwrap()
    }

    async fn store_with(count: i64) -> InMemoryEventStore {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        if count > 0 {
            let events = (1..=count).map(|v| test_event(id, v)).collect();
            store.append(events, AppendOptions::new()).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn catch_up_processes_all_events() {
        let projection = CountingProjection::new();
        let count = Arc::clone(&projection.count);

        let mut processor = ProjectionProcessor::new(store_with(3).await);
        processor.register(Box::new(projection));

        assert_eq!(processor.run_catch_up().await.unwrap(), 3);
        assert_eq!(*count.read().await, 3);
    }

    #[tokio::test]
    async fn catch_up_only_reads_new_events() {
        let store = store_with(3).await;
        let projection = CountingProjection::new();
        let count = Arc::clone(&projection.count);

        let mut processor = ProjectionProcessor::new(store.clone());
        processor.register(Box::new(projection));
        processor.run_catch_up().await.unwrap();

        store
            .append(vec![test_event(AggregateId::new(), 1)], AppendOptions::new())
            .await
            .unwrap();

        assert_eq!(processor.run_catch_up().await.unwrap(), 1);
        assert_eq!(*count.read().await, 4);
        assert_eq!(processor.run_catch_up().await.unwrap(), 0);
        assert_eq!(*count.read().await, 4);
    }

    #[tokio::test]
    async fn empty_store_catch_up() {
        let projection = CountingProjection::new();
        let count = Arc::clone(&projection.count);

        let mut processor = ProjectionProcessor::new(InMemoryEventStore::new());
        processor.register(Box::new(projection));

        assert_eq!(processor.run_catch_up().await.unwrap(), 0);
        assert_eq!(*count.read().await, 0);
    }

    #[tokio::test]
    async fn no_projections_reads_nothing() {
        let processor = ProjectionProcessor::new(store_with(2).await);
        assert_eq!(processor.projection_count(), 0);
        assert_eq!(processor.run_catch_up().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn lagging_projection_catches_up_without_replaying_others() {
        let ahead = CountingProjection::starting_at(2);
        let behind = CountingProjection::new();
        let ahead_count = Arc::clone(&ahead.count);
        let behind_count = Arc::clone(&behind.count);

        let mut processor = ProjectionProcessor::new(store_with(3).await);
        processor.register(Box::new(ahead));
        processor.register(Box::new(behind));

        assert_eq!(processor.run_catch_up().await.unwrap(), 3);
        assert_eq!(*ahead_count.read().await, 1);
        assert_eq!(*behind_count.read().await, 3);
    }

    #[tokio::test]
    async fn concurrent_catch_ups_handle_each_event_once() {
        let projection = CountingProjection::new();
        let count = Arc::clone(&projection.count);

        let mut processor = ProjectionProcessor::new(store_with(10).await);
        processor.register(Box::new(projection));
        let processor = Arc::new(processor);

        let runs: Vec<_> = (0..4)
            .map(|_| {
                let processor = Arc::clone(&processor);
                tokio::spawn(async move { processor.run_catch_up().await })
            })
            .collect();
        for run in runs {
            run.await.unwrap().unwrap();
        }

        assert_eq!(*count.read().await, 10);
    }
}
