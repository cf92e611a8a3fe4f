//! Placed orders, grouped by the user who placed them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use domain::{Aggregate, Money, Order, OrderEvent, OrderLine};
use event_store::EventEnvelope;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;

/// An order as shown in a user's order list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSummary {
    pub order_id: AggregateId,
    pub user_id: UserId,
    pub lines: Vec<OrderLine>,
    pub total_amount: Money,
    pub placed_at: DateTime<Utc>,
}

struct UserOrdersState {
    /// Orders per user in commit order.
    by_user: HashMap<UserId, Vec<OrderSummary>>,
    order_count: usize,
    position: ProjectionPosition,
}

/// Read model listing each user's orders.
#[derive(Clone)]
pub struct UserOrdersView {
    state: Arc<RwLock<UserOrdersState>>,
}

impl UserOrdersView {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(UserOrdersState {
                by_user: HashMap::new(),
                order_count: 0,
                position: ProjectionPosition::zero(),
            })),
        }
    }

    /// Returns the user's orders, newest first.
    pub async fn orders_for(&self, user_id: UserId) -> Vec<OrderSummary> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .by_user
            .get(&user_id)
            .map(|orders| orders.iter().rev().cloned().collect())
            .unwrap_or_default();
        // Stable, so orders placed in the same instant keep reverse commit order.
        orders.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));
        orders
    }
}

impl Default for UserOrdersView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for UserOrdersView {
    fn name(&self) -> &'static str {
        "UserOrdersView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        if event.aggregate_type != Order::aggregate_type() {
            let mut state = self.state.write().await;
            state.position = state.position.advance();
            return Ok(());
        }

        let order_event = match serde_json::from_value::<OrderEvent>(event.payload.clone()) {
            Ok(order_event) => order_event,
            Err(error) => {
                metrics::counter!("projections_events_skipped", "projection" => "UserOrdersView")
                    .increment(1);
                tracing::warn!(
                    event_id = %event.event_id,
                    aggregate_id = %event.aggregate_id,
                    event_type = %event.event_type,
                    %error,
                    "skipping undecodable order event"
                );
                let mut state = self.state.write().await;
                state.position = state.position.advance();
                return Ok(());
            }
        };
        let mut state = self.state.write().await;

        match order_event {
            OrderEvent::OrderPlaced(data) => {
                state
                    .by_user
                    .entry(data.user_id)
                    .or_default()
                    .push(OrderSummary {
                        order_id: data.order_id,
                        user_id: data.user_id,
                        lines: data.lines,
                        total_amount: data.total_amount,
                        placed_at: data.placed_at,
                    });
                state.order_count += 1;
            }
        }

        state.position = state.position.advance();
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }
}

impl ReadModel for UserOrdersView {
    fn name(&self) -> &'static str {
        "UserOrdersView"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.order_count).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use domain::{CartEvent, DomainEvent, OrderPlacedData};
    use event_store::Version;

    fn envelope<E: DomainEvent>(
        aggregate_id: AggregateId,
        aggregate_type: &str,
        event: &E,
    ) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type(aggregate_type)
            .event_type(event.event_type())
            .version(Version::first())
            .payload(event)
            .unwrap()
            .build()
            .unwrap()
    }

    fn placed(user_id: UserId, cents: i64, placed_at: DateTime<Utc>) -> (AggregateId, OrderEvent) {
        let order_id = AggregateId::new();
        let line = OrderLine {
            product_id: "SKU-1".into(),
            title: "Mug".to_string(),
            unit_price: Money::from_cents(cents),
            quantity: 1,
        };
        let event = OrderEvent::OrderPlaced(OrderPlacedData {
            order_id,
            user_id,
            lines: vec![line],
            total_amount: Money::from_cents(cents),
            placed_at,
        });
        (order_id, event)
    }

    #[tokio::test]
    async fn records_placed_orders_per_user() {
        let view = UserOrdersView::new();
        let alice = UserId::new();
        let bob = UserId::new();
        let now = Utc::now();

        for (user, cents) in [(alice, 100), (bob, 200), (alice, 300)] {
            let (order_id, event) = placed(user, cents, now);
            view.handle(&envelope(order_id, "Order", &event)).await.unwrap();
        }

        assert_eq!(view.orders_for(alice).await.len(), 2);
        assert_eq!(view.orders_for(bob).await.len(), 1);
        assert!(view.orders_for(UserId::new()).await.is_empty());
        assert_eq!(ReadModel::count(&view), 3);
        assert_eq!(view.position().await.events_processed, 3);
    }

    #[tokio::test]
    async fn lists_newest_first() {
        let view = UserOrdersView::new();
        let user = UserId::new();
        let now = Utc::now();

        let (older_id, older) = placed(user, 100, now - Duration::minutes(5));
        let (newer_id, newer) = placed(user, 200, now);
        // Delivered out of time order.
        view.handle(&envelope(newer_id, "Order", &newer)).await.unwrap();
        view.handle(&envelope(older_id, "Order", &older)).await.unwrap();

        let orders = view.orders_for(user).await;
        assert_eq!(orders[0].order_id, newer_id);
        assert_eq!(orders[1].order_id, older_id);
    }

    #[tokio::test]
    async fn same_instant_orders_list_latest_commit_first() {
        let view = UserOrdersView::new();
        let user = UserId::new();
        let now = Utc::now();

        let (first_id, first) = placed(user, 100, now);
        let (second_id, second) = placed(user, 200, now);
        view.handle(&envelope(first_id, "Order", &first)).await.unwrap();
        view.handle(&envelope(second_id, "Order", &second)).await.unwrap();

        let ids: Vec<_> = view.orders_for(user).await.iter().map(|o| o.order_id).collect();
        assert_eq!(ids, vec![second_id, first_id]);
    }

    #[tokio::test]
    async fn cart_events_only_advance_position() {
        let view = UserOrdersView::new();
        let user = UserId::new();
        let cart_id = AggregateId::cart_of(user);

        let event = CartEvent::cart_cleared();
        view.handle(&envelope(cart_id, "Cart", &event)).await.unwrap();

        assert!(view.orders_for(user).await.is_empty());
        assert_eq!(view.position().await.events_processed, 1);
    }

    #[tokio::test]
    async fn undecodable_order_event_is_skipped() {
        let view = UserOrdersView::new();
        let user = UserId::new();

        let broken = EventEnvelope::builder()
            .aggregate_id(AggregateId::new())
            .aggregate_type("Order")
            .event_type("OrderPlaced")
            .version(Version::first())
            .payload_raw(serde_json::json!({"type": "OrderPlaced", "data": {"total": "?"}}))
            .build()
            .unwrap();
        view.handle(&broken).await.unwrap();

        let (order_id, event) = placed(user, 450, Utc::now());
        view.handle(&envelope(order_id, "Order", &event)).await.unwrap();

        let orders = view.orders_for(user).await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].total_amount, Money::from_cents(450));
        assert_eq!(view.position().await.events_processed, 2);
    }
}
