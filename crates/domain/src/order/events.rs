//! Order domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use serde::{Deserialize, Serialize};

use crate::Money;
use crate::aggregate::DomainEvent;

use super::OrderLine;

/// Events that can occur on an order stream.
///
/// Orders are immutable once placed, so placement is the only event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    OrderPlaced(OrderPlacedData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
        }
    }
}

/// Data for OrderPlaced event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: AggregateId,
    pub user_id: UserId,

    /// Lines frozen at checkout.
    pub lines: Vec<OrderLine>,

    pub total_amount: Money,
    pub placed_at: DateTime<Utc>,
}

impl OrderEvent {
    pub fn order_placed(
        order_id: AggregateId,
        user_id: UserId,
        lines: Vec<OrderLine>,
        total_amount: Money,
    ) -> Self {
        OrderEvent::OrderPlaced(OrderPlacedData {
            order_id,
            user_id,
            lines,
            total_amount,
            placed_at: Utc::now(),
        })
    }
}
