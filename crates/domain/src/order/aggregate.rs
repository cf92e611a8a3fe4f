//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::{Money, ProductId};

use super::{OrderError, OrderEvent, events::OrderPlacedData};

/// A purchased product, as it was at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub title: String,
    pub unit_price: Money,
    pub quantity: u32,
}

impl OrderLine {
    /// Returns the total price for this line (quantity * unit_price).
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    /// Sum of the line totals, or `None` if it does not fit in `Money`.
    pub fn total_of(lines: &[OrderLine]) -> Option<Money> {
        lines.iter().try_fold(Money::zero(), |total, line| {
            total.checked_add(line.unit_price.checked_mul(line.quantity)?)
        })
    }
}

/// Order aggregate root.
///
/// Holds no reference to the cart it came from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    user_id: Option<UserId>,
    lines: Vec<OrderLine>,
    total_amount: Money,
    placed_at: Option<DateTime<Utc>>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrderEvent::OrderPlaced(data) => self.apply_order_placed(data),
        }
    }
}

// Query methods
impl Order {
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn placed_at(&self) -> Option<DateTime<Utc>> {
        self.placed_at
    }
}

// Command methods (return events)
impl Order {
    /// Places a new order with the given lines.
    pub fn place(
        &self,
        order_id: AggregateId,
        user_id: UserId,
        lines: Vec<OrderLine>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyPlaced);
        }
        if lines.is_empty() {
            return Err(OrderError::NoLines);
        }
        let total = OrderLine::total_of(&lines).ok_or(OrderError::TotalOverflow)?;

        Ok(vec![OrderEvent::order_placed(order_id, user_id, lines, total)])
    }
}

impl Order {
    fn apply_order_placed(&mut self, data: OrderPlacedData) {
        self.id = Some(data.order_id);
        self.user_id = Some(data.user_id);
        self.lines = data.lines;
        self.total_amount = data.total_amount;
        self.placed_at = Some(data.placed_at);
    }
}
