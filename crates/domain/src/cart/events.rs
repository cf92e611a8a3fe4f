//! Cart domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::{Money, ProductId};

/// Events that can occur on a cart stream.
///
/// A stream outlives any single cart: after `CartCleared` or `CartCheckedOut`
/// the cart is gone, and the next `CartOpened` starts a fresh one on the same
/// stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CartEvent {
    CartOpened(CartOpenedData),
    ItemAdded(ItemAddedData),
    ItemQuantityChanged(ItemQuantityChangedData),
    ItemRemoved(ItemRemovedData),

    /// Unit prices and total after a recompute against the catalog.
    CartRepriced(CartRepricedData),

    CartCleared(CartClearedData),

    /// The cart was turned into an order.
    CartCheckedOut(CartCheckedOutData),
}

impl DomainEvent for CartEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CartEvent::CartOpened(_) => "CartOpened",
            CartEvent::ItemAdded(_) => "ItemAdded",
            CartEvent::ItemQuantityChanged(_) => "ItemQuantityChanged",
            CartEvent::ItemRemoved(_) => "ItemRemoved",
            CartEvent::CartRepriced(_) => "CartRepriced",
            CartEvent::CartCleared(_) => "CartCleared",
            CartEvent::CartCheckedOut(_) => "CartCheckedOut",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartOpenedData {
    pub cart_id: AggregateId,
    pub user_id: UserId,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemAddedData {
    pub product_id: ProductId,

    /// Product title at the time of adding.
    pub title: String,

    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemQuantityChangedData {
    pub product_id: ProductId,
    pub old_quantity: u32,
    pub new_quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRemovedData {
    pub product_id: ProductId,
}

/// Catalog price of one line at recompute time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinePrice {
    pub product_id: ProductId,
    pub unit_price: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartRepricedData {
    /// One entry per line, in line order.
    pub prices: Vec<LinePrice>,
    pub total_amount: Money,
    pub priced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartClearedData {
    pub cleared_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartCheckedOutData {
    pub order_id: AggregateId,
    pub checked_out_at: DateTime<Utc>,
}

// Convenience constructors for events
impl CartEvent {
    pub fn cart_opened(cart_id: AggregateId, user_id: UserId) -> Self {
        CartEvent::CartOpened(CartOpenedData {
            cart_id,
            user_id,
            opened_at: Utc::now(),
        })
    }

    pub fn item_added(product_id: ProductId, title: impl Into<String>, quantity: u32) -> Self {
        CartEvent::ItemAdded(ItemAddedData {
            product_id,
            title: title.into(),
            quantity,
        })
    }

    pub fn item_quantity_changed(
        product_id: ProductId,
        old_quantity: u32,
        new_quantity: u32,
    ) -> Self {
        CartEvent::ItemQuantityChanged(ItemQuantityChangedData {
            product_id,
            old_quantity,
            new_quantity,
        })
    }

    pub fn item_removed(product_id: ProductId) -> Self {
        CartEvent::ItemRemoved(ItemRemovedData { product_id })
    }

    pub fn cart_repriced(prices: Vec<LinePrice>, total_amount: Money) -> Self {
        CartEvent::CartRepriced(CartRepricedData {
            prices,
            total_amount,
            priced_at: Utc::now(),
        })
    }

    pub fn cart_cleared() -> Self {
        CartEvent::CartCleared(CartClearedData {
            cleared_at: Utc::now(),
        })
    }

    pub fn cart_checked_out(order_id: AggregateId) -> Self {
        CartEvent::CartCheckedOut(CartCheckedOutData {
            order_id,
            checked_out_at: Utc::now(),
        })
    }
}
