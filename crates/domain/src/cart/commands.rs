//! Cart commands.

use common::{AggregateId, UserId};

use crate::ProductId;
use crate::command::Command;

use super::Cart;

/// Command to add a quantity of a product to a user's cart.
#[derive(Debug, Clone)]
pub struct AddItem {
    pub user_id: UserId,
    pub product_id: ProductId,

    /// Requested quantity; anything below 1 is rejected.
    pub quantity: i64,
}

impl AddItem {
    pub fn new(user_id: UserId, product_id: impl Into<ProductId>, quantity: i64) -> Self {
        Self {
            user_id,
            product_id: product_id.into(),
            quantity,
        }
    }
}

impl Command for AddItem {
    type Aggregate = Cart;

    fn aggregate_id(&self) -> AggregateId {
        AggregateId::cart_of(self.user_id)
    }
}

/// Command to set a line's quantity exactly.
#[derive(Debug, Clone)]
pub struct SetQuantity {
    pub user_id: UserId,
    pub product_id: ProductId,

    /// Zero or less removes the line.
    pub quantity: i64,
}

impl SetQuantity {
    pub fn new(user_id: UserId, product_id: impl Into<ProductId>, quantity: i64) -> Self {
        Self {
            user_id,
            product_id: product_id.into(),
            quantity,
        }
    }
}

impl Command for SetQuantity {
    type Aggregate = Cart;

    fn aggregate_id(&self) -> AggregateId {
        AggregateId::cart_of(self.user_id)
    }
}

/// Command to remove a user's cart.
#[derive(Debug, Clone)]
pub struct ClearCart {
    pub user_id: UserId,
}

impl ClearCart {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}

impl Command for ClearCart {
    type Aggregate = Cart;

    fn aggregate_id(&self) -> AggregateId {
        AggregateId::cart_of(self.user_id)
    }
}

/// Command to turn a user's cart into an order.
#[derive(Debug, Clone)]
pub struct Checkout {
    pub user_id: UserId,
}

impl Checkout {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}

impl Command for Checkout {
    type Aggregate = Cart;

    fn aggregate_id(&self) -> AggregateId {
        AggregateId::cart_of(self.user_id)
    }
}
