//! Cart aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;

pub use aggregate::{Cart, CartLine};
pub use commands::*;
pub use events::{
    CartCheckedOutData, CartClearedData, CartEvent, CartOpenedData, CartRepricedData,
    ItemAddedData, ItemQuantityChangedData, ItemRemovedData, LinePrice,
};
pub use service::CartService;

use thiserror::Error;

use crate::ProductId;
use crate::error::ErrorKind;

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("Cart not found")]
    CartNotFound,

    #[error("Item not found in cart: {product_id}")]
    ItemNotFound { product_id: ProductId },

    #[error("Product not found: {product_id}")]
    ProductNotFound { product_id: ProductId },

    #[error("Product is not available: {product_id}")]
    ProductUnavailable { product_id: ProductId },

    #[error("Invalid quantity: {quantity}")]
    InvalidQuantity { quantity: i64 },

    #[error("Cart is empty")]
    EmptyCart,
}

impl CartError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CartError::CartNotFound
            | CartError::ItemNotFound { .. }
            | CartError::ProductNotFound { .. } => ErrorKind::NotFound,
            CartError::ProductUnavailable { .. } | CartError::InvalidQuantity { .. } => {
                ErrorKind::Validation
            }
            CartError::EmptyCart => ErrorKind::EmptyCart,
        }
    }
}
