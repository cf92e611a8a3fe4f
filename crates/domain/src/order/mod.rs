//! Order aggregate and checkout.

mod aggregate;
mod events;
mod factory;

pub use aggregate::{Order, OrderLine};
pub use events::{OrderEvent, OrderPlacedData};
pub use factory::OrderFactory;

use thiserror::Error;

use crate::error::ErrorKind;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order already placed")]
    AlreadyPlaced,

    #[error("Order has no lines")]
    NoLines,

    #[error("Order total exceeds the representable amount")]
    TotalOverflow,
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::AlreadyPlaced => ErrorKind::Conflict,
            OrderError::NoLines => ErrorKind::EmptyCart,
            OrderError::TotalOverflow => ErrorKind::Validation,
        }
    }
}
