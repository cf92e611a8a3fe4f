//! Read model views.

mod user_orders;

pub use user_orders::{OrderSummary, UserOrdersView};
