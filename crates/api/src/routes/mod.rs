//! HTTP route handlers.

pub mod cart;
pub mod ops;
pub mod orders;
