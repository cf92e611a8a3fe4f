//! Domain layer for the shop service.
//!
//! - [`Cart`] holds a user's lines and a total kept in step with the catalog
//! - [`CartService`] serializes each user's mutations with [`UserLocks`]
//! - [`OrderFactory`] turns a cart into an immutable [`Order`] in one atomic
//!   append across both streams
//! - [`CatalogLookup`] reads prices through the [`Catalog`] trait under a
//!   deadline

pub mod aggregate;
pub mod cart;
pub mod catalog;
pub mod command;
pub mod error;
pub mod guard;
pub mod order;
pub mod value_objects;

pub use aggregate::{Aggregate, DomainEvent, SnapshotCapable};
pub use cart::{
    AddItem, Cart, CartError, CartEvent, CartLine, CartService, Checkout, ClearCart, SetQuantity,
};
pub use catalog::{
    Catalog, CatalogError, CatalogLookup, CatalogSeedError, DEFAULT_CATALOG_TIMEOUT,
    InMemoryCatalog, PriceSheet, Product, ProductStatus,
};
pub use command::{Command, CommandHandler, CommandResult};
pub use error::{DomainError, ErrorKind};
pub use guard::{UserGuard, UserLocks};
pub use order::{Order, OrderError, OrderEvent, OrderFactory, OrderLine, OrderPlacedData};
pub use value_objects::{Money, ProductId};
