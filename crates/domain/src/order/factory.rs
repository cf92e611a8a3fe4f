//! Checkout: turns a cart into an order.

use common::AggregateId;
use event_store::{EventStore, EventStoreError};

use crate::aggregate::Aggregate;
use crate::cart::{Cart, CartError, Checkout};
use crate::catalog::CatalogLookup;
use crate::command::{Command, CommandHandler, build_batch};
use crate::error::DomainError;
use crate::guard::UserLocks;

use super::Order;

/// Creates orders from carts.
///
/// A checkout writes `OrderPlaced` to a new order stream and `CartCheckedOut`
/// to the cart stream in a single atomic append, so there is never a moment
/// where both the order and the cart exist, or neither does.
pub struct OrderFactory<S: EventStore> {
    carts: CommandHandler<S, Cart>,
    catalog: CatalogLookup,
    locks: UserLocks,
}

impl<S: EventStore> OrderFactory<S> {
    pub fn new(store: S, catalog: CatalogLookup, locks: UserLocks) -> Self {
        Self {
            carts: CommandHandler::new(store),
            catalog,
            locks,
        }
    }

    /// Places an order from the user's cart and removes the cart.
    ///
    /// Order lines and the order total use catalog data read during this
    /// call, not the prices stored on the cart.
    #[tracing::instrument(skip(self))]
    pub async fn checkout(&self, cmd: Checkout) -> Result<Order, DomainError> {
        let _guard = self.locks.acquire(cmd.user_id).await;
        let cart_id = cmd.aggregate_id();
        let cart = self.carts.load(cart_id).await?;

        if !cart.exists() || cart.is_empty() {
            return Err(CartError::EmptyCart.into());
        }

        let prices = self.catalog.quote(cart.product_ids()).await?;
        let lines = cart.snapshot_lines(&prices)?;

        let order_id = AggregateId::new();
        let mut order = Order::default();
        let order_events = order.place(order_id, cmd.user_id, lines)?;
        let cart_events = cart.check_out(order_id)?;

        let order_batch = build_batch::<Order>(order_id, order.version(), &order_events)?;
        let cart_batch = build_batch::<Cart>(cart_id, cart.version(), &cart_events)?;

        let versions = match self
            .carts
            .store()
            .append_atomic(vec![order_batch, cart_batch])
            .await
        {
            Ok(versions) => versions,
            Err(e @ EventStoreError::ConcurrencyConflict { .. }) => {
                metrics::counter!("checkout_conflicts_total").increment(1);
                tracing::warn!(user_id = %cmd.user_id, error = %e, "checkout lost a race");
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        order.apply_events(order_events);
        if let Some(version) = versions.first() {
            order.set_version(*version);
        }

        metrics::counter!("checkouts_total").increment(1);
        tracing::info!(
            user_id = %cmd.user_id,
            %order_id,
            total = %order.total_amount(),
            "order placed"
        );
        Ok(order)
    }
}
