//! Cart service: the entry point for every cart read and mutation.

use std::iter;

use common::{AggregateId, UserId};
use event_store::EventStore;

use crate::catalog::CatalogLookup;
use crate::command::{Command, CommandHandler, CommandResult};
use crate::error::DomainError;
use crate::guard::UserLocks;

use super::{AddItem, Cart, CartError, ClearCart, SetQuantity};

/// Service for managing carts.
///
/// Every mutation holds the user's lock from load to append, re-reads catalog
/// prices for every line, and appends all of its events in one batch.
pub struct CartService<S: EventStore> {
    handler: CommandHandler<S, Cart>,
    catalog: CatalogLookup,
    locks: UserLocks,
}

impl<S: EventStore> CartService<S> {
    pub fn new(store: S, catalog: CatalogLookup, locks: UserLocks) -> Self {
        Self {
            handler: CommandHandler::new(store),
            catalog,
            locks,
        }
    }

    pub fn handler(&self) -> &CommandHandler<S, Cart> {
        &self.handler
    }

    /// Returns the user's cart. A user without a cart gets an empty one.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, user_id: UserId) -> Result<Cart, DomainError> {
        self.handler.load(AggregateId::cart_of(user_id)).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn add_item(&self, cmd: AddItem) -> Result<CommandResult<Cart>, DomainError> {
        let quantity = u32::try_from(cmd.quantity)
            .ok()
            .filter(|q| *q >= 1)
            .ok_or(CartError::InvalidQuantity {
                quantity: cmd.quantity,
            })?;

        let _guard = self.locks.acquire(cmd.user_id).await;
        let cart_id = cmd.aggregate_id();
        let cart = self.handler.load(cart_id).await?;

        let prices = self
            .catalog
            .quote(cart.product_ids().chain(iter::once(&cmd.product_id)))
            .await?;

        let result = self
            .handler
            .execute_loaded_with_snapshot(cart_id, cart, |cart| {
                cart.add_item(cart_id, cmd.user_id, &cmd.product_id, quantity, &prices)
            })
            .await?;

        record_mutation("add_item");
        tracing::info!(
            user_id = %cmd.user_id,
            product_id = %cmd.product_id,
            total = %result.aggregate.total_amount(),
            "item added to cart"
        );
        Ok(result)
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        cmd: SetQuantity,
    ) -> Result<CommandResult<Cart>, DomainError> {
        let _guard = self.locks.acquire(cmd.user_id).await;
        let cart_id = cmd.aggregate_id();
        let cart = self.handler.load(cart_id).await?;

        // Reject before touching the catalog.
        if !cart.exists() {
            return Err(CartError::CartNotFound.into());
        }
        if cart.line(&cmd.product_id).is_none() {
            return Err(CartError::ItemNotFound {
                product_id: cmd.product_id.clone(),
            }
            .into());
        }

        let remaining = cart
            .product_ids()
            .filter(|id| cmd.quantity > 0 || **id != cmd.product_id);
        let prices = self.catalog.quote(remaining).await?;

        let result = self
            .handler
            .execute_loaded_with_snapshot(cart_id, cart, |cart| {
                cart.set_quantity(&cmd.product_id, cmd.quantity, &prices)
            })
            .await?;

        if !result.events.is_empty() {
            record_mutation("set_quantity");
        }
        Ok(result)
    }

    /// Removes the user's cart. Succeeds whether or not a cart existed.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, cmd: ClearCart) -> Result<CommandResult<Cart>, DomainError> {
        let _guard = self.locks.acquire(cmd.user_id).await;
        let cart_id = cmd.aggregate_id();
        let cart = self.handler.load(cart_id).await?;

        let result = self
            .handler
            .execute_loaded_with_snapshot(cart_id, cart, |cart| Ok(cart.clear()))
            .await?;

        if !result.events.is_empty() {
            record_mutation("clear");
        }
        Ok(result)
    }
}

fn record_mutation(op: &'static str) {
    metrics::counter!("cart_mutations_total", "op" => op).increment(1);
}
