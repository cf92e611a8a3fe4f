//! Cart aggregate implementation.

use common::{AggregateId, UserId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};
use crate::catalog::PriceSheet;
use crate::order::OrderLine;
use crate::{Money, ProductId};

use super::{
    CartError, CartEvent, LinePrice,
    events::{CartOpenedData, CartRepricedData, ItemAddedData, ItemQuantityChangedData},
};

/// One product in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub title: String,
    pub quantity: u32,

    /// Catalog price as of the last recompute.
    pub unit_price: Money,
}

impl CartLine {
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// A user's cart.
///
/// The cart exists from its first successful add until it is cleared or
/// checked out; an existing cart always has at least one line. The stream
/// version survives across carts so that writers racing on a cart that was
/// just removed still conflict.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cart {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    owner: Option<UserId>,

    /// Lines in the order products were first added.
    lines: Vec<CartLine>,

    total_amount: Money,
}

impl Aggregate for Cart {
    type Event = CartEvent;
    type Error = CartError;

    fn aggregate_type() -> &'static str {
        "Cart"
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
            CartEvent::CartOpened(data) => self.apply_cart_opened(data),
            CartEvent::ItemAdded(data) => self.apply_item_added(data),
            CartEvent::ItemQuantityChanged(data) => self.apply_quantity_changed(data),
            CartEvent::ItemRemoved(data) => {
                self.lines.retain(|line| line.product_id != data.product_id);
            }
            CartEvent::CartRepriced(data) => self.apply_repriced(data),
            CartEvent::CartCleared(_) | CartEvent::CartCheckedOut(_) => self.reset(),
        }
    }
}

impl SnapshotCapable for Cart {
    fn snapshot_interval() -> usize {
        50
    }
}

// Query methods
impl Cart {
    pub fn exists(&self) -> bool {
        self.id.is_some()
    }

    pub fn owner(&self) -> Option<UserId> {
        self.owner
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn line(&self, product_id: &ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|line| &line.product_id == product_id)
    }

    pub fn product_ids(&self) -> impl Iterator<Item = &ProductId> {
        self.lines.iter().map(|line| &line.product_id)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn total_quantity(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }
}

// Command methods (return events)
impl Cart {
    /// Adds `quantity` of a product, opening the cart if needed.
    ///
    /// `prices` must cover the new product and every existing line.
    pub fn add_item(
        &self,
        cart_id: AggregateId,
        owner: UserId,
        product_id: &ProductId,
        quantity: u32,
        prices: &PriceSheet,
    ) -> Result<Vec<CartEvent>, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity: 0 });
        }

        let product = prices
            .get(product_id)
            .ok_or_else(|| CartError::ProductNotFound {
                product_id: product_id.clone(),
            })?;
        if !product.is_available() {
            return Err(CartError::ProductUnavailable {
                product_id: product_id.clone(),
            });
        }

        let mut events = Vec::with_capacity(3);
        if !self.exists() {
            events.push(CartEvent::cart_opened(cart_id, owner));
        }

        let mut lines = self.lines.clone();
        match lines.iter().position(|line| &line.product_id == product_id) {
            Some(index) => {
                let line = &mut lines[index];
                let new_quantity = line.quantity.checked_add(quantity).ok_or(
                    CartError::InvalidQuantity {
                        quantity: i64::from(line.quantity) + i64::from(quantity),
                    },
                )?;
                events.push(CartEvent::item_quantity_changed(
                    product_id.clone(),
                    line.quantity,
                    new_quantity,
                ));
                line.quantity = new_quantity;
            }
            None => {
                events.push(CartEvent::item_added(
                    product_id.clone(),
                    product.title.clone(),
                    quantity,
                ));
                lines.push(CartLine {
                    product_id: product_id.clone(),
                    title: product.title.clone(),
                    quantity,
                    unit_price: product.price,
                });
            }
        }

        let (prices, total) = reprice(&lines, prices)?;
        events.push(CartEvent::cart_repriced(prices, total));
        Ok(events)
    }

    /// Sets a line's quantity exactly. Zero or less removes the line, and
    /// removing the last line removes the cart.
    ///
    /// Setting the quantity a line already has produces no events unless
    /// catalog prices moved since the last recompute.
    pub fn set_quantity(
        &self,
        product_id: &ProductId,
        quantity: i64,
        prices: &PriceSheet,
    ) -> Result<Vec<CartEvent>, CartError> {
        if !self.exists() {
            return Err(CartError::CartNotFound);
        }
        let existing = self.line(product_id).ok_or_else(|| CartError::ItemNotFound {
            product_id: product_id.clone(),
        })?;

        if quantity <= 0 {
            let mut events = vec![CartEvent::item_removed(product_id.clone())];
            let remaining: Vec<CartLine> = self
                .lines
                .iter()
                .filter(|line| &line.product_id != product_id)
                .cloned()
                .collect();

            if remaining.is_empty() {
                events.push(CartEvent::cart_cleared());
            } else {
                let (prices, total) = reprice(&remaining, prices)?;
                events.push(CartEvent::cart_repriced(prices, total));
            }
            return Ok(events);
        }

        let new_quantity =
            u32::try_from(quantity).map_err(|_| CartError::InvalidQuantity { quantity })?;

        let mut events = Vec::with_capacity(2);
        let mut lines = self.lines.clone();
        if new_quantity != existing.quantity {
            events.push(CartEvent::item_quantity_changed(
                product_id.clone(),
                existing.quantity,
                new_quantity,
            ));
            for line in lines.iter_mut().filter(|l| &l.product_id == product_id) {
                line.quantity = new_quantity;
            }
        }

        let (line_prices, total) = reprice(&lines, prices)?;
        if events.is_empty() && !self.price_drifted(&line_prices, total) {
            return Ok(vec![]);
        }
        events.push(CartEvent::cart_repriced(line_prices, total));
        Ok(events)
    }

    /// Removes the cart. Clearing a cart that does not exist does nothing.
    pub fn clear(&self) -> Vec<CartEvent> {
        if self.exists() {
            vec![CartEvent::cart_cleared()]
        } else {
            vec![]
        }
    }

    /// Closes the cart in favour of `order_id`.
    pub fn check_out(&self, order_id: AggregateId) -> Result<Vec<CartEvent>, CartError> {
        if !self.exists() || self.lines.is_empty() {
            return Err(CartError::EmptyCart);
        }
        Ok(vec![CartEvent::cart_checked_out(order_id)])
    }

    /// Freezes the lines into order lines using the titles and prices in
    /// `prices`. Every product must still be in the catalog and available.
    pub fn snapshot_lines(&self, prices: &PriceSheet) -> Result<Vec<OrderLine>, CartError> {
        if self.lines.is_empty() {
            return Err(CartError::EmptyCart);
        }

        let lines = self
            .lines
            .iter()
            .map(|line| {
                let product =
                    prices
                        .get(&line.product_id)
                        .ok_or_else(|| CartError::ProductNotFound {
                            product_id: line.product_id.clone(),
                        })?;
                if !product.is_available() {
                    return Err(CartError::ProductUnavailable {
                        product_id: line.product_id.clone(),
                    });
                }
                Ok(OrderLine {
                    product_id: line.product_id.clone(),
                    title: product.title.clone(),
                    unit_price: product.price,
                    quantity: line.quantity,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if OrderLine::total_of(&lines).is_none() {
            let largest = self.lines.iter().map(|l| l.quantity).max().unwrap_or(0);
            return Err(CartError::InvalidQuantity {
                quantity: i64::from(largest),
            });
        }
        Ok(lines)
    }

    fn price_drifted(&self, prices: &[LinePrice], total: Money) -> bool {
        total != self.total_amount
            || prices
                .iter()
                .zip(&self.lines)
                .any(|(price, line)| price.unit_price != line.unit_price)
    }
}

/// Prices every line from `prices` and sums the total.
///
/// A line or total that does not fit in `Money` is an invalid quantity.
fn reprice(
    lines: &[CartLine],
    prices: &PriceSheet,
) -> Result<(Vec<LinePrice>, Money), CartError> {
    let mut total = Money::zero();
    let mut line_prices = Vec::with_capacity(lines.len());

    for line in lines {
        let unit_price =
            prices
                .price_of(&line.product_id)
                .ok_or_else(|| CartError::ProductNotFound {
                    product_id: line.product_id.clone(),
                })?;
        total = unit_price
            .checked_mul(line.quantity)
            .and_then(|line_total| total.checked_add(line_total))
            .ok_or(CartError::InvalidQuantity {
                quantity: i64::from(line.quantity),
            })?;
        line_prices.push(LinePrice {
            product_id: line.product_id.clone(),
            unit_price,
        });
    }

    Ok((line_prices, total))
}

// Apply event helpers
impl Cart {
    fn apply_cart_opened(&mut self, data: CartOpenedData) {
        self.id = Some(data.cart_id);
        self.owner = Some(data.user_id);
        self.lines.clear();
        self.total_amount = Money::zero();
    }

    fn apply_item_added(&mut self, data: ItemAddedData) {
        self.lines.push(CartLine {
            product_id: data.product_id,
            title: data.title,
            quantity: data.quantity,
            unit_price: Money::zero(),
        });
    }

    fn apply_quantity_changed(&mut self, data: ItemQuantityChangedData) {
        if let Some(line) = self
            .lines
            .iter_mut()
            .find(|line| line.product_id == data.product_id)
        {
            line.quantity = data.new_quantity;
        }
    }

    fn apply_repriced(&mut self, data: CartRepricedData) {
        for price in data.prices {
            if let Some(line) = self
                .lines
                .iter_mut()
                .find(|line| line.product_id == price.product_id)
            {
                line.unit_price = price.unit_price;
            }
        }
        self.total_amount = data.total_amount;
    }

    fn reset(&mut self) {
        *self = Cart {
            version: self.version,
            ..Cart::default()
        };
    }
}
