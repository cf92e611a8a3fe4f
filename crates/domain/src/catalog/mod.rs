//! Read-only product catalog.
//!
//! The catalog itself lives outside this service; [`Catalog`] is the seam it
//! is reached through. [`CatalogLookup`] wraps any implementation with a
//! deadline and metrics, and is what the cart and checkout paths call.

mod lookup;
mod memory;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;
use crate::{Money, ProductId};

pub use lookup::{CatalogLookup, DEFAULT_CATALOG_TIMEOUT};
pub use memory::{CatalogSeedError, InMemoryCatalog};

/// Whether a product can currently be bought.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    Available,
    Unavailable,
}

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub price: Money,
    #[serde(default)]
    pub status: ProductStatus,
}

impl Product {
    pub fn new(id: impl Into<ProductId>, title: impl Into<String>, price: Money) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            price,
            status: ProductStatus::Available,
        }
    }

    pub fn with_status(mut self, status: ProductStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_available(&self) -> bool {
        self.status == ProductStatus::Available
    }
}

/// Errors returned by a catalog.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("Product not found: {0}")]
    NotFound(ProductId),

    /// The backend could not be reached or answered with an error.
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Catalog lookup timed out after {0:?}")]
    Timeout(Duration),
}

impl CatalogError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CatalogError::Unavailable(_) | CatalogError::Timeout(_))
    }

    pub fn kind(&self) -> ErrorKind {
        if self.is_transient() {
            ErrorKind::Transient
        } else {
            ErrorKind::NotFound
        }
    }
}

/// Source of product data.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Fetches one product. Unknown ids return [`CatalogError::NotFound`].
    async fn product(&self, id: &ProductId) -> Result<Product, CatalogError>;
}

/// Products fetched together for one recompute.
///
/// Products the catalog does not know are simply absent.
#[derive(Debug, Clone, Default)]
pub struct PriceSheet {
    products: HashMap<ProductId, Product>,
}

impl PriceSheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, product: Product) {
        self.products.insert(product.id.clone(), product);
    }

    pub fn get(&self, id: &ProductId) -> Option<&Product> {
        self.products.get(id)
    }

    pub fn price_of(&self, id: &ProductId) -> Option<Money> {
        self.products.get(id).map(|p| p.price)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

impl FromIterator<Product> for PriceSheet {
    fn from_iter<I: IntoIterator<Item = Product>>(iter: I) -> Self {
        let mut sheet = PriceSheet::new();
        for product in iter {
            sheet.insert(product);
        }
        sheet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_status_defaults_to_available() {
        let product: Product =
            serde_json::from_str(r#"{"id":"A","title":"Mug","price":1000}"#).unwrap();
        assert!(product.is_available());
        assert_eq!(product.price, Money::from_dollars(10));
    }

    #[test]
    fn price_sheet_lookup() {
        let sheet: PriceSheet = [Product::new("A", "Mug", Money::from_cents(1000))]
            .into_iter()
            .collect();
        assert_eq!(sheet.price_of(&"A".into()), Some(Money::from_cents(1000)));
        assert!(sheet.get(&"B".into()).is_none());
    }

    #[test]
    fn transient_errors() {
        assert!(CatalogError::Unavailable("down".into()).is_transient());
        assert!(CatalogError::Timeout(Duration::from_millis(5)).is_transient());
        assert!(!CatalogError::NotFound("A".into()).is_transient());
    }
}
