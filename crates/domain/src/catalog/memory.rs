use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use super::{Catalog, CatalogError, Product, ProductStatus};
use crate::{Money, ProductId};

/// Why a catalog file could not be loaded.
#[derive(Debug, Error)]
pub enum CatalogSeedError {
    #[error("invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("product {product_id} has non-positive price {price}")]
    NonPositivePrice { product_id: ProductId, price: Money },
}

#[derive(Default)]
struct CatalogState {
    products: HashMap<ProductId, Product>,
    offline: bool,
    latency: Option<Duration>,
}

/// In-process catalog.
///
/// Serves the products it was seeded with. Prices and statuses can be changed
/// at runtime, and the catalog can be made slow or unreachable.
#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<RwLock<CatalogState>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let state = CatalogState {
            products: products.into_iter().map(|p| (p.id.clone(), p)).collect(),
            ..CatalogState::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Builds a catalog from a JSON array of products. Every price must be
    /// positive.
    pub fn from_json(json: &str) -> Result<Self, CatalogSeedError> {
        let products: Vec<Product> = serde_json::from_str(json)?;
        if let Some(bad) = products.iter().find(|p| p.price <= Money::zero()) {
            return Err(CatalogSeedError::NonPositivePrice {
                product_id: bad.id.clone(),
                price: bad.price,
            });
        }
        Ok(Self::with_products(products))
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.products.len()
    }

    pub async fn upsert(&self, product: Product) {
        self.state
            .write()
            .await
            .products
            .insert(product.id.clone(), product);
    }

    pub async fn remove(&self, id: &ProductId) -> Option<Product> {
        self.state.write().await.products.remove(id)
    }

    /// Changes a product's price. Returns false if the product is unknown.
    pub async fn set_price(&self, id: &ProductId, price: Money) -> bool {
        match self.state.write().await.products.get_mut(id) {
            Some(product) => {
                product.price = price;
                true
            }
            None => false,
        }
    }

    pub async fn set_status(&self, id: &ProductId, status: ProductStatus) -> bool {
        match self.state.write().await.products.get_mut(id) {
            Some(product) => {
                product.status = status;
                true
            }
            None => false,
        }
    }

    /// While offline every lookup fails with [`CatalogError::Unavailable`].
    pub async fn set_offline(&self, offline: bool) {
        self.state.write().await.offline = offline;
    }

    /// Delays every lookup by `latency`.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.state.write().await.latency = latency;
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn product(&self, id: &ProductId) -> Result<Product, CatalogError> {
        let latency = self.state.read().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let state = self.state.read().await;
        if state.offline {
            return Err(CatalogError::Unavailable("catalog is offline".into()));
        }
        state
            .products
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_products_from_json() {
        let catalog = InMemoryCatalog::from_json(
            r#"[
                {"id": "A", "title": "Mug", "price": 1000},
                {"id": "B", "title": "Pen", "price": 500, "status": "unavailable"}
            ]"#,
        )
        .unwrap();

        assert_eq!(catalog.len().await, 2);
        let pen = catalog.product(&"B".into()).await.unwrap();
        assert_eq!(pen.status, ProductStatus::Unavailable);
    }

    #[test]
    fn rejects_non_positive_prices() {
        let err = InMemoryCatalog::from_json(
            r#"[
                {"id": "A", "title": "Mug", "price": 1000},
                {"id": "F", "title": "Freebie", "price": 0}
            ]"#,
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            CatalogSeedError::NonPositivePrice { ref product_id, .. } if product_id.as_str() == "F"
        ));

        assert!(matches!(
            InMemoryCatalog::from_json(r#"[{"id": "N", "title": "Refund", "price": -5}]"#),
            Err(CatalogSeedError::NonPositivePrice { .. })
        ));
        assert!(matches!(
            InMemoryCatalog::from_json("{"),
            Err(CatalogSeedError::Json(_))
        ));
    }

    #[tokio::test]
    async fn removed_product_is_not_found() {
        let catalog =
            InMemoryCatalog::with_products([Product::new("A", "Mug", Money::from_cents(1000))]);
        assert!(catalog.remove(&"A".into()).await.is_some());

        assert!(matches!(
            catalog.product(&"A".into()).await,
            Err(CatalogError::NotFound(_))
        ));
        assert!(!catalog.set_price(&"A".into(), Money::from_cents(1)).await);
    }
}
