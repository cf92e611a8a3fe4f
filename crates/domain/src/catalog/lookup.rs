use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::try_join_all;

use super::{Catalog, CatalogError, PriceSheet, Product};
use crate::{Money, ProductId};

pub const DEFAULT_CATALOG_TIMEOUT: Duration = Duration::from_secs(2);

/// Deadline-bounded access to a [`Catalog`].
///
/// Nothing is cached: every call reaches the catalog, so each recompute sees
/// current prices.
#[derive(Clone)]
pub struct CatalogLookup {
    catalog: Arc<dyn Catalog>,
    timeout: Duration,
}

impl CatalogLookup {
    pub fn new(catalog: Arc<dyn Catalog>, timeout: Duration) -> Self {
        Self { catalog, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn product(&self, id: &ProductId) -> Result<Product, CatalogError> {
        self.timed("product", self.catalog.product(id)).await
    }

    pub async fn price_of(&self, id: &ProductId) -> Result<Money, CatalogError> {
        Ok(self.product(id).await?.price)
    }

    /// Returns whether the catalog knows `id`. Transient failures are errors,
    /// not `false`.
    pub async fn exists(&self, id: &ProductId) -> Result<bool, CatalogError> {
        match self.product(id).await {
            Ok(_) => Ok(true),
            Err(CatalogError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Fetches every distinct id concurrently under a single deadline.
    ///
    /// Unknown products are left out of the sheet; any transient failure
    /// fails the whole quote.
    pub async fn quote<'a, I>(&self, ids: I) -> Result<PriceSheet, CatalogError>
    where
        I: IntoIterator<Item = &'a ProductId>,
    {
        let ids: BTreeSet<&ProductId> = ids.into_iter().collect();
        if ids.is_empty() {
            return Ok(PriceSheet::new());
        }

        let catalog = self.catalog.as_ref();
        let lookups = ids.into_iter().map(|id| async move {
            match catalog.product(id).await {
                Ok(product) => Ok(Some(product)),
                Err(CatalogError::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            }
        });

        let found = self.timed("quote", try_join_all(lookups)).await?;
        Ok(found.into_iter().flatten().collect())
    }

    async fn timed<T, F>(&self, op: &'static str, fut: F) -> Result<T, CatalogError>
    where
        F: Future<Output = Result<T, CatalogError>>,
    {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CatalogError::Timeout(self.timeout)),
        };
        metrics::histogram!("catalog_lookup_seconds", "op" => op)
            .record(start.elapsed().as_secs_f64());

        if let Err(e) = &result
            && e.is_transient()
        {
            tracing::warn!(op, error = %e, "catalog lookup failed");
        }
        result
    }
}
