//! Catalog lookup and the registration workflow.
//!
//! [`Catalog`] wraps whatever backs the product data (the SQLite store in the
//! app, in-memory fakes in tests) and owns the "unknown is not an error" policy:
//! a missing barcode or an unreachable store both come back as
//! [`CatalogLookup::Unknown`].

pub mod search;

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use serde::Serialize;

use crate::db::{models::product::validation, ProductInput, ProductRecord};
use crate::error::ScanError;

pub use search::LetterFilter;

/// Product data collaborator.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Exact barcode match. `Ok(None)` when absent; `Err` only when unreachable.
    async fn find(&self, barcode: &str) -> Result<Option<ProductRecord>>;

    async fn register(&self, product: ProductRecord) -> Result<RegisterOutcome>;

    async fn all(&self) -> Result<Vec<ProductRecord>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    AlreadyRegistered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "product", rename_all = "camelCase")]
pub enum CatalogLookup {
    Found(ProductRecord),
    Unknown,
}

impl CatalogLookup {
    pub fn product(&self) -> Option<&ProductRecord> {
        match self {
            CatalogLookup::Found(product) => Some(product),
            CatalogLookup::Unknown => None,
        }
    }
}

/// Cached product list. `generation` moves on every invalidation so a load
/// that started before it can tell its result is stale.
#[derive(Default)]
struct Snapshot {
    generation: u64,
    products: Option<Arc<Vec<ProductRecord>>>,
}

#[derive(Clone)]
pub struct Catalog {
    source: Arc<dyn ProductCatalog>,
    snapshot: Arc<RwLock<Snapshot>>,
}

impl Catalog {
    pub fn new(source: Arc<dyn ProductCatalog>) -> Self {
        Self {
            source,
            snapshot: Arc::new(RwLock::new(Snapshot::default())),
        }
    }

    /// Resolve a barcode to a product. Never fails.
    pub async fn lookup(&self, barcode: &str) -> CatalogLookup {
        let barcode = barcode.trim();
        if barcode.is_empty() {
            return CatalogLookup::Unknown;
        }

        match self.source.find(barcode).await {
            Ok(Some(product)) => CatalogLookup::Found(product),
            Ok(None) => {
                info!("barcode {barcode} not in catalog");
                CatalogLookup::Unknown
            }
            Err(err) => {
                warn!("catalog lookup for {barcode} failed, treating as unknown: {err:#}");
                CatalogLookup::Unknown
            }
        }
    }

    /// Validate and store a new barcode → product mapping.
    pub async fn register(&self, input: &ProductInput) -> Result<ProductRecord, ScanError> {
        let record = validation::validate_product_input(input)
            .map_err(|err| ScanError::validation(err.to_string()))?;

        let outcome = self
            .source
            .register(record.clone())
            .await
            .map_err(|err| ScanError::CatalogUnavailable(format!("{err:#}")))?;

        match outcome {
            RegisterOutcome::Registered => {
                self.invalidate();
                info!("registered product {} ({})", record.barcode, record.name);
                Ok(record)
            }
            RegisterOutcome::AlreadyRegistered => Err(ScanError::validation(format!(
                "barcode {} is already registered",
                record.barcode
            ))),
        }
    }

    /// Cached full product list, loaded on first use after an invalidation.
    pub async fn products(&self) -> Result<Arc<Vec<ProductRecord>>, ScanError> {
        let generation = {
            let snapshot = self.read_snapshot();
            if let Some(products) = &snapshot.products {
                return Ok(Arc::clone(products));
            }
            snapshot.generation
        };

        let products = self
            .source
            .all()
            .await
            .map_err(|err| ScanError::CatalogUnavailable(format!("{err:#}")))?;
        let products = Arc::new(products);

        let mut snapshot = self.write_snapshot();
        if snapshot.generation == generation {
            snapshot.products = Some(Arc::clone(&products));
        }
        Ok(products)
    }

    pub async fn search(&self, query: &str) -> Result<Vec<ProductRecord>, ScanError> {
        let products = self.products().await?;
        Ok(search::search(&products, query).into_iter().cloned().collect())
    }

    pub async fn by_letter(&self, filter: LetterFilter) -> Result<Vec<ProductRecord>, ScanError> {
        let products = self.products().await?;
        Ok(filter.apply(&products).into_iter().cloned().collect())
    }

    pub fn invalidate(&self) {
        let mut snapshot = self.write_snapshot();
        snapshot.generation = snapshot.generation.wrapping_add(1);
        snapshot.products = None;
    }

    fn read_snapshot(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_snapshot(&self) -> RwLockWriteGuard<'_, Snapshot> {
        self.snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
