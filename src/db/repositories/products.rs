use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::catalog::{ProductCatalog, RegisterOutcome};
use crate::db::{
    helpers::parse_datetime,
    models::{ProductRecord, StoredProduct},
    Database,
};

fn row_to_product(row: &Row) -> Result<ProductRecord, rusqlite::Error> {
    Ok(ProductRecord {
        barcode: row.get("barcode")?,
        name: row.get("name")?,
        brand: row.get("brand")?,
    })
}

impl Database {
    /// Exact-match lookup by barcode.
    pub async fn find_product(&self, barcode: String) -> Result<Option<ProductRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT barcode, name, brand
                 FROM products
                 WHERE barcode = ?1",
            )?;

            let product = stmt
                .query_row(params![barcode], row_to_product)
                .optional()?;

            Ok(product)
        })
        .await
    }

    /// Insert a new product. Returns `false` when the barcode is already taken;
    /// existing rows are never overwritten.
    pub async fn insert_product(&self, product: ProductRecord) -> Result<bool> {
        self.execute(move |conn| {
            let inserted = conn
                .execute(
                    "INSERT INTO products (barcode, name, brand, created_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(barcode) DO NOTHING",
                    params![
                        product.barcode,
                        product.name,
                        product.brand,
                        Utc::now().to_rfc3339(),
                    ],
                )
                .with_context(|| format!("failed to insert product {}", product.barcode))?;

            Ok(inserted == 1)
        })
        .await
    }

    /// Every product, ordered by name.
    pub async fn list_products(&self) -> Result<Vec<StoredProduct>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT barcode, name, brand, created_at
                 FROM products
                 ORDER BY name COLLATE NOCASE ASC, barcode ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut products = Vec::new();
            while let Some(row) = rows.next()? {
                let created_at: String = row.get("created_at")?;
                products.push(StoredProduct {
                    product: row_to_product(row)?,
                    created_at: parse_datetime(&created_at, "created_at")?,
                });
            }

            Ok(products)
        })
        .await
    }
}

#[async_trait]
impl ProductCatalog for Database {
    async fn find(&self, barcode: &str) -> Result<Option<ProductRecord>> {
        self.find_product(barcode.to_string()).await
    }

    async fn register(&self, product: ProductRecord) -> Result<RegisterOutcome> {
        if self.insert_product(product).await? {
            Ok(RegisterOutcome::Registered)
        } else {
            Ok(RegisterOutcome::AlreadyRegistered)
        }
    }

    async fn all(&self) -> Result<Vec<ProductRecord>> {
        let stored = self.list_products().await?;
        Ok(stored.into_iter().map(|row| row.product).collect())
    }
}
