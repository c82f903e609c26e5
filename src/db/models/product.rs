//! Product catalog data model.
//!
//! A product is keyed by its barcode; name and brand are free text supplied
//! when the barcode is registered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub barcode: String,
    pub name: String,
    pub brand: String,
}

impl ProductRecord {
    pub fn new(
        barcode: impl Into<String>,
        name: impl Into<String>,
        brand: impl Into<String>,
    ) -> Self {
        Self {
            barcode: barcode.into(),
            name: name.into(),
            brand: brand.into(),
        }
    }
}

/// Input for the registration workflow, validated before it reaches the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    pub barcode: String,
    pub name: String,
    pub brand: String,
}

/// A product row as stored, with its registration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredProduct {
    pub product: ProductRecord,
    pub created_at: DateTime<Utc>,
}

/// Validation for registration input
pub mod validation {
    use super::{ProductInput, ProductRecord};
    use anyhow::{bail, Result};

    const MAX_BARCODE_LEN: usize = 64;
    const MAX_TEXT_LEN: usize = 200;

    pub fn validate_barcode(barcode: &str) -> Result<()> {
        if barcode.is_empty() {
            bail!("barcode is required");
        }
        if barcode.len() > MAX_BARCODE_LEN {
            bail!("barcode too long (max {MAX_BARCODE_LEN} chars)");
        }
        if barcode.chars().any(char::is_whitespace) {
            bail!("barcode must not contain whitespace");
        }
        Ok(())
    }

    fn validate_text(field: &str, value: &str) -> Result<()> {
        if value.is_empty() {
            bail!("{field} is required");
        }
        if value.chars().count() > MAX_TEXT_LEN {
            bail!("{field} too long (max {MAX_TEXT_LEN} chars)");
        }
        Ok(())
    }

    /// Trim every field and check the required ones, producing the record to store.
    pub fn validate_product_input(input: &ProductInput) -> Result<ProductRecord> {
        let barcode = input.barcode.trim();
        let name = input.name.trim();
        let brand = input.brand.trim();

        validate_barcode(barcode)?;
        validate_text("name", name)?;
        validate_text("brand", brand)?;

        Ok(ProductRecord::new(barcode, name, brand))
    }
}
