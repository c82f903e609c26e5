//! Inventory log data models.
//!
//! An `InventoryEntry` is built once the session holds a resolved product and
//! the user has supplied a quantity and unit. Entries are append-only.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    #[default]
    #[serde(rename = "pcs")]
    Piece,
    #[serde(rename = "kg")]
    Kilogram,
    #[serde(rename = "g")]
    Gram,
    #[serde(rename = "l")]
    Liter,
    #[serde(rename = "ml")]
    Milliliter,
    #[serde(rename = "box")]
    Box,
    #[serde(rename = "pack")]
    Pack,
    #[serde(rename = "bottle")]
    Bottle,
    #[serde(rename = "can")]
    Can,
}

impl Unit {
    pub const ALL: [Unit; 9] = [
        Unit::Piece,
        Unit::Kilogram,
        Unit::Gram,
        Unit::Liter,
        Unit::Milliliter,
        Unit::Box,
        Unit::Pack,
        Unit::Bottle,
        Unit::Can,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Piece => "pcs",
            Unit::Kilogram => "kg",
            Unit::Gram => "g",
            Unit::Liter => "l",
            Unit::Milliliter => "ml",
            Unit::Box => "box",
            Unit::Pack => "pack",
            Unit::Bottle => "bottle",
            Unit::Can => "can",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pcs" | "pc" | "piece" | "pieces" => Ok(Unit::Piece),
            "kg" | "kilogram" | "kilograms" => Ok(Unit::Kilogram),
            "g" | "gram" | "grams" => Ok(Unit::Gram),
            "l" | "liter" | "litre" | "liters" | "litres" => Ok(Unit::Liter),
            "ml" | "milliliter" | "millilitre" => Ok(Unit::Milliliter),
            "box" | "boxes" => Ok(Unit::Box),
            "pack" | "packs" => Ok(Unit::Pack),
            "bottle" | "bottles" => Ok(Unit::Bottle),
            "can" | "cans" => Ok(Unit::Can),
            other => Err(anyhow!("unknown unit '{other}'")),
        }
    }
}

/// What the user typed into the submit form. Kept intact on a failed write so
/// it can be resubmitted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDraft {
    pub quantity: f64,
    pub unit: Unit,
}

impl EntryDraft {
    pub fn new(quantity: f64, unit: Unit) -> Self {
        Self { quantity, unit }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryEntry {
    pub id: String,
    pub barcode: String,
    pub product_name: String,
    pub brand: String,
    pub quantity: f64,
    pub unit: Unit,
    pub recorded_at: DateTime<Utc>,
}

/// Summed quantity for one product in one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockTotal {
    pub barcode: String,
    pub product_name: String,
    pub unit: Unit,
    pub quantity: f64,
    pub entries: u64,
}
