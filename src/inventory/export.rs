use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::db::InventoryEntry;

#[derive(Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    recorded_at: String,
    barcode: &'a str,
    product_name: &'a str,
    brand: &'a str,
    quantity: f64,
    unit: &'static str,
}

impl<'a> From<&'a InventoryEntry> for CsvRow<'a> {
    fn from(entry: &'a InventoryEntry) -> Self {
        Self {
            id: &entry.id,
            recorded_at: entry.recorded_at.to_rfc3339(),
            barcode: &entry.barcode,
            product_name: &entry.product_name,
            brand: &entry.brand,
            quantity: entry.quantity,
            unit: entry.unit.as_str(),
        }
    }
}

/// Write entries as CSV with a header row. Returns the number of rows written.
pub fn write_csv<W: Write>(entries: &[InventoryEntry], writer: W) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for entry in entries {
        csv_writer
            .serialize(CsvRow::from(entry))
            .with_context(|| format!("failed to write entry {}", entry.id))?;
    }
    csv_writer.flush().context("failed to flush CSV output")?;
    Ok(entries.len())
}

pub fn export_to_path(entries: &[InventoryEntry], path: &Path) -> Result<usize> {
    let file = File::create(path)
        .with_context(|| format!("failed to create export file {}", path.display()))?;
    write_csv(entries, file)
}
