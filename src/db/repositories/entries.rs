use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Row};

use crate::db::{
    helpers::{parse_datetime, parse_unit, to_u64},
    models::{InventoryEntry, StockTotal},
    Database,
};
use crate::inventory::EntryLog;

fn row_to_entry(row: &Row) -> Result<InventoryEntry> {
    let unit: String = row.get("unit")?;
    let recorded_at: String = row.get("recorded_at")?;

    Ok(InventoryEntry {
        id: row.get("id")?,
        barcode: row.get("barcode")?,
        product_name: row.get("product_name")?,
        brand: row.get("brand")?,
        quantity: row.get("quantity")?,
        unit: parse_unit(&unit)?,
        recorded_at: parse_datetime(&recorded_at, "recorded_at")?,
    })
}

impl Database {
    pub async fn insert_entry(&self, entry: &InventoryEntry) -> Result<()> {
        let record = entry.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO inventory_entries (id, barcode, product_name, brand, quantity, unit, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.barcode,
                    record.product_name,
                    record.brand,
                    record.quantity,
                    record.unit.as_str(),
                    record.recorded_at.to_rfc3339(),
                ],
            )
            .with_context(|| "failed to insert inventory entry")?;
            Ok(())
        })
        .await
    }

    /// Newest first, at most `limit` rows.
    pub async fn recent_entries(&self, limit: u32) -> Result<Vec<InventoryEntry>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, barcode, product_name, brand, quantity, unit, recorded_at
                 FROM inventory_entries
                 ORDER BY recorded_at DESC, rowid DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt.query(params![limit])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_entry(row)?);
            }

            Ok(entries)
        })
        .await
    }

    /// The whole log in insertion order, for export.
    pub async fn all_entries(&self) -> Result<Vec<InventoryEntry>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, barcode, product_name, brand, quantity, unit, recorded_at
                 FROM inventory_entries
                 ORDER BY rowid ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_entry(row)?);
            }

            Ok(entries)
        })
        .await
    }

    /// Quantity summed per product and unit.
    pub async fn stock_totals(&self) -> Result<Vec<StockTotal>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT barcode,
                        MAX(product_name) AS product_name,
                        unit,
                        SUM(quantity) AS quantity,
                        COUNT(*) AS entries
                 FROM inventory_entries
                 GROUP BY barcode, unit
                 ORDER BY product_name COLLATE NOCASE ASC, unit ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut totals = Vec::new();
            while let Some(row) = rows.next()? {
                let unit: String = row.get("unit")?;
                totals.push(StockTotal {
                    barcode: row.get("barcode")?,
                    product_name: row.get("product_name")?,
                    unit: parse_unit(&unit)?,
                    quantity: row.get("quantity")?,
                    entries: to_u64(row.get("entries")?, "entries")?,
                });
            }

            Ok(totals)
        })
        .await
    }
}

#[async_trait]
impl EntryLog for Database {
    async fn append(&self, entry: &InventoryEntry) -> Result<()> {
        self.insert_entry(entry).await
    }
}
