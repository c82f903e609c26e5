//! Presentation-facing operations. Everything here returns either a value or
//! a message that can be shown to the user as-is.

use std::fmt;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::{
    capture::CaptureSource,
    catalog::LetterFilter,
    db::{EntryDraft, InventoryEntry, ProductInput, ProductRecord, StockTotal, Unit},
    error::ScanError,
    inventory::export,
    session::{CaptureReport, ScanSessionState},
    AppState,
};

/// Failed submission. `draft` is set when the form can be resubmitted as-is.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitFailure {
    pub message: String,
    pub draft: Option<EntryDraft>,
}

impl fmt::Display for SubmitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<ScanError> for SubmitFailure {
    fn from(err: ScanError) -> Self {
        Self {
            draft: err.retry_draft(),
            message: err.to_string(),
        }
    }
}

/// Decode an image file as an upload.
pub async fn scan_file(state: &AppState, path: &Path) -> Result<CaptureReport, String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read image {}", path.display()))
        .map_err(|e| format!("{e:#}"))?;
    state
        .scanner
        .capture_bytes(bytes, CaptureSource::Upload)
        .await
        .map_err(|e| e.to_string())
}

pub async fn enter_barcode(state: &AppState, barcode: &str) -> Result<ScanSessionState, String> {
    state
        .scanner
        .enter_manual(barcode)
        .await
        .map_err(|e| e.to_string())
}

pub async fn confirm_barcode(state: &AppState, accept: bool) -> Result<ScanSessionState, String> {
    state
        .scanner
        .confirm(accept)
        .await
        .map_err(|e| e.to_string())
}

pub async fn reset_session(state: &AppState) -> ScanSessionState {
    state.scanner.reset().await
}

pub async fn session_status(state: &AppState) -> ScanSessionState {
    state.scanner.snapshot().await
}

/// Submit the quantity form. The unit falls back to the configured default.
pub async fn submit_entry(
    state: &AppState,
    quantity: f64,
    unit: Option<Unit>,
) -> Result<InventoryEntry, SubmitFailure> {
    let unit = unit.unwrap_or_else(|| state.settings.default_unit());
    state
        .scanner
        .submit(EntryDraft::new(quantity, unit))
        .await
        .map_err(SubmitFailure::from)
}

pub async fn register_product(
    state: &AppState,
    barcode: &str,
    name: &str,
    brand: &str,
) -> Result<ProductRecord, String> {
    let input = ProductInput {
        barcode: barcode.to_string(),
        name: name.to_string(),
        brand: brand.to_string(),
    };
    state
        .scanner
        .register_product(&input)
        .await
        .map_err(|e| e.to_string())
}

pub async fn search_products(state: &AppState, query: &str) -> Result<Vec<ProductRecord>, String> {
    state
        .scanner
        .catalog()
        .search(query)
        .await
        .map_err(|e| e.to_string())
}

pub async fn products_by_letter(
    state: &AppState,
    letter: &str,
) -> Result<Vec<ProductRecord>, String> {
    let filter: LetterFilter = letter.parse().map_err(|e: anyhow::Error| e.to_string())?;
    state
        .scanner
        .catalog()
        .by_letter(filter)
        .await
        .map_err(|e| e.to_string())
}

pub async fn entry_history(state: &AppState, limit: u32) -> Result<Vec<InventoryEntry>, String> {
    state
        .db
        .recent_entries(limit)
        .await
        .map_err(|e| e.to_string())
}

pub async fn stock_totals(state: &AppState) -> Result<Vec<StockTotal>, String> {
    state.db.stock_totals().await.map_err(|e| e.to_string())
}

pub async fn export_entries(state: &AppState, path: &Path) -> Result<usize, String> {
    let entries = state.db.all_entries().await.map_err(|e| e.to_string())?;
    export::export_to_path(&entries, path).map_err(|e| format!("{e:#}"))
}

/// Persist the vision fallback switch. The decoder chain is built at
/// startup, so the change applies from the next run.
pub fn set_vision_enabled(state: &AppState, enabled: bool) -> Result<(), String> {
    let mut vision = state.settings.vision();
    vision.enabled = enabled;
    state
        .settings
        .update_vision(vision)
        .map_err(|e| e.to_string())
}

pub fn set_default_unit(state: &AppState, unit: &str) -> Result<Unit, String> {
    let unit: Unit = unit.parse().map_err(|e: anyhow::Error| e.to_string())?;
    state
        .settings
        .update_default_unit(unit)
        .map_err(|e| e.to_string())?;
    Ok(unit)
}
