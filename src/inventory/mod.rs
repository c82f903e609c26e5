//! The append-only inventory log: the collaborator trait, form validation and
//! entry construction.

pub mod export;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::db::{EntryDraft, InventoryEntry, ProductRecord};
use crate::error::ScanError;

#[async_trait]
pub trait EntryLog: Send + Sync {
    /// Durably append one entry. Nothing is written when this fails.
    async fn append(&self, entry: &InventoryEntry) -> Result<()>;
}

pub fn validate_draft(draft: &EntryDraft) -> Result<(), ScanError> {
    if !draft.quantity.is_finite() {
        return Err(ScanError::validation("quantity must be a number"));
    }
    if draft.quantity <= 0.0 {
        return Err(ScanError::validation("quantity must be greater than zero"));
    }
    Ok(())
}

pub fn new_entry(product: &ProductRecord, draft: EntryDraft) -> InventoryEntry {
    InventoryEntry {
        id: format!("entry_{}", Uuid::new_v4()),
        barcode: product.barcode.clone(),
        product_name: product.name.clone(),
        brand: product.brand.clone(),
        quantity: draft.quantity,
        unit: draft.unit,
        recorded_at: Utc::now(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Unit;

    #[test]
    fn rejects_non_positive_and_non_finite_quantities() {
        for quantity in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = validate_draft(&EntryDraft::new(quantity, Unit::Piece)).unwrap_err();
            assert!(matches!(err, ScanError::Validation(_)), "{quantity}");
        }
        assert!(validate_draft(&EntryDraft::new(1.5, Unit::Kilogram)).is_ok());
    }

    #[test]
    fn entry_copies_product_and_draft() {
        let product = ProductRecord::new("8935049502142", "Hao Hao noodles", "Acecook");
        let entry = new_entry(&product, EntryDraft::new(1.5, Unit::Kilogram));
        assert!(entry.id.starts_with("entry_"));
        assert_eq!(entry.barcode, "8935049502142");
        assert_eq!(entry.product_name, "Hao Hao noodles");
        assert_eq!(entry.quantity, 1.5);
        assert_eq!(entry.unit, Unit::Kilogram);
    }
}
