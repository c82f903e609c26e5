pub mod entry;
pub mod product;

pub use entry::{EntryDraft, InventoryEntry, StockTotal, Unit};
pub use product::{ProductInput, ProductRecord, StoredProduct};
