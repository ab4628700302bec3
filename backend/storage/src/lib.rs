//! Persistence for accepted receipts: SQLite rows plus image files on disk.

pub mod images;
pub mod store;

pub use images::ImageStore;
pub use store::{ReceiptSummary, SqliteReceiptStore};
