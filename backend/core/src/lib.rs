pub mod error;
pub mod event;
pub mod model;
pub mod receipt;
pub mod traits;
pub mod types;

pub use error::BilboError;
pub use event::ReceiptEvent;
pub use model::{ModelFailureKind, ModelOutcome, RawModelResponse};
pub use receipt::{
    LineItem, ReceiptContext, StampedReceipt, TotalSource, ValidatedRecord,
    PURCHASE_TIMESTAMP_FORMAT,
};
pub use traits::{ReceiptStore, VisionModel};
pub use types::{ChatInfo, ChatKind, GroupId, Identity, ImagePayload, ReceiptId, SenderInfo};
