use std::sync::Arc;

use bilbot_core::{ReceiptContext, ReceiptId, ReceiptStore, StampedReceipt, ValidatedRecord};
use tracing::{error, info};

use crate::rejection::{Rejection, RejectionKind};

/// Stamps validated records with their context and hands them to the store.
pub struct RecordEmitter {
    store: Arc<dyn ReceiptStore>,
}

impl RecordEmitter {
    pub fn new(store: Arc<dyn ReceiptStore>) -> Self {
        Self { store }
    }

    /// Persist one record. A store failure becomes a `StoreFailed` rejection;
    /// nothing is retried.
    pub async fn emit(&self, record: ValidatedRecord, context: ReceiptContext) -> Result<(ReceiptId, ValidatedRecord), Rejection> {
        let stamped = StampedReceipt { context, record };
        match self.store.store(&stamped).await {
            Ok(id) => {
                info!(
                    receipt_id = id,
                    identity = %stamped.context.identity,
                    group = %stamped.context.group,
                    "Receipt stored"
                );
                Ok((id, stamped.record))
            }
            Err(e) => {
                error!(identity = %stamped.context.identity, error = %e, "Failed to store receipt");
                Err(Rejection::new(RejectionKind::StoreFailed, format!("{e:#}")))
            }
        }
    }
}
