use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-supplier mutual exclusion for dispatch, sync and catalog webhooks
#[derive(Clone, Default)]
pub struct SupplierLocks {
    inner: Arc<DashMap<i64, Arc<Mutex<()>>>>,
}

impl SupplierLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, supplier_id: i64) -> OwnedMutexGuard<()> {
        let lock = self.inner.entry(supplier_id).or_default().clone();
        lock.lock_owned().await
    }
}
