use crate::domain::ports::RowGuard;
use crate::domain::subscription::SubscriptionId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One mutex per subscription row, created on first use.
///
/// Shared by the store adapters to give the engine per-row mutual exclusion:
/// callers locking the same id queue up, callers on different ids never wait
/// on each other.
#[derive(Default, Clone)]
pub struct RowLocks {
    rows: Arc<DashMap<SubscriptionId, Arc<Mutex<()>>>>,
}

impl RowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: SubscriptionId) -> RowGuard {
        let row = self.rows.entry(id).or_default().clone();
        row.lock_owned().await
    }
}
