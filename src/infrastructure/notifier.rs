use crate::domain::notice::OverdueNotice;
use crate::domain::ports::Notifier;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Writes each reminder to the log instead of sending it anywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_overdue(&self, notices: &[OverdueNotice]) -> Result<()> {
        info!(count = notices.len(), "Sending overdue payment notifications");
        for notice in notices {
            info!(
                customer = %notice.customer_name,
                email = %notice.customer_email,
                payment_id = notice.payment_id,
                days_overdue = notice.days_overdue,
                message = %notice.render(),
                "Overdue payment notification"
            );
        }
        Ok(())
    }
}

/// Keeps every notice it is handed. Clones share the same inbox.
#[derive(Debug, Default, Clone)]
pub struct MemoryNotifier {
    sent: Arc<Mutex<Vec<OverdueNotice>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<OverdueNotice> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify_overdue(&self, notices: &[OverdueNotice]) -> Result<()> {
        self.sent.lock().await.extend_from_slice(notices);
        Ok(())
    }
}
