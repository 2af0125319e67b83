use super::engine::BillingEngine;
use super::sweep::SweepReport;
use crate::domain::ports::NotifierBox;
use crate::error::Result;
use chrono::{DateTime, NaiveTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Fires the reconciliation sweep once a day at a fixed UTC time.
///
/// Runs execute inline on the scheduler's own loop, so a slow sweep pushes
/// the next one back instead of overlapping it.
pub struct SweepScheduler {
    engine: Arc<BillingEngine>,
    notifier: NotifierBox,
    run_at: NaiveTime,
}

/// Time left until the next `run_at` strictly after `now`.
pub fn duration_until(run_at: NaiveTime, now: DateTime<Utc>) -> Duration {
    let today = now.date_naive().and_time(run_at).and_utc();
    let next = if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    };
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

impl SweepScheduler {
    pub fn new(engine: Arc<BillingEngine>, notifier: NotifierBox) -> Self {
        let run_at = engine.config().sweep_time;
        Self {
            engine,
            notifier,
            run_at,
        }
    }

    pub fn with_run_at(mut self, run_at: NaiveTime) -> Self {
        self.run_at = run_at;
        self
    }

    /// Runs one sweep and forwards its notices.
    ///
    /// A notifier failure is logged and does not fail the run; the fees and
    /// lapses are already committed.
    pub async fn run_once(&self) -> Result<SweepReport> {
        let report = self.engine.sweep().await.inspect_err(|e| {
            error!(error = %e, "Sweep aborted");
        })?;
        if !report.notices.is_empty()
            && let Err(e) = self.notifier.notify_overdue(&report.notices).await
        {
            warn!(error = %e, count = report.notices.len(), "Failed to deliver overdue notices");
        }
        Ok(report)
    }

    /// Sleeps until each day's `run_at`, sweeping each time, until `shutdown`
    /// resolves.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(run_at = %self.run_at, "Sweep scheduler started");
        loop {
            let wait = duration_until(self.run_at, Utc::now());
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Sweep scheduler stopping");
                    break;
                }
                _ = tokio::time::sleep(wait) => {
                    // An aborted run was already reported; try again tomorrow.
                    let _ = self.run_once().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::PaymentRequest;
    use crate::config::BillingConfig;
    use crate::domain::money::Amount;
    use crate::domain::ports::Clock;
    use crate::domain::policy::{Customer, PolicyProduct, PolicyType, PremiumFrequency};
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::in_memory::{InMemoryBillingStore, InMemoryCatalog};
    use crate::infrastructure::notifier::MemoryNotifier;
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal_macros::dec;

    #[test]
    fn test_duration_until_later_today_and_tomorrow() {
        let run_at = NaiveTime::from_hms_opt(2, 0, 0).unwrap();

        let before = Utc.with_ymd_and_hms(2025, 3, 1, 1, 30, 0).unwrap();
        assert_eq!(duration_until(run_at, before), Duration::from_secs(30 * 60));

        let exactly = Utc.with_ymd_and_hms(2025, 3, 1, 2, 0, 0).unwrap();
        assert_eq!(duration_until(run_at, exactly), Duration::from_secs(24 * 3600));

        let after = Utc.with_ymd_and_hms(2025, 3, 1, 23, 0, 0).unwrap();
        assert_eq!(duration_until(run_at, after), Duration::from_secs(3 * 3600));
    }

    #[tokio::test]
    async fn test_run_once_hands_notices_to_notifier() {
        let catalog = InMemoryCatalog::new();
        catalog
            .add_policy(PolicyProduct {
                id: 1,
                policy_number: "TRV-2".to_string(),
                policy_type: PolicyType::Travel,
                description: None,
                coverage_amount: Amount::new(dec!(5000)).unwrap(),
                premium_amount: Amount::new(dec!(240)).unwrap(),
                term_years: 1,
                premium_frequency: PremiumFrequency::Monthly,
            })
            .await;
        catalog
            .add_customer(Customer {
                id: 1,
                name: "Kai".to_string(),
                email: "kai@example.com".to_string(),
            })
            .await;
        let clock = ManualClock::at(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        let engine = Arc::new(BillingEngine::new(
            Box::new(InMemoryBillingStore::new()),
            Box::new(catalog.clone()),
            Box::new(catalog),
            Box::new(clock.clone()),
            BillingConfig::default(),
        ));
        let sub = engine.purchase(1, 1, clock.today()).await.unwrap();
        engine
            .record_payment(PaymentRequest::premium(sub.id, sub.next_premium_due.unwrap()))
            .await
            .unwrap();

        let notifier = MemoryNotifier::new();
        let scheduler = SweepScheduler::new(engine, Box::new(notifier.clone()));

        clock.set_today(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        let report = scheduler.run_once().await.unwrap();
        assert_eq!(report.processed.len(), 1);

        let sent = notifier.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].customer_email, "kai@example.com");
    }

    #[tokio::test]
    async fn test_run_until_stops_on_shutdown() {
        let engine = Arc::new(BillingEngine::new(
            Box::new(InMemoryBillingStore::new()),
            Box::new(InMemoryCatalog::new()),
            Box::new(InMemoryCatalog::new()),
            Box::new(ManualClock::at(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())),
            BillingConfig::default(),
        ));
        let scheduler = SweepScheduler::new(engine, Box::new(MemoryNotifier::new()))
            .with_run_at(NaiveTime::from_hms_opt(23, 59, 59).unwrap());
        tokio::time::timeout(Duration::from_secs(1), scheduler.run_until(async {}))
            .await
            .unwrap();
    }
}
