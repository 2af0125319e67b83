use super::engine::BillingEngine;
use crate::domain::notice::OverdueNotice;
use crate::domain::payment::{LateFeePolicy, Payment, PaymentId};
use crate::domain::ports::Changeset;
use crate::domain::subscription::SubscriptionId;
use crate::error::{BillingError, Result};
use chrono::NaiveDate;
use tracing::{error, info, warn};

/// A record the sweep could not process.
#[derive(Debug)]
pub struct SweepFailure {
    pub payment_id: PaymentId,
    pub error: BillingError,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub run_date: NaiveDate,
    /// Fee-eligible payments with their late fee applied, in id order.
    pub processed: Vec<Payment>,
    pub notices: Vec<OverdueNotice>,
    pub lapsed: Vec<SubscriptionId>,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct SweptRecord {
    payment: Payment,
    lapsed: Option<SubscriptionId>,
}

impl BillingEngine {
    /// Runs one reconciliation pass over the fee-eligible overdue payments.
    ///
    /// Each payment is handled under its subscription's row lock and
    /// committed on its own: the late fee is applied, and an ACTIVE
    /// subscription whose customer now carries too many overdue payments is
    /// lapsed in the same commit. A record that fails is logged and reported,
    /// the rest still run. Only a failure to fetch the overdue set aborts the
    /// pass.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let today = self.today();
        let eligible = self.fee_eligible_overdue_payments().await.inspect_err(|e| {
            error!(error = %e, %today, "Failed to fetch overdue payments");
        })?;
        info!(%today, count = eligible.len(), "Starting billing reconciliation sweep");

        let terms = self.config.late_fee_policy();
        let mut report = SweepReport {
            run_date: today,
            ..Default::default()
        };

        for candidate in eligible {
            match self.sweep_payment(candidate.id, candidate.subscription_id, &terms, today).await {
                Ok(Some(record)) => {
                    report.lapsed.extend(record.lapsed);
                    report.processed.push(record.payment);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(payment_id = candidate.id, error = %e, "Skipping payment in sweep");
                    report.failures.push(SweepFailure {
                        payment_id: candidate.id,
                        error: e,
                    });
                }
            }
        }

        for payment in &report.processed {
            match self.overdue_notice(payment, today).await {
                Ok(notice) => report.notices.push(notice),
                Err(e) => {
                    warn!(payment_id = payment.id, error = %e, "Could not build overdue notice");
                }
            }
        }

        info!(
            processed = report.processed.len(),
            lapsed = report.lapsed.len(),
            failed = report.failures.len(),
            "Sweep finished"
        );
        Ok(report)
    }

    async fn sweep_payment(
        &self,
        payment_id: PaymentId,
        subscription_id: SubscriptionId,
        terms: &LateFeePolicy,
        today: NaiveDate,
    ) -> Result<Option<SweptRecord>> {
        let _row = self.store.lock_subscription(subscription_id).await?;

        // Paid or failed between the fetch and the lock.
        let mut payment = self.load_payment(payment_id).await?;
        if !payment.is_pending() {
            return Ok(None);
        }
        payment.apply_late_fee(terms, today, self.now());

        let mut changes = Changeset::new();
        let mut lapsed = None;
        let mut subscription = self.load_subscription(subscription_id).await?;
        if subscription.is_active() {
            let overdue = self
                .count_overdue_for_customer(subscription.customer_id, today)
                .await?;
            if subscription.lapse_if_threshold_breached(overdue, self.config.lapse_threshold) {
                warn!(
                    subscription_id,
                    customer_id = subscription.customer_id,
                    overdue,
                    "Subscription lapsed for unpaid premiums"
                );
                lapsed = Some(subscription_id);
                changes = changes.with_subscription(subscription);
            }
        }

        self.store.commit(changes.with_payment(payment.clone())).await?;
        Ok(Some(SweptRecord { payment, lapsed }))
    }

    async fn overdue_notice(&self, payment: &Payment, today: NaiveDate) -> Result<OverdueNotice> {
        let subscription = self.load_subscription(payment.subscription_id).await?;
        let customer = self.load_customer(subscription.customer_id).await?;
        let policy = self.load_policy(subscription.policy_id).await?;
        Ok(OverdueNotice::new(payment, &customer, &policy, today))
    }
}
