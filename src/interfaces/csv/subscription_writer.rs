use crate::application::BillingEngine;
use crate::domain::money::Money;
use crate::domain::policy::{CustomerId, PolicyId};
use crate::domain::subscription::{Subscription, SubscriptionId, SubscriptionStatus};
use crate::error::Result;
use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use std::io::Write;

fn as_cents<S: Serializer>(value: &Money, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Final state of one subscription, with the PENDING balance it carries.
#[derive(Debug, Serialize, PartialEq)]
pub struct SubscriptionRow {
    pub subscription: SubscriptionId,
    pub customer: CustomerId,
    pub policy: PolicyId,
    pub status: SubscriptionStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub next_premium_due: Option<NaiveDate>,
    pub pending_payments: usize,
    #[serde(serialize_with = "as_cents")]
    pub outstanding: Money,
}

impl SubscriptionRow {
    pub async fn collect(engine: &BillingEngine) -> Result<Vec<Self>> {
        let mut rows = Vec::new();
        for subscription in engine.all_subscriptions().await? {
            let pending: Vec<_> = engine
                .payment_history(subscription.id)
                .await?
                .into_iter()
                .filter(|p| p.is_pending())
                .collect();
            let outstanding = pending
                .iter()
                .fold(Money::ZERO, |total, p| total + p.total_amount());
            rows.push(Self::new(&subscription, pending.len(), outstanding));
        }
        Ok(rows)
    }

    fn new(subscription: &Subscription, pending_payments: usize, outstanding: Money) -> Self {
        Self {
            subscription: subscription.id,
            customer: subscription.customer_id,
            policy: subscription.policy_id,
            status: subscription.status,
            start_date: subscription.start_date,
            end_date: subscription.end_date,
            next_premium_due: subscription.next_premium_due,
            pending_payments,
            outstanding,
        }
    }
}

/// Writes subscription state to a CSV sink.
pub struct SubscriptionWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> SubscriptionWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_subscriptions(&mut self, rows: impl IntoIterator<Item = SubscriptionRow>) -> Result<()> {
        for row in rows {
            self.writer.serialize(row)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
