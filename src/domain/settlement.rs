//! What happens to a subscription when one of its payments settles.
//!
//! Both payment intake (a payment arriving with a transaction reference) and
//! an explicit mark-paid go through [`settle`], so the two paths cannot drift.

use super::payment::Payment;
use super::policy::PolicyProduct;
use super::subscription::Subscription;
use crate::error::Result;
use chrono::{DateTime, NaiveDate, Utc};

/// Changes made to the subscription by a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementEffect {
    pub previous_due: Option<NaiveDate>,
    pub next_due: NaiveDate,
    pub activated: bool,
}

/// Marks `payment` SUCCESS, advances the subscription's schedule by one
/// interval and activates it if it was PENDING. Applies to every payment type.
///
/// Fails without touching either record when the payment is not PENDING or
/// the next due date is out of range.
pub fn settle(
    payment: &mut Payment,
    subscription: &mut Subscription,
    policy: &PolicyProduct,
    transaction_ref: Option<String>,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<SettlementEffect> {
    let previous_due = subscription.next_premium_due;
    let mut advanced = subscription.clone();
    let next_due = advanced.advance_schedule(policy.premium_frequency, today)?;
    payment.mark_success(transaction_ref, now)?;
    let activated = advanced.activate_if_pending();
    *subscription = advanced;
    Ok(SettlementEffect {
        previous_due,
        next_due,
        activated,
    })
}
