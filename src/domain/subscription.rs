use super::policy::{CustomerId, PolicyId, PolicyProduct, PremiumFrequency};
use super::schedule::{add_term, next_due_date};
use crate::error::{BillingError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type SubscriptionId = u64;

/// Lifecycle of a customer's binding to a policy.
///
/// ```text
/// PENDING ──> ACTIVE ──> LAPSED
///    │          │  ^
///    │          v  │ (administrative reactivation)
///    └──────> CANCELLED
/// ```
///
/// LAPSED has no outgoing edge here; renewal is the only way out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Lapsed,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn can_transition_to(&self, target: Self) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, target),
            (Pending, Active)
                | (Pending, Cancelled)
                | (Active, Lapsed)
                | (Active, Cancelled)
                | (Cancelled, Active)
        )
    }

    pub fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Pending => vec![Active, Cancelled],
            Active => vec![Lapsed, Cancelled],
            Lapsed => vec![],
            Cancelled => vec![Active],
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Lapsed => "LAPSED",
            Self::Cancelled => "CANCELLED",
        })
    }
}

/// A customer's subscription to one policy product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub customer_id: CustomerId,
    pub policy_id: PolicyId,
    pub start_date: NaiveDate,
    /// Always `start_date` plus the policy term, extended by one term per renewal.
    pub end_date: NaiveDate,
    pub status: SubscriptionStatus,
    pub next_premium_due: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// A freshly purchased subscription, PENDING until its first settled payment.
    pub fn purchase(
        id: SubscriptionId,
        customer_id: CustomerId,
        policy: &PolicyProduct,
        start_date: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(Self {
            id,
            customer_id,
            policy_id: policy.id,
            start_date,
            end_date: add_term(start_date, policy.term_years)?,
            status: SubscriptionStatus::Pending,
            next_premium_due: Some(next_due_date(start_date, policy.premium_frequency)?),
            created_at,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    pub fn is_pending(&self) -> bool {
        self.status == SubscriptionStatus::Pending
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.end_date < today
    }

    pub fn is_premium_due(&self, today: NaiveDate) -> bool {
        self.next_premium_due.is_some_and(|due| due <= today)
    }

    /// Confirms a PENDING subscription. Returns whether anything changed.
    pub fn activate_if_pending(&mut self) -> bool {
        if self.is_pending() {
            self.status = SubscriptionStatus::Active;
            true
        } else {
            false
        }
    }

    /// Moves the next premium due date one billing interval forward.
    ///
    /// Without an established schedule the interval is counted from `today`.
    /// Returns the new due date.
    pub fn advance_schedule(&mut self, frequency: PremiumFrequency, today: NaiveDate) -> Result<NaiveDate> {
        let from = self.next_premium_due.unwrap_or(today);
        let next = next_due_date(from, frequency)?;
        self.next_premium_due = Some(next);
        Ok(next)
    }

    pub fn cancel(&mut self) -> Result<()> {
        match self.status {
            SubscriptionStatus::Cancelled => Err(BillingError::AlreadyCancelled(self.id)),
            SubscriptionStatus::Lapsed => Err(BillingError::CannotCancelLapsed(self.id)),
            SubscriptionStatus::Pending | SubscriptionStatus::Active => {
                self.status = SubscriptionStatus::Cancelled;
                Ok(())
            }
        }
    }

    /// Extends the subscription by one policy term and puts it back in force.
    ///
    /// The premium schedule restarts one interval after `today`, but never
    /// earlier than a due date already on record.
    pub fn renew(&mut self, policy: &PolicyProduct, today: NaiveDate) -> Result<()> {
        if self.status == SubscriptionStatus::Cancelled {
            return Err(BillingError::CannotRenewCancelled(self.id));
        }
        let end_date = add_term(self.end_date, policy.term_years)?;
        let restarted = next_due_date(today, policy.premium_frequency)?;
        self.end_date = end_date;
        self.next_premium_due = Some(match self.next_premium_due {
            Some(current) if current > restarted => current,
            _ => restarted,
        });
        self.status = SubscriptionStatus::Active;
        Ok(())
    }

    /// Lapses an ACTIVE subscription once its customer has `threshold` or more
    /// overdue payments. Returns whether the subscription lapsed.
    pub fn lapse_if_threshold_breached(&mut self, overdue_count: usize, threshold: usize) -> bool {
        if self.is_active() && overdue_count >= threshold {
            self.status = SubscriptionStatus::Lapsed;
            true
        } else {
            false
        }
    }

    /// Administrative status edit, checked against the transition table.
    /// Requesting the current status is accepted and changes nothing.
    pub fn update_status(&mut self, requested: SubscriptionStatus) -> Result<()> {
        if requested == self.status {
            return Ok(());
        }
        if !self.status.can_transition_to(requested) {
            return Err(BillingError::InvalidStatusTransition {
                from: self.status,
                to: requested,
            });
        }
        self.status = requested;
        Ok(())
    }

    /// Administrative due date edit. The date may only move forward.
    pub fn reschedule(&mut self, requested: NaiveDate) -> Result<()> {
        if let Some(current) = self.next_premium_due
            && requested < current
        {
            return Err(BillingError::DueDateRegression { requested, current });
        }
        self.next_premium_due = Some(requested);
        Ok(())
    }
}
