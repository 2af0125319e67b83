use super::money::{Amount, Money, round_half_up};
use super::subscription::SubscriptionId;
use crate::error::{BillingError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type PaymentId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "PENDING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    #[default]
    Premium,
    ClaimSettlement,
    Refund,
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Premium => "PREMIUM",
            Self::ClaimSettlement => "CLAIM_SETTLEMENT",
            Self::Refund => "REFUND",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[default]
    CreditCard,
    DebitCard,
    BankTransfer,
    Upi,
    Wallet,
}

/// Late fee terms: a percentage of the original amount, capped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LateFeePolicy {
    pub rate: Decimal,
    pub cap: Money,
}

impl Default for LateFeePolicy {
    fn default() -> Self {
        Self {
            rate: dec!(0.05),
            cap: Money::new(dec!(1000.00)),
        }
    }
}

impl LateFeePolicy {
    /// Fee owed on `amount`, rounded half-up to cents and clamped to the cap.
    pub fn fee_for(&self, amount: Amount) -> Money {
        let fee = Money::new(round_half_up(amount.value() * self.rate, 2));
        fee.min(self.cap)
    }
}

/// Opaque reference handed out when a payment is recorded without one.
pub fn generate_transaction_ref() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("TXN_{}", hex[..12].to_uppercase())
}

/// A premium obligation or a receipt (claim settlement, refund) tied to a
/// subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub subscription_id: SubscriptionId,
    pub amount: Amount,
    pub due_date: NaiveDate,
    pub status: PaymentStatus,
    pub payment_type: PaymentType,
    pub payment_method: PaymentMethod,
    pub transaction_ref: Option<String>,
    #[serde(default)]
    pub late_fee_amount: Money,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_pending(&self) -> bool {
        self.status == PaymentStatus::Pending
    }

    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Success
    }

    /// PENDING and due strictly before `today`.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.is_pending() && self.due_date < today
    }

    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        if self.is_overdue(today) {
            (today - self.due_date).num_days()
        } else {
            0
        }
    }

    pub fn total_amount(&self) -> Money {
        Money::from(self.amount) + self.late_fee_amount
    }

    /// Recomputes the late fee from the original amount.
    ///
    /// Returns `false` and leaves the record untouched unless it is PENDING
    /// and overdue as of `today`. Repeated calls settle on the same fee.
    pub fn apply_late_fee(&mut self, terms: &LateFeePolicy, today: NaiveDate, now: DateTime<Utc>) -> bool {
        if !self.is_overdue(today) {
            return false;
        }
        self.late_fee_amount = terms.fee_for(self.amount);
        self.updated_at = now;
        true
    }

    fn ensure_pending(&self) -> Result<()> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(BillingError::PaymentNotPending {
                payment: self.id,
                status: self.status,
            })
        }
    }

    /// PENDING -> SUCCESS, optionally replacing the transaction reference.
    pub fn mark_success(&mut self, transaction_ref: Option<String>, now: DateTime<Utc>) -> Result<()> {
        self.ensure_pending()?;
        if let Some(reference) = transaction_ref {
            self.transaction_ref = Some(reference);
        }
        self.status = PaymentStatus::Success;
        self.updated_at = now;
        Ok(())
    }

    /// PENDING -> FAILED. A supplied note replaces the existing one.
    pub fn mark_failed(&mut self, note: Option<String>, now: DateTime<Utc>) -> Result<()> {
        self.ensure_pending()?;
        if note.is_some() {
            self.note = note;
        }
        self.status = PaymentStatus::Failed;
        self.updated_at = now;
        Ok(())
    }
}
