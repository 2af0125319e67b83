//! Premium schedule arithmetic.
//!
//! Pure functions over a policy product: how much each installment costs and
//! when the next one falls due. Month arithmetic clamps to the last day of the
//! target month, so a premium due on Jan 31 is next due on Feb 28 (or 29).

use super::money::{Money, round_half_up};
use super::policy::{PolicyProduct, PremiumFrequency};
use crate::error::{BillingError, Result};
use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;

/// Annual premium divided by the number of installments per year, rounded
/// half-up to cents.
pub fn installment_amount(policy: &PolicyProduct) -> Money {
    let per_year = Decimal::from(policy.premium_frequency.payments_per_year());
    Money::new(round_half_up(policy.premium_amount.value() / per_year, 2))
}

/// The installment after `from`, one billing interval later.
pub fn next_due_date(from: NaiveDate, frequency: PremiumFrequency) -> Result<NaiveDate> {
    from.checked_add_months(Months::new(frequency.months_between_payments()))
        .ok_or_else(|| {
            BillingError::ValidationError(format!(
                "Next {frequency:?} due date after {from} is out of range"
            ))
        })
}

/// `start` plus a whole number of policy years.
pub fn add_term(start: NaiveDate, term_years: u32) -> Result<NaiveDate> {
    term_years
        .checked_mul(12)
        .and_then(|months| start.checked_add_months(Months::new(months)))
        .ok_or_else(|| {
            BillingError::ValidationError(format!(
                "Term of {term_years} years from {start} is out of range"
            ))
        })
}
