use crate::domain::money::Amount;
use crate::domain::payment::{PaymentId, PaymentMethod, PaymentType};
use crate::domain::policy::{CustomerId, PolicyId};
use crate::domain::subscription::{SubscriptionId, SubscriptionStatus};
use crate::error::{BillingError, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    Purchase,
    Pay,
    MarkPaid,
    MarkFailed,
    Cancel,
    Renew,
    SetStatus,
    Sweep,
}

/// One business command, stamped with the date it happens on.
///
/// Which of the optional columns a command needs depends on its type; see
/// [`Command::require`].
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Command {
    pub r#type: CommandType,
    pub date: NaiveDate,
    pub customer: Option<CustomerId>,
    pub policy: Option<PolicyId>,
    pub subscription: Option<SubscriptionId>,
    pub payment: Option<PaymentId>,
    pub amount: Option<Amount>,
    pub due: Option<NaiveDate>,
    pub reference: Option<String>,
    pub status: Option<SubscriptionStatus>,
    pub payment_type: Option<PaymentType>,
    pub method: Option<PaymentMethod>,
    pub note: Option<String>,
}

impl Command {
    /// Unwraps a column the command cannot run without.
    pub fn require<T: Copy>(&self, value: Option<T>, column: &str) -> Result<T> {
        value.ok_or_else(|| {
            BillingError::ValidationError(format!(
                "{:?} command on {} is missing column '{column}'",
                self.r#type, self.date
            ))
        })
    }
}

/// Reads replay commands from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record lengths,
/// so trailing optional columns can be left off.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes commands; a malformed row yields an error without
    /// ending the stream.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(BillingError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const HEADER: &str = "type, date, customer, policy, subscription, payment, amount, due, reference, status, payment_type, method, note";

    #[test]
    fn test_reader_valid_stream() {
        let data = format!(
            "{HEADER}\n\
             purchase, 2025-01-01, 1, 2, , , , , , , , ,\n\
             pay, 2025-01-05, , , 1, , 250.50, 2026-01-01, BANK-1, , PREMIUM, UPI, first\n\
             set_status, 2025-02-01, , , 1, , , , , CANCELLED, , ,"
        );
        let commands: Vec<_> = CommandReader::new(data.as_bytes())
            .commands()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0].r#type, CommandType::Purchase);
        assert_eq!(commands[0].customer, Some(1));
        assert_eq!(commands[0].reference, None);

        let pay = &commands[1];
        assert_eq!(pay.amount.unwrap().value(), dec!(250.50));
        assert_eq!(pay.due, NaiveDate::from_ymd_opt(2026, 1, 1));
        assert_eq!(pay.method, Some(PaymentMethod::Upi));
        assert_eq!(pay.note.as_deref(), Some("first"));

        assert_eq!(commands[2].status, Some(SubscriptionStatus::Cancelled));
    }

    #[test]
    fn test_short_rows_leave_trailing_columns_empty() {
        let data = format!("{HEADER}\nsweep, 2025-03-01");
        let command = CommandReader::new(data.as_bytes())
            .commands()
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(command.r#type, CommandType::Sweep);
        assert!(command.subscription.is_none());
        assert!(command.require(command.subscription, "subscription").is_err());
    }

    #[test]
    fn test_reader_malformed_lines() {
        let data = format!(
            "{HEADER}\n\
             refund, 2025-01-01\n\
             pay, not-a-date\n\
             pay, 2025-01-01, , , 1, , -3"
        );
        let results: Vec<_> = CommandReader::new(data.as_bytes()).commands().collect();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.is_err()));
    }
}
