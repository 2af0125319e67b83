use super::command_reader::{Command, CommandReader, CommandType};
use crate::application::{BillingEngine, PaymentRequest, SubscriptionUpdate};
use crate::domain::ports::{Clock, NotifierBox};
use crate::error::{BillingError, Result};
use crate::infrastructure::clock::ManualClock;
use std::io::Read;
use tracing::warn;

/// Counts of what happened during a replay.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    pub rejected: usize,
    pub malformed: usize,
}

/// Feeds recorded business commands through a [`BillingEngine`].
///
/// The engine must have been built over `clock`: each command moves the
/// clock to its own date before it runs.
pub struct Replay<'a> {
    engine: &'a BillingEngine,
    clock: ManualClock,
    notifier: NotifierBox,
}

impl<'a> Replay<'a> {
    pub fn new(engine: &'a BillingEngine, clock: ManualClock, notifier: NotifierBox) -> Self {
        Self {
            engine,
            clock,
            notifier,
        }
    }

    pub async fn run<R: Read>(&self, reader: CommandReader<R>) -> ReplaySummary {
        let mut summary = ReplaySummary::default();
        for (row, command) in reader.commands().enumerate() {
            let command = match command {
                Ok(command) => command,
                Err(e) => {
                    warn!(row = row + 1, error = %e, "Error reading command");
                    summary.malformed += 1;
                    continue;
                }
            };
            match self.apply(&command).await {
                Ok(()) => summary.applied += 1,
                Err(e) => {
                    warn!(
                        row = row + 1,
                        command = ?command.r#type,
                        date = %command.date,
                        kind = ?e.kind(),
                        error = %e,
                        "Command rejected"
                    );
                    summary.rejected += 1;
                }
            }
        }
        summary
    }

    pub async fn apply(&self, command: &Command) -> Result<()> {
        if command.date < self.clock.today() {
            return Err(BillingError::ValidationError(format!(
                "Command date {} is earlier than replay date {}",
                command.date,
                self.clock.today()
            )));
        }
        self.clock.set_today(command.date);

        match command.r#type {
            CommandType::Purchase => {
                let customer = command.require(command.customer, "customer")?;
                let policy = command.require(command.policy, "policy")?;
                self.engine.purchase(customer, policy, command.date).await?;
            }
            CommandType::Pay => {
                let subscription = command.require(command.subscription, "subscription")?;
                let request = self.payment_request(command, subscription).await?;
                self.engine.record_payment(request).await?;
            }
            CommandType::MarkPaid => {
                let payment = command.require(command.payment, "payment")?;
                self.engine
                    .mark_paid(payment, command.reference.clone())
                    .await?;
            }
            CommandType::MarkFailed => {
                let payment = command.require(command.payment, "payment")?;
                self.engine.mark_failed(payment, command.note.clone()).await?;
            }
            CommandType::Cancel => {
                let subscription = command.require(command.subscription, "subscription")?;
                self.engine.cancel(subscription).await?;
            }
            CommandType::Renew => {
                let subscription = command.require(command.subscription, "subscription")?;
                self.engine.renew(subscription).await?;
            }
            CommandType::SetStatus => {
                let subscription = command.require(command.subscription, "subscription")?;
                let update = SubscriptionUpdate {
                    status: command.status,
                    next_premium_due: command.due,
                };
                self.engine.update_subscription(subscription, update).await?;
            }
            CommandType::Sweep => {
                let report = self.engine.sweep().await?;
                if !report.notices.is_empty() {
                    self.notifier.notify_overdue(&report.notices).await?;
                }
            }
        }
        Ok(())
    }

    /// A premium without a `due` column is for the subscription's current due
    /// date.
    async fn payment_request(&self, command: &Command, subscription: u64) -> Result<PaymentRequest> {
        let payment_type = command.payment_type.unwrap_or_default();
        let due = match command.due {
            Some(due) => due,
            None => self
                .engine
                .get_subscription(subscription)
                .await?
                .next_premium_due
                .ok_or(BillingError::NoScheduleSet { subscription })?,
        };

        let mut request = PaymentRequest::premium(subscription, due)
            .with_type(payment_type)
            .with_method(command.method.unwrap_or_default());
        request.amount = command.amount;
        request.transaction_ref = command.reference.clone();
        request.note = command.note.clone();
        Ok(request)
    }
}
