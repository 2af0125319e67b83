use super::engine::BillingEngine;
use crate::domain::money::Amount;
use crate::domain::payment::{
    Payment, PaymentId, PaymentMethod, PaymentStatus, PaymentType, generate_transaction_ref,
};
use crate::domain::policy::CustomerId;
use crate::domain::ports::Changeset;
use crate::domain::schedule::installment_amount;
use crate::domain::settlement::settle;
use crate::domain::subscription::SubscriptionId;
use crate::error::{BillingError, Result};
use chrono::{Duration, NaiveDate};
use tracing::{info, warn};

/// A payment submission.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub subscription_id: SubscriptionId,
    /// Defaults to the policy installment for premiums.
    pub amount: Option<Amount>,
    pub due_date: NaiveDate,
    pub payment_type: PaymentType,
    pub payment_method: PaymentMethod,
    /// Present when the money has already been received.
    pub transaction_ref: Option<String>,
    pub note: Option<String>,
}

impl PaymentRequest {
    pub fn premium(subscription_id: SubscriptionId, due_date: NaiveDate) -> Self {
        Self {
            subscription_id,
            amount: None,
            due_date,
            payment_type: PaymentType::Premium,
            payment_method: PaymentMethod::default(),
            transaction_ref: None,
            note: None,
        }
    }

    pub fn with_amount(mut self, amount: Amount) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_transaction_ref(mut self, transaction_ref: impl Into<String>) -> Self {
        self.transaction_ref = Some(transaction_ref.into());
        self
    }

    pub fn with_type(mut self, payment_type: PaymentType) -> Self {
        self.payment_type = payment_type;
        self
    }

    pub fn with_method(mut self, payment_method: PaymentMethod) -> Self {
        self.payment_method = payment_method;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

fn supplied(reference: Option<String>) -> Option<String> {
    reference.filter(|r| !r.trim().is_empty())
}

fn newest_first(mut payments: Vec<Payment>) -> Vec<Payment> {
    payments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    payments
}

impl BillingEngine {
    async fn ensure_reference_unused(&self, reference: &str, owner: Option<PaymentId>) -> Result<()> {
        match self.store.find_by_transaction_ref(reference).await? {
            Some(existing) if Some(existing.id) != owner => {
                Err(BillingError::DuplicateTransactionRef(reference.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Records a payment against a subscription.
    ///
    /// Premiums must be for the subscription's current due date. A request
    /// carrying a transaction reference is settled on the spot, which advances
    /// the schedule and activates a PENDING subscription in the same commit.
    /// Without one the payment stays PENDING under a generated reference.
    pub async fn record_payment(&self, request: PaymentRequest) -> Result<Payment> {
        let subscription_id = request.subscription_id;
        info!(subscription_id, payment_type = %request.payment_type, "Processing payment");

        let _row = self.store.lock_subscription(subscription_id).await?;
        let mut subscription = self.load_subscription(subscription_id).await?;
        let policy = self.load_policy(subscription.policy_id).await?;

        if request.payment_type == PaymentType::Premium {
            let expected = subscription
                .next_premium_due
                .ok_or(BillingError::NoScheduleSet {
                    subscription: subscription_id,
                })?;
            if request.due_date != expected {
                return Err(BillingError::DueDateMismatch {
                    requested: request.due_date,
                    expected,
                });
            }
        }

        let amount = match (request.amount, request.payment_type) {
            (Some(amount), _) => amount,
            (None, PaymentType::Premium) => Amount::new(installment_amount(&policy).value())?,
            (None, other) => {
                return Err(BillingError::ValidationError(format!(
                    "Amount is required for {other} payments"
                )));
            }
        };

        let settled_with = supplied(request.transaction_ref);
        if let Some(reference) = &settled_with {
            self.ensure_reference_unused(reference, None).await?;
        }

        let now = self.now();
        let mut payment = Payment {
            id: self.store.next_payment_id().await?,
            subscription_id,
            amount,
            due_date: request.due_date,
            status: PaymentStatus::Pending,
            payment_type: request.payment_type,
            payment_method: request.payment_method,
            transaction_ref: Some(generate_transaction_ref()),
            late_fee_amount: Default::default(),
            note: request.note,
            created_at: now,
            updated_at: now,
        };

        let mut changes = Changeset::new();
        if settled_with.is_some() {
            let effect = settle(
                &mut payment,
                &mut subscription,
                &policy,
                settled_with,
                self.today(),
                now,
            )?;
            if effect.activated {
                info!(subscription_id, "Subscription activated by first payment");
            }
            changes = changes.with_subscription(subscription);
        }
        self.store.commit(changes.with_payment(payment.clone())).await?;

        info!(
            payment_id = payment.id,
            subscription_id,
            status = %payment.status,
            amount = %payment.amount,
            "Payment recorded"
        );
        Ok(payment)
    }

    /// Settles a PENDING payment, with the same effect on its subscription as
    /// a payment recorded with a transaction reference.
    pub async fn mark_paid(&self, payment_id: PaymentId, transaction_ref: Option<String>) -> Result<Payment> {
        let subscription_id = self.load_payment(payment_id).await?.subscription_id;
        let _row = self.store.lock_subscription(subscription_id).await?;

        let mut payment = self.load_payment(payment_id).await?;
        let mut subscription = self.load_subscription(subscription_id).await?;
        let policy = self.load_policy(subscription.policy_id).await?;

        let reference = supplied(transaction_ref);
        if let Some(reference) = &reference {
            self.ensure_reference_unused(reference, Some(payment_id)).await?;
        }

        let effect = settle(
            &mut payment,
            &mut subscription,
            &policy,
            reference,
            self.today(),
            self.now(),
        )?;
        self.store
            .commit(
                Changeset::new()
                    .with_subscription(subscription)
                    .with_payment(payment.clone()),
            )
            .await?;

        info!(
            payment_id,
            subscription_id,
            next_due = %effect.next_due,
            activated = effect.activated,
            "Payment marked as paid"
        );
        Ok(payment)
    }

    /// Records that a PENDING payment will not be collected.
    pub async fn mark_failed(&self, payment_id: PaymentId, note: Option<String>) -> Result<Payment> {
        let subscription_id = self.load_payment(payment_id).await?.subscription_id;
        let _row = self.store.lock_subscription(subscription_id).await?;

        let mut payment = self.load_payment(payment_id).await?;
        payment.mark_failed(note, self.now())?;
        self.store
            .commit(Changeset::new().with_payment(payment.clone()))
            .await?;
        warn!(payment_id, subscription_id, "Payment marked as failed");
        Ok(payment)
    }

    /// Charges the late fee on a PENDING, overdue payment. Anything else is
    /// returned unchanged.
    pub async fn apply_late_fee(&self, payment_id: PaymentId) -> Result<Payment> {
        let subscription_id = self.load_payment(payment_id).await?.subscription_id;
        let _row = self.store.lock_subscription(subscription_id).await?;

        let mut payment = self.load_payment(payment_id).await?;
        let terms = self.config.late_fee_policy();
        if !payment.apply_late_fee(&terms, self.today(), self.now()) {
            warn!(payment_id, status = %payment.status, "Payment not overdue, no late fee applied");
            return Ok(payment);
        }
        self.store
            .commit(Changeset::new().with_payment(payment.clone()))
            .await?;
        info!(payment_id, late_fee = %payment.late_fee_amount, "Late fee applied");
        Ok(payment)
    }

    pub async fn get_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        self.load_payment(payment_id).await
    }

    pub async fn find_payment_by_transaction_ref(&self, reference: &str) -> Result<Option<Payment>> {
        self.store.find_by_transaction_ref(reference).await
    }

    pub fn is_overdue(&self, payment: &Payment) -> bool {
        payment.is_overdue(self.today())
    }

    pub fn days_overdue(&self, payment: &Payment) -> i64 {
        payment.days_overdue(self.today())
    }

    /// Payments of one subscription, newest first.
    pub async fn payment_history(&self, subscription_id: SubscriptionId) -> Result<Vec<Payment>> {
        Ok(newest_first(
            self.store.payments_for_subscription(subscription_id).await?,
        ))
    }

    /// Payments across all of a customer's subscriptions, newest first.
    pub async fn customer_payment_history(&self, customer_id: CustomerId) -> Result<Vec<Payment>> {
        let mut payments = Vec::new();
        for subscription in self.store.subscriptions_for_customer(customer_id).await? {
            payments.extend(self.store.payments_for_subscription(subscription.id).await?);
        }
        Ok(newest_first(payments))
    }

    pub async fn customer_payment_history_by_type(
        &self,
        customer_id: CustomerId,
        payment_type: PaymentType,
    ) -> Result<Vec<Payment>> {
        let mut payments = self.customer_payment_history(customer_id).await?;
        payments.retain(|p| p.payment_type == payment_type);
        Ok(payments)
    }

    /// PENDING payments past their due date as of today.
    pub async fn overdue_payments(&self) -> Result<Vec<Payment>> {
        self.store.pending_due_before(self.today()).await
    }

    /// Overdue payments that have also run out their grace period, and so
    /// accrue a late fee.
    pub async fn fee_eligible_overdue_payments(&self) -> Result<Vec<Payment>> {
        let cutoff = self.today() - Duration::days(i64::from(self.config.grace_period_days));
        self.store.pending_due_before(cutoff).await
    }

    /// PENDING payments due from today through `days` days ahead.
    pub async fn payments_due_within(&self, days: u32) -> Result<Vec<Payment>> {
        let today = self.today();
        self.store
            .pending_due_between(today, today + Duration::days(i64::from(days)))
            .await
    }

    /// [`Self::payments_due_within`] over the configured `due_soon_days`.
    pub async fn payments_due_soon(&self) -> Result<Vec<Payment>> {
        self.payments_due_within(self.config.due_soon_days).await
    }

    pub(crate) async fn count_overdue_for_customer(&self, customer_id: CustomerId, as_of: NaiveDate) -> Result<usize> {
        let mut count = 0;
        for subscription in self.store.subscriptions_for_customer(customer_id).await? {
            count += self
                .store
                .payments_for_subscription(subscription.id)
                .await?
                .iter()
                .filter(|p| p.is_overdue(as_of))
                .count();
        }
        Ok(count)
    }
}
