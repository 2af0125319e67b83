use super::notice::OverdueNotice;
use super::payment::{Payment, PaymentId};
use super::policy::{Customer, CustomerId, PolicyId, PolicyProduct};
use super::subscription::{Subscription, SubscriptionId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::OwnedMutexGuard;

/// Held for the duration of a read-modify-write on one subscription and its
/// payments. Dropping it releases the row.
pub type RowGuard = OwnedMutexGuard<()>;

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn next_subscription_id(&self) -> Result<SubscriptionId>;
    async fn store_subscription(&self, subscription: Subscription) -> Result<()>;
    async fn get_subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>>;
    async fn all_subscriptions(&self) -> Result<Vec<Subscription>>;
    async fn subscriptions_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Subscription>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn next_payment_id(&self) -> Result<PaymentId>;
    async fn store_payment(&self, payment: Payment) -> Result<()>;
    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>>;
    async fn find_by_transaction_ref(&self, transaction_ref: &str) -> Result<Option<Payment>>;
    async fn payments_for_subscription(&self, subscription_id: SubscriptionId) -> Result<Vec<Payment>>;
    /// PENDING payments with a due date strictly before `date`.
    async fn pending_due_before(&self, date: NaiveDate) -> Result<Vec<Payment>>;
    /// PENDING payments due between `from` and `to`, both inclusive.
    async fn pending_due_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Payment>>;
}

/// Records written together or not at all.
#[derive(Debug, Default, Clone)]
pub struct Changeset {
    pub subscriptions: Vec<Subscription>,
    pub payments: Vec<Payment>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscription(mut self, subscription: Subscription) -> Self {
        self.subscriptions.push(subscription);
        self
    }

    pub fn with_payment(mut self, payment: Payment) -> Self {
        self.payments.push(payment);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty() && self.payments.is_empty()
    }
}

/// The backing store the engine mutates.
///
/// Writers lock the subscription they touch before reading it, so two
/// operations on the same subscription run one after the other while
/// operations on different subscriptions proceed independently.
#[async_trait]
pub trait BillingStore: SubscriptionStore + PaymentStore {
    async fn lock_subscription(&self, id: SubscriptionId) -> Result<RowGuard>;
    async fn commit(&self, changes: Changeset) -> Result<()>;
}

/// Read-only access to the policy catalog.
#[async_trait]
pub trait PolicyCatalog: Send + Sync {
    async fn get_policy(&self, id: PolicyId) -> Result<Option<PolicyProduct>>;
}

#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>>;
}

/// Delivers overdue reminders. How they reach the customer is up to the
/// implementation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_overdue(&self, notices: &[OverdueNotice]) -> Result<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

pub type BillingStoreBox = Box<dyn BillingStore>;
pub type PolicyCatalogBox = Box<dyn PolicyCatalog>;
pub type CustomerDirectoryBox = Box<dyn CustomerDirectory>;
pub type NotifierBox = Box<dyn Notifier>;
pub type ClockBox = Box<dyn Clock>;
