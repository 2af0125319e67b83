use super::locks::RowLocks;
use crate::domain::payment::{Payment, PaymentId};
use crate::domain::policy::{Customer, CustomerId, PolicyId, PolicyProduct};
use crate::domain::ports::{
    BillingStore, Changeset, CustomerDirectory, PaymentStore, PolicyCatalog, RowGuard,
    SubscriptionStore,
};
use crate::domain::subscription::{Subscription, SubscriptionId};
use crate::error::{BillingError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Sequences {
    subscriptions: AtomicU64,
    payments: AtomicU64,
}

/// A thread-safe in-memory store for subscriptions and payments.
///
/// Uses `Arc<RwLock<HashMap<..>>>` per entity so clones share state.
/// Ideal for testing, replays, or small datasets where persistence is not
/// required. Identities are allocated from 1 upwards in creation order.
#[derive(Default, Clone)]
pub struct InMemoryBillingStore {
    subscriptions: Arc<RwLock<HashMap<SubscriptionId, Subscription>>>,
    payments: Arc<RwLock<HashMap<PaymentId, Payment>>>,
    sequences: Arc<Sequences>,
    locks: RowLocks,
}

impl InMemoryBillingStore {
    /// Creates a new, empty in-memory billing store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted<T>(mut items: Vec<T>, key: impl Fn(&T) -> u64) -> Vec<T> {
    items.sort_by_key(key);
    items
}

#[async_trait]
impl SubscriptionStore for InMemoryBillingStore {
    async fn next_subscription_id(&self) -> Result<SubscriptionId> {
        Ok(self.sequences.subscriptions.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn store_subscription(&self, subscription: Subscription) -> Result<()> {
        let mut subscriptions = self.subscriptions.write().await;
        subscriptions.insert(subscription.id, subscription);
        Ok(())
    }

    async fn get_subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>> {
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions.get(&id).cloned())
    }

    async fn all_subscriptions(&self) -> Result<Vec<Subscription>> {
        let subscriptions = self.subscriptions.read().await;
        Ok(sorted(subscriptions.values().cloned().collect(), |s| s.id))
    }

    async fn subscriptions_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Subscription>> {
        let subscriptions = self.subscriptions.read().await;
        let owned = subscriptions
            .values()
            .filter(|s| s.customer_id == customer_id)
            .cloned()
            .collect();
        Ok(sorted(owned, |s| s.id))
    }
}

#[async_trait]
impl PaymentStore for InMemoryBillingStore {
    async fn next_payment_id(&self) -> Result<PaymentId> {
        Ok(self.sequences.payments.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn store_payment(&self, payment: Payment) -> Result<()> {
        let mut payments = self.payments.write().await;
        payments.insert(payment.id, payment);
        Ok(())
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let payments = self.payments.read().await;
        Ok(payments.get(&id).cloned())
    }

    async fn find_by_transaction_ref(&self, transaction_ref: &str) -> Result<Option<Payment>> {
        let payments = self.payments.read().await;
        Ok(payments
            .values()
            .find(|p| p.transaction_ref.as_deref() == Some(transaction_ref))
            .cloned())
    }

    async fn payments_for_subscription(&self, subscription_id: SubscriptionId) -> Result<Vec<Payment>> {
        let payments = self.payments.read().await;
        let matching = payments
            .values()
            .filter(|p| p.subscription_id == subscription_id)
            .cloned()
            .collect();
        Ok(sorted(matching, |p| p.id))
    }

    async fn pending_due_before(&self, date: NaiveDate) -> Result<Vec<Payment>> {
        let payments = self.payments.read().await;
        let matching = payments
            .values()
            .filter(|p| p.is_pending() && p.due_date < date)
            .cloned()
            .collect();
        Ok(sorted(matching, |p| p.id))
    }

    async fn pending_due_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Payment>> {
        let payments = self.payments.read().await;
        let matching = payments
            .values()
            .filter(|p| p.is_pending() && p.due_date >= from && p.due_date <= to)
            .cloned()
            .collect();
        Ok(sorted(matching, |p| p.id))
    }
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn lock_subscription(&self, id: SubscriptionId) -> Result<RowGuard> {
        Ok(self.locks.acquire(id).await)
    }

    async fn commit(&self, changes: Changeset) -> Result<()> {
        // Both maps stay write-locked until every record is in.
        let mut subscriptions = self.subscriptions.write().await;
        let mut payments = self.payments.write().await;
        for incoming in &changes.payments {
            if let Some(reference) = incoming.transaction_ref.as_deref()
                && payments
                    .values()
                    .any(|p| p.id != incoming.id && p.transaction_ref.as_deref() == Some(reference))
            {
                return Err(BillingError::DuplicateTransactionRef(reference.to_string()));
            }
        }
        for subscription in changes.subscriptions {
            subscriptions.insert(subscription.id, subscription);
        }
        for payment in changes.payments {
            payments.insert(payment.id, payment);
        }
        Ok(())
    }
}

/// Policy products and customers held in memory.
#[derive(Default, Clone)]
pub struct InMemoryCatalog {
    policies: Arc<RwLock<HashMap<PolicyId, PolicyProduct>>>,
    customers: Arc<RwLock<HashMap<CustomerId, Customer>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_policy(&self, policy: PolicyProduct) {
        self.policies.write().await.insert(policy.id, policy);
    }

    pub async fn add_customer(&self, customer: Customer) {
        self.customers.write().await.insert(customer.id, customer);
    }
}

#[async_trait]
impl PolicyCatalog for InMemoryCatalog {
    async fn get_policy(&self, id: PolicyId) -> Result<Option<PolicyProduct>> {
        Ok(self.policies.read().await.get(&id).cloned())
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryCatalog {
    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>> {
        Ok(self.customers.read().await.get(&id).cloned())
    }
}
