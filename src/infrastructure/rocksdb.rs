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
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

pub const CF_CUSTOMERS: &str = "customers";
pub const CF_POLICIES: &str = "policies";
pub const CF_SUBSCRIPTIONS: &str = "subscriptions";
pub const CF_PAYMENTS: &str = "payments";
/// Transaction reference -> payment id.
pub const CF_TRANSACTION_REFS: &str = "transaction_refs";
/// Id sequences.
pub const CF_META: &str = "meta";

const SUBSCRIPTION_SEQ: &[u8] = b"subscription_seq";
const PAYMENT_SEQ: &[u8] = b"payment_seq";

/// A persistent store implementation using RocksDB.
///
/// Keeps the catalog, subscriptions, payments, a transaction reference index
/// and the id sequences in separate column families, JSON-encoded. A
/// [`Changeset`] is written as a single `WriteBatch`, so a settlement lands
/// together with its schedule advance or not at all.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    locks: RowLocks,
    // Serializes sequence bumps and reference checks against batch writes.
    write_lock: Arc<Mutex<()>>,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating any
    /// missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [
            CF_CUSTOMERS,
            CF_POLICIES,
            CF_SUBSCRIPTIONS,
            CF_PAYMENTS,
            CF_TRANSACTION_REFS,
            CF_META,
        ]
        .into_iter()
        .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            locks: RowLocks::new(),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| BillingError::internal(format!("Column family {name} not found")))
    }

    fn get<T: DeserializeOwned>(&self, family: &str, id: u64) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(family)?, id.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put<T: Serialize>(&self, family: &str, id: u64, value: &T) -> Result<()> {
        self.db.put_cf(self.cf(family)?, id.to_be_bytes(), encode(value)?)?;
        Ok(())
    }

    /// Every record in a column family, in key (id) order.
    fn scan<T: DeserializeOwned>(&self, family: &str) -> Result<Vec<T>> {
        let mut records = Vec::new();
        for item in self.db.iterator_cf(self.cf(family)?, IteratorMode::Start) {
            let (_key, value) = item?;
            records.push(decode(&value)?);
        }
        Ok(records)
    }

    fn next_id(&self, key: &[u8]) -> Result<u64> {
        let _write = self.write_lock.lock();
        let meta = self.cf(CF_META)?;
        let current = match self.db.get_cf(meta, key)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| BillingError::internal("Corrupt id sequence"))?;
                u64::from_be_bytes(raw)
            }
            None => 0,
        };
        let next = current + 1;
        self.db.put_cf(meta, key, next.to_be_bytes())?;
        Ok(next)
    }

    fn ref_owner(&self, transaction_ref: &str) -> Result<Option<PaymentId>> {
        match self.db.get_cf(self.cf(CF_TRANSACTION_REFS)?, transaction_ref.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn payments_where(&self, keep: impl Fn(&Payment) -> bool) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self.scan(CF_PAYMENTS)?;
        payments.retain(|p| keep(p));
        Ok(payments)
    }

    pub fn put_policy(&self, policy: &PolicyProduct) -> Result<()> {
        self.put(CF_POLICIES, policy.id, policy)
    }

    pub fn put_customer(&self, customer: &Customer) -> Result<()> {
        self.put(CF_CUSTOMERS, customer.id, customer)
    }
}

#[async_trait]
impl SubscriptionStore for RocksDBStore {
    async fn next_subscription_id(&self) -> Result<SubscriptionId> {
        self.next_id(SUBSCRIPTION_SEQ)
    }

    async fn store_subscription(&self, subscription: Subscription) -> Result<()> {
        self.put(CF_SUBSCRIPTIONS, subscription.id, &subscription)
    }

    async fn get_subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>> {
        self.get(CF_SUBSCRIPTIONS, id)
    }

    async fn all_subscriptions(&self) -> Result<Vec<Subscription>> {
        self.scan(CF_SUBSCRIPTIONS)
    }

    async fn subscriptions_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Subscription>> {
        let mut subscriptions: Vec<Subscription> = self.scan(CF_SUBSCRIPTIONS)?;
        subscriptions.retain(|s| s.customer_id == customer_id);
        Ok(subscriptions)
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn next_payment_id(&self) -> Result<PaymentId> {
        self.next_id(PAYMENT_SEQ)
    }

    async fn store_payment(&self, payment: Payment) -> Result<()> {
        self.commit(Changeset::new().with_payment(payment)).await
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.get(CF_PAYMENTS, id)
    }

    async fn find_by_transaction_ref(&self, transaction_ref: &str) -> Result<Option<Payment>> {
        match self.ref_owner(transaction_ref)? {
            Some(id) => self.get(CF_PAYMENTS, id),
            None => Ok(None),
        }
    }

    async fn payments_for_subscription(&self, subscription_id: SubscriptionId) -> Result<Vec<Payment>> {
        self.payments_where(|p| p.subscription_id == subscription_id)
    }

    async fn pending_due_before(&self, date: NaiveDate) -> Result<Vec<Payment>> {
        self.payments_where(|p| p.is_pending() && p.due_date < date)
    }

    async fn pending_due_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Payment>> {
        self.payments_where(|p| p.is_pending() && p.due_date >= from && p.due_date <= to)
    }
}

#[async_trait]
impl BillingStore for RocksDBStore {
    async fn lock_subscription(&self, id: SubscriptionId) -> Result<RowGuard> {
        Ok(self.locks.acquire(id).await)
    }

    async fn commit(&self, changes: Changeset) -> Result<()> {
        let _write = self.write_lock.lock();
        let subscriptions = self.cf(CF_SUBSCRIPTIONS)?;
        let payments = self.cf(CF_PAYMENTS)?;
        let refs = self.cf(CF_TRANSACTION_REFS)?;

        let mut batch = WriteBatch::default();
        for subscription in &changes.subscriptions {
            batch.put_cf(subscriptions, subscription.id.to_be_bytes(), encode(subscription)?);
        }
        for payment in &changes.payments {
            let previous: Option<Payment> = self.get(CF_PAYMENTS, payment.id)?;
            let previous_ref = previous.and_then(|p| p.transaction_ref);
            if previous_ref != payment.transaction_ref
                && let Some(old) = &previous_ref
            {
                batch.delete_cf(refs, old.as_bytes());
            }
            if let Some(reference) = &payment.transaction_ref {
                if let Some(owner) = self.ref_owner(reference)?
                    && owner != payment.id
                {
                    return Err(BillingError::DuplicateTransactionRef(reference.clone()));
                }
                batch.put_cf(refs, reference.as_bytes(), encode(&payment.id)?);
            }
            batch.put_cf(payments, payment.id.to_be_bytes(), encode(payment)?);
        }
        self.db.write(batch)?;
        Ok(())
    }
}

#[async_trait]
impl PolicyCatalog for RocksDBStore {
    async fn get_policy(&self, id: PolicyId) -> Result<Option<PolicyProduct>> {
        self.get(CF_POLICIES, id)
    }
}

#[async_trait]
impl CustomerDirectory for RocksDBStore {
    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>> {
        self.get(CF_CUSTOMERS, id)
    }
}
