mod common;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{MONTHLY_HEALTH, date, harness, harness_with};
use policy_billing::application::PaymentRequest;
use policy_billing::config::BillingConfig;
use policy_billing::domain::money::{Amount, Money};
use policy_billing::domain::payment::{Payment, PaymentId, PaymentStatus, PaymentType};
use policy_billing::domain::policy::CustomerId;
use policy_billing::domain::ports::{
    BillingStore, Changeset, PaymentStore, RowGuard, SubscriptionStore,
};
use policy_billing::domain::subscription::{Subscription, SubscriptionId, SubscriptionStatus};
use policy_billing::error::{BillingError, ErrorKind, Result};
use policy_billing::infrastructure::in_memory::InMemoryBillingStore;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Subscription purchased on Jan 1 with one PENDING premium of `amount`
/// due Feb 1.
async fn overdue_premium(
    h: &common::Harness,
    customer: CustomerId,
    amount: rust_decimal::Decimal,
) -> (Subscription, Payment) {
    let sub = h
        .engine
        .purchase(customer, MONTHLY_HEALTH, date(2025, 1, 1))
        .await
        .unwrap();
    let payment = h
        .engine
        .record_payment(
            PaymentRequest::premium(sub.id, date(2025, 2, 1)).with_amount(Amount::new(amount).unwrap()),
        )
        .await
        .unwrap();
    (sub, payment)
}

#[tokio::test]
async fn test_late_fee_is_idempotent_across_runs() {
    let h = harness(date(2025, 1, 1)).await;
    let (_, payment) = overdue_premium(&h, 1, dec!(100.00)).await;

    h.clock.set_today(date(2025, 2, 21));
    let first = h.engine.sweep().await.unwrap();
    assert_eq!(first.processed[0].late_fee_amount, Money::new(dec!(5.00)));

    let second = h.engine.sweep().await.unwrap();
    assert_eq!(second.processed[0].late_fee_amount, Money::new(dec!(5.00)));

    let stored = h.engine.get_payment(payment.id).await.unwrap();
    assert_eq!(stored.late_fee_amount, Money::new(dec!(5.00)));
    assert_eq!(stored.total_amount(), Money::new(dec!(105.00)));
    assert_eq!(stored.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_late_fee_is_capped() {
    let h = harness(date(2025, 1, 1)).await;
    let (_, payment) = overdue_premium(&h, 1, dec!(25000.00)).await;

    h.clock.set_today(date(2025, 3, 1));
    let report = h.engine.sweep().await.unwrap();
    assert_eq!(report.processed.len(), 1);

    let stored = h.engine.get_payment(payment.id).await.unwrap();
    assert_eq!(stored.late_fee_amount, Money::new(dec!(1000.00)));
    assert_eq!(report.notices[0].total_amount, Money::new(dec!(26000.00)));
}

#[tokio::test]
async fn test_lapse_counts_overdue_without_grace() {
    let h = harness(date(2025, 1, 1)).await;
    let sub = h.engine.purchase(2, MONTHLY_HEALTH, date(2025, 1, 1)).await.unwrap();
    h.engine
        .record_payment(PaymentRequest::premium(sub.id, date(2025, 2, 1)).with_transaction_ref("FIRST"))
        .await
        .unwrap();

    // One premium past grace, one refund only just overdue.
    h.engine
        .record_payment(PaymentRequest::premium(sub.id, date(2025, 3, 1)))
        .await
        .unwrap();
    h.engine
        .record_payment(
            PaymentRequest::premium(sub.id, date(2025, 3, 15))
                .with_type(PaymentType::Refund)
                .with_amount(Amount::new(dec!(40)).unwrap()),
        )
        .await
        .unwrap();

    h.clock.set_today(date(2025, 3, 20));
    let report = h.engine.sweep().await.unwrap();
    assert_eq!(report.processed.len(), 1);
    assert_eq!(report.lapsed, vec![sub.id]);
    assert_eq!(
        h.engine.get_subscription(sub.id).await.unwrap().status,
        SubscriptionStatus::Lapsed
    );

    // A third overdue payment on the LAPSED subscription changes nothing.
    h.engine
        .record_payment(PaymentRequest::premium(sub.id, date(2025, 3, 1)))
        .await
        .unwrap();
    h.clock.set_today(date(2025, 3, 21));
    let report = h.engine.sweep().await.unwrap();
    assert_eq!(report.processed.len(), 2);
    assert!(report.lapsed.is_empty());
    assert_eq!(
        h.engine.get_subscription(sub.id).await.unwrap().status,
        SubscriptionStatus::Lapsed
    );
}

#[tokio::test]
async fn test_single_overdue_payment_does_not_lapse() {
    let h = harness(date(2025, 1, 1)).await;
    let sub = h.engine.purchase(3, MONTHLY_HEALTH, date(2025, 1, 1)).await.unwrap();
    h.engine
        .record_payment(PaymentRequest::premium(sub.id, date(2025, 2, 1)).with_transaction_ref("PAID"))
        .await
        .unwrap();
    h.engine
        .record_payment(PaymentRequest::premium(sub.id, date(2025, 3, 1)))
        .await
        .unwrap();

    h.clock.set_today(date(2025, 4, 1));
    let report = h.engine.sweep().await.unwrap();
    assert_eq!(report.processed.len(), 1);
    assert!(report.lapsed.is_empty());
    assert!(h.engine.get_subscription(sub.id).await.unwrap().is_active());
}

#[tokio::test]
async fn test_threshold_comes_from_config() {
    let config = BillingConfig {
        lapse_threshold: 1,
        grace_period_days: 0,
        ..BillingConfig::default()
    };
    let h = harness_with(date(2025, 1, 1), Box::new(InMemoryBillingStore::new()), config).await;
    let sub = h.engine.purchase(3, MONTHLY_HEALTH, date(2025, 1, 1)).await.unwrap();
    h.engine
        .record_payment(PaymentRequest::premium(sub.id, date(2025, 2, 1)).with_transaction_ref("PAID"))
        .await
        .unwrap();
    h.engine
        .record_payment(PaymentRequest::premium(sub.id, date(2025, 3, 1)))
        .await
        .unwrap();

    h.clock.set_today(date(2025, 3, 2));
    let report = h.engine.sweep().await.unwrap();
    assert_eq!(report.lapsed, vec![sub.id]);
}

/// Delegates to an in-memory store, failing commits that touch one
/// subscription and, on demand, the overdue fetch.
#[derive(Clone, Default)]
struct FlakyStore {
    inner: InMemoryBillingStore,
    poisoned: Arc<AtomicU64>,
    fail_fetch: Arc<AtomicBool>,
}

#[async_trait]
impl SubscriptionStore for FlakyStore {
    async fn next_subscription_id(&self) -> Result<SubscriptionId> {
        self.inner.next_subscription_id().await
    }
    async fn store_subscription(&self, subscription: Subscription) -> Result<()> {
        self.inner.store_subscription(subscription).await
    }
    async fn get_subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>> {
        self.inner.get_subscription(id).await
    }
    async fn all_subscriptions(&self) -> Result<Vec<Subscription>> {
        self.inner.all_subscriptions().await
    }
    async fn subscriptions_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Subscription>> {
        self.inner.subscriptions_for_customer(customer_id).await
    }
}

#[async_trait]
impl PaymentStore for FlakyStore {
    async fn next_payment_id(&self) -> Result<PaymentId> {
        self.inner.next_payment_id().await
    }
    async fn store_payment(&self, payment: Payment) -> Result<()> {
        self.inner.store_payment(payment).await
    }
    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.inner.get_payment(id).await
    }
    async fn find_by_transaction_ref(&self, transaction_ref: &str) -> Result<Option<Payment>> {
        self.inner.find_by_transaction_ref(transaction_ref).await
    }
    async fn payments_for_subscription(&self, subscription_id: SubscriptionId) -> Result<Vec<Payment>> {
        self.inner.payments_for_subscription(subscription_id).await
    }
    async fn pending_due_before(&self, date: NaiveDate) -> Result<Vec<Payment>> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(BillingError::Io(std::io::Error::other("replica unavailable")));
        }
        self.inner.pending_due_before(date).await
    }
    async fn pending_due_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Payment>> {
        self.inner.pending_due_between(from, to).await
    }
}

#[async_trait]
impl BillingStore for FlakyStore {
    async fn lock_subscription(&self, id: SubscriptionId) -> Result<RowGuard> {
        self.inner.lock_subscription(id).await
    }
    async fn commit(&self, changes: Changeset) -> Result<()> {
        let poisoned = self.poisoned.load(Ordering::SeqCst);
        if changes.payments.iter().any(|p| p.subscription_id == poisoned) {
            return Err(BillingError::Io(std::io::Error::other("disk full")));
        }
        self.inner.commit(changes).await
    }
}

#[tokio::test]
async fn test_failed_record_does_not_block_the_rest() {
    let store = FlakyStore::default();
    let h = harness_with(date(2025, 1, 1), Box::new(store.clone()), BillingConfig::default()).await;
    let (bad_sub, bad) = overdue_premium(&h, 1, dec!(100)).await;
    let (_, good) = overdue_premium(&h, 2, dec!(200)).await;
    store.poisoned.store(bad_sub.id, Ordering::SeqCst);

    h.clock.set_today(date(2025, 3, 1));
    let report = h.engine.sweep().await.unwrap();

    assert!(!report.is_clean());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].payment_id, bad.id);
    assert_eq!(report.failures[0].error.kind(), ErrorKind::Storage);

    assert_eq!(report.processed.len(), 1);
    assert_eq!(report.processed[0].id, good.id);
    assert_eq!(report.notices.len(), 1);
    assert!(h.engine.get_payment(bad.id).await.unwrap().late_fee_amount.is_zero());
    assert_eq!(
        h.engine.get_payment(good.id).await.unwrap().late_fee_amount,
        Money::new(dec!(10.00))
    );
}

#[tokio::test]
async fn test_fetch_failure_aborts_the_run() {
    let store = FlakyStore::default();
    let h = harness_with(date(2025, 1, 1), Box::new(store.clone()), BillingConfig::default()).await;
    overdue_premium(&h, 1, dec!(100)).await;
    store.fail_fetch.store(true, Ordering::SeqCst);

    h.clock.set_today(date(2025, 3, 1));
    let err = h.engine.sweep().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_settlements_of_one_payment_advance_once() {
    let h = harness(date(2025, 1, 1)).await;
    let (sub, payment) = overdue_premium(&h, 1, dec!(100)).await;

    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = Arc::clone(&h.engine);
        handles.push(tokio::spawn(async move {
            engine.mark_paid(payment.id, Some(format!("RACE-{i}"))).await
        }));
    }

    let mut settled = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => settled += 1,
            Err(e) => assert!(matches!(e, BillingError::PaymentNotPending { .. })),
        }
    }
    assert_eq!(settled, 1);

    let sub = h.engine.get_subscription(sub.id).await.unwrap();
    assert_eq!(sub.next_premium_due, Some(date(2025, 3, 1)));
    assert_eq!(sub.status, SubscriptionStatus::Active);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sweep_racing_payment_leaves_consistent_state() {
    let h = harness(date(2025, 1, 1)).await;
    let (sub, payment) = overdue_premium(&h, 1, dec!(100)).await;
    h.clock.set_today(date(2025, 3, 1));

    let sweeper = {
        let engine = Arc::clone(&h.engine);
        tokio::spawn(async move { engine.sweep().await })
    };
    let payer = {
        let engine = Arc::clone(&h.engine);
        tokio::spawn(async move { engine.mark_paid(payment.id, Some("RACE".to_string())).await })
    };
    sweeper.await.unwrap().unwrap();
    payer.await.unwrap().unwrap();

    let stored = h.engine.get_payment(payment.id).await.unwrap();
    assert_eq!(stored.status, PaymentStatus::Success);
    assert!(stored.late_fee_amount.is_zero() || stored.late_fee_amount == Money::new(dec!(5.00)));

    let sub = h.engine.get_subscription(sub.id).await.unwrap();
    assert_eq!(sub.next_premium_due, Some(date(2025, 3, 1)));
    assert_eq!(sub.status, SubscriptionStatus::Active);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sweep_over_many_subscriptions() {
    let h = harness(date(2025, 1, 1)).await;
    let mut ids = Vec::new();
    for customer in 1..=5 {
        for _ in 0..4 {
            let (_, payment) = overdue_premium(&h, customer, dec!(50)).await;
            ids.push(payment.id);
        }
    }

    h.clock.set_today(date(2025, 3, 1));
    let report = h.engine.sweep().await.unwrap();
    assert!(report.is_clean());
    assert_eq!(
        report.processed.iter().map(|p| p.id).collect::<Vec<_>>(),
        ids
    );
    // None of the subscriptions was ever confirmed.
    assert!(report.lapsed.is_empty());
    assert_eq!(report.notices.len(), 20);
}
