use crate::config::BillingConfig;
use crate::domain::payment::{Payment, PaymentId};
use crate::domain::policy::{Customer, CustomerId, PolicyId, PolicyProduct, PolicyType};
use crate::domain::ports::{
    BillingStoreBox, Changeset, ClockBox, CustomerDirectoryBox, PolicyCatalogBox,
};
use crate::domain::subscription::{Subscription, SubscriptionId, SubscriptionStatus};
use crate::error::{BillingError, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::info;

/// Administrative edit of a subscription. End dates are not editable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    pub status: Option<SubscriptionStatus>,
    pub next_premium_due: Option<NaiveDate>,
}

/// The billing lifecycle engine.
///
/// `BillingEngine` owns no state of its own: every operation reads what it
/// needs from the store, applies the domain rules, and commits the result
/// before returning. Operations that change a subscription or its payments
/// hold that subscription's row lock from first read to commit.
pub struct BillingEngine {
    pub(crate) store: BillingStoreBox,
    pub(crate) policies: PolicyCatalogBox,
    pub(crate) customers: CustomerDirectoryBox,
    pub(crate) clock: ClockBox,
    pub(crate) config: BillingConfig,
}

impl BillingEngine {
    /// Creates a new `BillingEngine`.
    ///
    /// # Arguments
    ///
    /// * `store` - Subscriptions and payments; the only state the engine mutates.
    /// * `policies` - Read-only policy catalog.
    /// * `customers` - Read-only customer directory, used for notices.
    /// * `clock` - Source of "today" for due date and overdue decisions.
    /// * `config` - Grace period, late fee terms and lapse threshold.
    pub fn new(
        store: BillingStoreBox,
        policies: PolicyCatalogBox,
        customers: CustomerDirectoryBox,
        clock: ClockBox,
        config: BillingConfig,
    ) -> Self {
        Self {
            store,
            policies,
            customers,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) async fn load_subscription(&self, id: SubscriptionId) -> Result<Subscription> {
        self.store
            .get_subscription(id)
            .await?
            .ok_or(BillingError::SubscriptionNotFound(id))
    }

    pub(crate) async fn load_payment(&self, id: PaymentId) -> Result<Payment> {
        self.store
            .get_payment(id)
            .await?
            .ok_or(BillingError::PaymentNotFound(id))
    }

    pub(crate) async fn load_policy(&self, id: PolicyId) -> Result<PolicyProduct> {
        self.policies
            .get_policy(id)
            .await?
            .ok_or(BillingError::PolicyNotFound(id))
    }

    pub(crate) async fn load_customer(&self, id: CustomerId) -> Result<Customer> {
        self.customers
            .get_customer(id)
            .await?
            .ok_or(BillingError::CustomerNotFound(id))
    }

    /// Subscribes a customer to a policy. The subscription starts PENDING and
    /// its first premium falls due one billing interval after `start_date`.
    pub async fn purchase(
        &self,
        customer_id: CustomerId,
        policy_id: PolicyId,
        start_date: NaiveDate,
    ) -> Result<Subscription> {
        info!(customer_id, policy_id, %start_date, "Processing policy purchase");
        let customer = self.load_customer(customer_id).await?;
        let policy = self.load_policy(policy_id).await?;

        let already_active = self
            .store
            .subscriptions_for_customer(customer_id)
            .await?
            .iter()
            .any(|s| s.policy_id == policy_id && s.is_active());
        if already_active {
            return Err(BillingError::AlreadySubscribed {
                customer: customer_id,
                policy: policy_id,
            });
        }

        let earliest = self.today() - Duration::days(1);
        if start_date < earliest {
            return Err(BillingError::ValidationError(format!(
                "Start date {start_date} cannot be in the past (earliest allowed {earliest})"
            )));
        }

        let id = self.store.next_subscription_id().await?;
        let subscription = Subscription::purchase(id, customer_id, &policy, start_date, self.now())?;
        self.store
            .commit(Changeset::new().with_subscription(subscription.clone()))
            .await?;
        info!(
            subscription_id = id,
            policy_number = %policy.policy_number,
            customer = %customer.email,
            "Policy purchased"
        );
        Ok(subscription)
    }

    pub async fn get_subscription(&self, id: SubscriptionId) -> Result<Subscription> {
        self.load_subscription(id).await
    }

    pub async fn all_subscriptions(&self) -> Result<Vec<Subscription>> {
        self.store.all_subscriptions().await
    }

    pub async fn subscriptions_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Subscription>> {
        self.store.subscriptions_for_customer(customer_id).await
    }

    pub async fn active_subscriptions_for_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<Subscription>> {
        let mut subscriptions = self.store.subscriptions_for_customer(customer_id).await?;
        subscriptions.retain(Subscription::is_active);
        Ok(subscriptions)
    }

    /// A customer's subscriptions to policies of one type.
    pub async fn subscriptions_for_customer_by_type(
        &self,
        customer_id: CustomerId,
        policy_type: PolicyType,
    ) -> Result<Vec<Subscription>> {
        let mut matching = Vec::new();
        for subscription in self.store.subscriptions_for_customer(customer_id).await? {
            if self.load_policy(subscription.policy_id).await?.policy_type == policy_type {
                matching.push(subscription);
            }
        }
        Ok(matching)
    }

    pub async fn count_active_for_customer(&self, customer_id: CustomerId) -> Result<usize> {
        Ok(self.active_subscriptions_for_customer(customer_id).await?.len())
    }

    /// ACTIVE subscriptions whose end date falls within the next `days` days.
    pub async fn expiring_within(&self, days: u32) -> Result<Vec<Subscription>> {
        let from = self.today();
        let to = from + Duration::days(i64::from(days));
        let mut subscriptions = self.store.all_subscriptions().await?;
        subscriptions.retain(|s| s.is_active() && s.end_date >= from && s.end_date <= to);
        Ok(subscriptions)
    }

    /// ACTIVE subscriptions with a premium falling due within the next `days` days.
    pub async fn due_for_renewal_within(&self, days: u32) -> Result<Vec<Subscription>> {
        let from = self.today();
        let to = from + Duration::days(i64::from(days));
        let mut subscriptions = self.store.all_subscriptions().await?;
        subscriptions.retain(|s| {
            s.is_active() && s.next_premium_due.is_some_and(|due| due >= from && due <= to)
        });
        Ok(subscriptions)
    }

    pub async fn subscription_belongs_to(
        &self,
        subscription_id: SubscriptionId,
        customer_id: CustomerId,
    ) -> Result<bool> {
        Ok(self.load_subscription(subscription_id).await?.customer_id == customer_id)
    }

    pub async fn payment_belongs_to(&self, payment_id: PaymentId, customer_id: CustomerId) -> Result<bool> {
        let payment = self.load_payment(payment_id).await?;
        self.subscription_belongs_to(payment.subscription_id, customer_id)
            .await
    }

    pub async fn cancel(&self, id: SubscriptionId) -> Result<Subscription> {
        info!(subscription_id = id, "Cancelling subscription");
        let _row = self.store.lock_subscription(id).await?;
        let mut subscription = self.load_subscription(id).await?;
        subscription.cancel()?;
        self.store
            .commit(Changeset::new().with_subscription(subscription.clone()))
            .await?;
        Ok(subscription)
    }

    /// Extends a subscription by one term and puts it back in force. This is
    /// the only way out of LAPSED; overdue payments stay outstanding.
    pub async fn renew(&self, id: SubscriptionId) -> Result<Subscription> {
        let _row = self.store.lock_subscription(id).await?;
        let mut subscription = self.load_subscription(id).await?;
        let policy = self.load_policy(subscription.policy_id).await?;
        let previous = subscription.status;
        subscription.renew(&policy, self.today())?;
        self.store
            .commit(Changeset::new().with_subscription(subscription.clone()))
            .await?;
        info!(
            subscription_id = id,
            from = %previous,
            end_date = %subscription.end_date,
            "Subscription renewed"
        );
        Ok(subscription)
    }

    /// Administrative status and due date edit.
    pub async fn update_subscription(
        &self,
        id: SubscriptionId,
        update: SubscriptionUpdate,
    ) -> Result<Subscription> {
        let _row = self.store.lock_subscription(id).await?;
        let mut subscription = self.load_subscription(id).await?;
        if let Some(status) = update.status {
            subscription.update_status(status)?;
        }
        if let Some(due) = update.next_premium_due {
            subscription.reschedule(due)?;
        }
        self.store
            .commit(Changeset::new().with_subscription(subscription.clone()))
            .await?;
        info!(subscription_id = id, status = %subscription.status, "Subscription updated");
        Ok(subscription)
    }

    pub async fn update_status(
        &self,
        id: SubscriptionId,
        status: SubscriptionStatus,
    ) -> Result<Subscription> {
        self.update_subscription(
            id,
            SubscriptionUpdate {
                status: Some(status),
                next_premium_due: None,
            },
        )
        .await
    }
}
