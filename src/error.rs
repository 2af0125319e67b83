use crate::domain::payment::PaymentStatus;
use crate::domain::subscription::SubscriptionStatus;
use chrono::NaiveDate;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BillingError>;

/// Coarse classification of a [`BillingError`], used by callers that map
/// engine failures onto their own responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    StateConflict,
    Storage,
}

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Subscription not found with ID: {0}")]
    SubscriptionNotFound(u64),
    #[error("Payment not found with ID: {0}")]
    PaymentNotFound(u64),
    #[error("Policy not found with ID: {0}")]
    PolicyNotFound(u64),
    #[error("Customer not found with ID: {0}")]
    CustomerNotFound(u64),

    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Subscription {subscription} does not have a next premium due date set")]
    NoScheduleSet { subscription: u64 },

    #[error("Payment due date {requested} does not match expected due date {expected}")]
    DueDateMismatch {
        requested: NaiveDate,
        expected: NaiveDate,
    },
    #[error("Cannot transition subscription status {from}→{to}")]
    InvalidStatusTransition {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },
    #[error("Subscription {0} is already CANCELLED")]
    AlreadyCancelled(u64),
    #[error("Subscription {0} is LAPSED and cannot be cancelled")]
    CannotCancelLapsed(u64),
    #[error("Subscription {0} is CANCELLED and cannot be renewed")]
    CannotRenewCancelled(u64),
    #[error("Customer {customer} already holds an ACTIVE subscription to policy {policy}")]
    AlreadySubscribed { customer: u64, policy: u64 },
    #[error("Payment {payment} is {status}, expected PENDING")]
    PaymentNotPending { payment: u64, status: PaymentStatus },
    #[error("Transaction reference {0} is already recorded")]
    DuplicateTransactionRef(String),
    #[error("Next premium due {requested} is earlier than current {current}")]
    DueDateRegression {
        requested: NaiveDate,
        current: NaiveDate,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    Storage(#[from] rocksdb::Error),
}

impl BillingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SubscriptionNotFound(_)
            | Self::PaymentNotFound(_)
            | Self::PolicyNotFound(_)
            | Self::CustomerNotFound(_) => ErrorKind::NotFound,
            Self::ValidationError(_) | Self::NoScheduleSet { .. } | Self::Csv(_) => {
                ErrorKind::Validation
            }
            Self::DueDateMismatch { .. }
            | Self::InvalidStatusTransition { .. }
            | Self::AlreadyCancelled(_)
            | Self::CannotCancelLapsed(_)
            | Self::CannotRenewCancelled(_)
            | Self::AlreadySubscribed { .. }
            | Self::PaymentNotPending { .. }
            | Self::DuplicateTransactionRef(_)
            | Self::DueDateRegression { .. } => ErrorKind::StateConflict,
            Self::Io(_) | Self::Config(_) | Self::InternalError(_) => ErrorKind::Storage,
            #[cfg(feature = "storage-rocksdb")]
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(Box::new(std::io::Error::other(message.into())))
    }
}

impl From<serde_json::Error> for BillingError {
    fn from(e: serde_json::Error) -> Self {
        Self::InternalError(Box::new(e))
    }
}
