//! Application layer orchestrating the billing lifecycle.
//!
//! [`BillingEngine`] is the single entry point for purchases, payment intake,
//! subscription changes and the reconciliation sweep. Its operations are
//! split across files by concern but share one type; [`SweepScheduler`]
//! drives the sweep on a daily timer.

pub mod engine;
pub mod ledger;
pub mod scheduler;
pub mod sweep;

pub use engine::{BillingEngine, SubscriptionUpdate};
pub use ledger::PaymentRequest;
pub use scheduler::SweepScheduler;
pub use sweep::{SweepFailure, SweepReport};
