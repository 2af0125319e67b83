//! Domain types and rules of the policy billing lifecycle.
//!
//! Nothing in here performs I/O. The engine in `application` loads records
//! through the [`ports`], applies these rules, and writes the results back.

pub mod money;
pub mod notice;
pub mod payment;
pub mod policy;
pub mod ports;
pub mod schedule;
pub mod settlement;
pub mod subscription;
