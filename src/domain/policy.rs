use super::money::Amount;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type PolicyId = u64;
pub type CustomerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyType {
    Health,
    Life,
    Vehicle,
    Travel,
}

/// How often the annual premium of a policy is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PremiumFrequency {
    Monthly,
    Quarterly,
    HalfYearly,
    #[default]
    Annual,
}

impl PremiumFrequency {
    pub fn payments_per_year(&self) -> u32 {
        match self {
            Self::Monthly => 12,
            Self::Quarterly => 4,
            Self::HalfYearly => 2,
            Self::Annual => 1,
        }
    }

    pub fn months_between_payments(&self) -> u32 {
        12 / self.payments_per_year()
    }
}

impl fmt::Display for PremiumFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Monthly => "MONTHLY",
            Self::Quarterly => "QUARTERLY",
            Self::HalfYearly => "HALF_YEARLY",
            Self::Annual => "ANNUAL",
        })
    }
}

/// A catalog entry. Immutable once created; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyProduct {
    pub id: PolicyId,
    pub policy_number: String,
    pub policy_type: PolicyType,
    #[serde(default)]
    pub description: Option<String>,
    pub coverage_amount: Amount,
    /// Annual premium.
    pub premium_amount: Amount,
    pub term_years: u32,
    #[serde(default)]
    pub premium_frequency: PremiumFrequency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub email: String,
}
