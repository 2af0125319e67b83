use crate::domain::money::Money;
use crate::domain::payment::LateFeePolicy;
use chrono::NaiveTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

/// Engine and scheduler settings. Loaded from environment variables with the
/// prefix `POLICY_BILLING__`, e.g. `POLICY_BILLING__GRACE_PERIOD_DAYS=10`.
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Days past due before a PENDING payment starts accruing a late fee.
    #[serde(default = "default_grace_period_days")]
    pub grace_period_days: u32,
    #[serde(default = "default_late_fee_rate")]
    pub late_fee_rate: Decimal,
    #[serde(default = "default_late_fee_cap")]
    pub late_fee_cap: Decimal,
    /// Overdue payments a customer may carry before an ACTIVE subscription lapses.
    #[serde(default = "default_lapse_threshold")]
    pub lapse_threshold: usize,
    /// Time of day (UTC) at which the daily sweep fires.
    #[serde(default = "default_sweep_time")]
    pub sweep_time: NaiveTime,
    #[serde(default = "default_due_soon_days")]
    pub due_soon_days: u32,
    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            grace_period_days: default_grace_period_days(),
            late_fee_rate: default_late_fee_rate(),
            late_fee_cap: default_late_fee_cap(),
            lapse_threshold: default_lapse_threshold(),
            sweep_time: default_sweep_time(),
            due_soon_days: default_due_soon_days(),
            log_format: LogFormat::default(),
        }
    }
}

impl BillingConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("POLICY_BILLING")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    pub fn late_fee_policy(&self) -> LateFeePolicy {
        LateFeePolicy {
            rate: self.late_fee_rate,
            cap: Money::new(self.late_fee_cap),
        }
    }
}

// Default functions
fn default_grace_period_days() -> u32 {
    15
}
fn default_late_fee_rate() -> Decimal {
    dec!(0.05)
}
fn default_late_fee_cap() -> Decimal {
    dec!(1000.00)
}
fn default_lapse_threshold() -> usize {
    2
}
fn default_sweep_time() -> NaiveTime {
    NaiveTime::from_hms_opt(2, 0, 0).unwrap_or(NaiveTime::MIN)
}
fn default_due_soon_days() -> u32 {
    7
}
