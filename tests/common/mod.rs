#![allow(dead_code)]

use chrono::NaiveDate;
use policy_billing::application::BillingEngine;
use policy_billing::config::BillingConfig;
use policy_billing::domain::money::Amount;
use policy_billing::domain::policy::{Customer, PolicyProduct, PolicyType, PremiumFrequency};
use policy_billing::domain::ports::BillingStoreBox;
use policy_billing::infrastructure::clock::ManualClock;
use policy_billing::infrastructure::in_memory::{InMemoryBillingStore, InMemoryCatalog};
use rust_decimal::Decimal;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;

pub const ANNUAL_LIFE: u64 = 1;
pub const MONTHLY_HEALTH: u64 = 2;
pub const QUARTERLY_VEHICLE: u64 = 3;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn policy(
    id: u64,
    policy_number: &str,
    policy_type: PolicyType,
    premium: Decimal,
    term_years: u32,
    premium_frequency: PremiumFrequency,
) -> PolicyProduct {
    PolicyProduct {
        id,
        policy_number: policy_number.to_string(),
        policy_type,
        description: None,
        coverage_amount: Amount::new(premium * Decimal::from(100)).unwrap(),
        premium_amount: Amount::new(premium).unwrap(),
        term_years,
        premium_frequency,
    }
}

pub fn standard_policies() -> Vec<PolicyProduct> {
    vec![
        policy(ANNUAL_LIFE, "LIFE-001", PolicyType::Life, Decimal::from(1200), 10, PremiumFrequency::Annual),
        policy(MONTHLY_HEALTH, "HLT-002", PolicyType::Health, Decimal::from(1200), 1, PremiumFrequency::Monthly),
        policy(QUARTERLY_VEHICLE, "VEH-003", PolicyType::Vehicle, Decimal::from(1000), 2, PremiumFrequency::Quarterly),
    ]
}

pub fn customer(id: u64) -> Customer {
    Customer {
        id,
        name: format!("Customer {id}"),
        email: format!("customer{id}@example.com"),
    }
}

pub struct Harness {
    pub engine: Arc<BillingEngine>,
    pub clock: ManualClock,
}

pub async fn catalog(policies: Vec<PolicyProduct>, customers: u64) -> InMemoryCatalog {
    let catalog = InMemoryCatalog::new();
    for policy in policies {
        catalog.add_policy(policy).await;
    }
    for id in 1..=customers {
        catalog.add_customer(customer(id)).await;
    }
    catalog
}

/// Engine over the standard policies and customers 1 to 5, at `today`.
pub async fn harness(today: NaiveDate) -> Harness {
    harness_with(today, Box::new(InMemoryBillingStore::new()), BillingConfig::default()).await
}

pub async fn harness_with(today: NaiveDate, store: BillingStoreBox, config: BillingConfig) -> Harness {
    let catalog = catalog(standard_policies(), 5).await;
    let clock = ManualClock::at(today);
    let engine = BillingEngine::new(
        store,
        Box::new(catalog.clone()),
        Box::new(catalog),
        Box::new(clock.clone()),
        config,
    );
    Harness {
        engine: Arc::new(engine),
        clock,
    }
}

/// Writes the standard catalog as the two CSV files the binary reads.
pub fn write_catalog(dir: &Path) -> Result<(std::path::PathBuf, std::path::PathBuf), Error> {
    let policies_path = dir.join("policies.csv");
    let mut wtr = csv::Writer::from_writer(File::create(&policies_path)?);
    wtr.write_record([
        "id",
        "policy_number",
        "policy_type",
        "description",
        "coverage_amount",
        "premium_amount",
        "term_years",
        "premium_frequency",
    ])?;
    wtr.write_record(["1", "LIFE-001", "LIFE", "Term life", "120000", "1200.00", "10", "ANNUAL"])?;
    wtr.write_record(["2", "HLT-002", "HEALTH", "", "120000", "1200.00", "1", "MONTHLY"])?;
    wtr.write_record(["3", "VEH-003", "VEHICLE", "Comprehensive", "100000", "1000.00", "2", "QUARTERLY"])?;
    wtr.flush()?;

    let customers_path = dir.join("customers.csv");
    let mut wtr = csv::Writer::from_writer(File::create(&customers_path)?);
    wtr.write_record(["id", "name", "email"])?;
    for id in 1..=5u64 {
        let c = customer(id);
        wtr.write_record([c.id.to_string(), c.name, c.email])?;
    }
    wtr.flush()?;

    Ok((policies_path, customers_path))
}

/// Writes a commands file with the full header; each row lists columns in
/// header order and may stop early.
pub fn write_commands(path: &Path, rows: &[&str]) -> Result<(), Error> {
    let mut content =
        String::from("type,date,customer,policy,subscription,payment,amount,due,reference,status,payment_type,method,note\n");
    for row in rows {
        content.push_str(row);
        content.push('\n');
    }
    std::fs::write(path, content)
}
