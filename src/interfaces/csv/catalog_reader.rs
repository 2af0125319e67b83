use crate::domain::policy::{Customer, PolicyProduct};
use crate::error::{BillingError, Result};
use serde::de::DeserializeOwned;
use std::io::Read;

/// Longest policy term accepted from a catalog.
pub const MAX_TERM_YEARS: u32 = 100;

/// Reads catalog records (policy products or customers) from a CSV source.
///
/// Policies use the columns `id, policy_number, policy_type, description,
/// coverage_amount, premium_amount, term_years, premium_frequency`; customers
/// use `id, name, email`.
pub struct CatalogReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CatalogReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);
        Self { reader }
    }

    fn records<T: DeserializeOwned>(self) -> impl Iterator<Item = Result<T>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(BillingError::from))
    }

    pub fn policies(self) -> impl Iterator<Item = Result<PolicyProduct>> {
        self.records::<PolicyProduct>().map(|policy| {
            let policy = policy?;
            if policy.term_years == 0 || policy.term_years > MAX_TERM_YEARS {
                return Err(BillingError::ValidationError(format!(
                    "Policy {} must have a term between 1 and {MAX_TERM_YEARS} years, got {}",
                    policy.policy_number, policy.term_years
                )));
            }
            Ok(policy)
        })
    }

    pub fn customers(self) -> impl Iterator<Item = Result<Customer>> {
        self.records()
    }
}
