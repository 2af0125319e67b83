use super::money::Money;
use super::payment::{Payment, PaymentId};
use super::policy::{Customer, PolicyProduct};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Everything a customer needs to know about one overdue premium.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverdueNotice {
    pub payment_id: PaymentId,
    pub customer_name: String,
    pub customer_email: String,
    pub days_overdue: i64,
    pub policy_number: String,
    pub amount: Money,
    pub due_date: NaiveDate,
    pub late_fee_amount: Money,
    pub total_amount: Money,
}

impl OverdueNotice {
    pub fn new(payment: &Payment, customer: &Customer, policy: &PolicyProduct, today: NaiveDate) -> Self {
        Self {
            payment_id: payment.id,
            customer_name: customer.name.clone(),
            customer_email: customer.email.clone(),
            days_overdue: payment.days_overdue(today),
            policy_number: policy.policy_number.clone(),
            amount: payment.amount.into(),
            due_date: payment.due_date,
            late_fee_amount: payment.late_fee_amount,
            total_amount: payment.total_amount(),
        }
    }

    /// Plain-text reminder body.
    pub fn render(&self) -> String {
        format!(
            "OVERDUE: Payment Required\n\n\
             Dear {},\n\n\
             Your premium payment is now OVERDUE by {} day(s).\n\n\
             Payment Details:\n\
             - Policy Number: {}\n\
             - Amount Due: ${}\n\
             - Original Due Date: {}\n\
             - Late Fee: ${}\n\
             - Total Amount: ${}\n\n\
             Please make your payment immediately to avoid policy lapse.\n",
            self.customer_name,
            self.days_overdue,
            self.policy_number,
            self.amount,
            self.due_date.format("%b %d, %Y"),
            self.late_fee_amount,
            self.total_amount,
        )
    }
}
