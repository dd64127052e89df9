//! Invoice rendering contract (§6): a pure function boundary over
//! Transaction + User + Subscription + Plan. HTML→PDF conversion is an
//! external collaborator's job; the shipped implementation renders the
//! minimal HTML document and stops there.

use crate::models::{Plan, Subscription, Transaction, User};

/// `render(transaction, user, subscription, plan) -> Vec<u8>`.
pub trait InvoiceRenderer: Send + Sync {
    fn render(&self, transaction: &Transaction, user: &User, subscription: &Subscription, plan: &Plan) -> Vec<u8>;
}

/// Renders a minimal HTML document carrying the fields the spec names:
/// transaction id, amount, date, plan name. A real PDF conversion step sits
/// downstream of this at the same seam.
#[derive(Debug, Default)]
pub struct HtmlInvoiceRenderer;

impl InvoiceRenderer for HtmlInvoiceRenderer {
    fn render(&self, transaction: &Transaction, user: &User, subscription: &Subscription, plan: &Plan) -> Vec<u8> {
        let html = format!(
            "<html><body>\
             <h1>Invoice</h1>\
             <p>Transaction: {}</p>\
             <p>Customer: {}</p>\
             <p>Plan: {}</p>\
             <p>Subscription: {}</p>\
             <p>Amount: {}</p>\
             <p>Date: {}</p>\
             </body></html>",
            transaction.id,
            user.email,
            plan.name,
            subscription.id,
            transaction.amount,
            transaction.created_at.to_rfc3339(),
        );
        html.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SubscriptionStatus, TransactionStatus, TransactionType, UserRole};
    use crate::money::{Currency, Money};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn renders_html_with_expected_fields() {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: "customer@example.com".into(),
            role: UserRole::User,
            balance: dec!(0),
            balance_currency: Currency::Rub,
            active: true,
            created_at: now,
        };
        let plan = Plan {
            id: Uuid::new_v4(),
            name: "Pro".into(),
            price: Money::new(dec!(1000), Currency::Rub),
            billing_cycle_days: 30,
            trial_period_days: 0,
            max_retries: 3,
            active: true,
        };
        let subscription = Subscription {
            id: Uuid::new_v4(),
            user_id: user.id,
            plan_id: plan.id,
            status: SubscriptionStatus::Active,
            current_period_start: now,
            current_period_end: now,
            trial_end: None,
            payment_method_id: Uuid::new_v4(),
            cancel_at_period_end: false,
            retry_count: 0,
            auto_renew: true,
            retry_at: None,
            cancellation_reason: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };
        let transaction = Transaction {
            id: Uuid::new_v4(),
            user_id: user.id,
            subscription_id: Some(subscription.id),
            amount: Money::new(dec!(1000), Currency::Rub),
            status: TransactionStatus::Completed,
            transaction_type: TransactionType::Renewal,
            gateway: "mock".into(),
            gateway_reference: Some("ref".into()),
            error_message: None,
            created_at: now,
            updated_at: now,
        };

        let rendered = HtmlInvoiceRenderer.render(&transaction, &user, &subscription, &plan);
        let text = String::from_utf8(rendered).unwrap();
        assert!(text.contains("customer@example.com"));
        assert!(text.contains("Pro"));
        assert!(text.contains(&transaction.id.to_string()));
    }
}
