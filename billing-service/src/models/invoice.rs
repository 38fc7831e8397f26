//! Monthly invoice document and its payment ledger entries.

use mongodb::bson::DateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single payment applied against an invoice.
///
/// Entries are append-only: once recorded they are never mutated, removed
/// or reordered. Insertion order is payment order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Payment {
    pub amount: Decimal,
    pub date: DateTime,
    /// Caller-supplied key used to de-duplicate retried submissions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Public URL of the receipt PDF generated for this payment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_url: Option<String>,
}

/// Monthly invoice for one customer and one billing period.
///
/// `grand_total` is fixed at creation by the billing job (18% GST already
/// baked in) and is never mutated by payment recording. `total_paid` and
/// `remaining` are cached derived fields, recomputed from `payments` after
/// every append; `payments` is the source of truth.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Invoice {
    #[serde(rename = "_id")]
    pub id: String,
    pub customer_id: String,
    /// Billing period this invoice covers, e.g. "2026-08".
    pub period: String,
    pub grand_total: Decimal,
    pub payments: Vec<Payment>,
    pub total_paid: Decimal,
    pub remaining: Decimal,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Invoice {
    pub fn new(customer_id: String, period: String, grand_total: Decimal) -> Self {
        let now = DateTime::now();
        Self {
            id: Uuid::new_v4().to_string(),
            customer_id,
            period,
            grand_total,
            payments: Vec::new(),
            total_paid: Decimal::ZERO,
            remaining: grand_total,
            created_at: now,
            updated_at: now,
        }
    }

    /// Look up a previously recorded payment by its idempotency key.
    pub fn payment_by_key(&self, key: &str) -> Option<&Payment> {
        self.payments
            .iter()
            .find(|p| p.idempotency_key.as_deref() == Some(key))
    }
}
