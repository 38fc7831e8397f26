//! Invoice payment ledger.
//!
//! Owns the arithmetic over an invoice's payment sequence: validating a
//! submitted amount against the configured overpayment policy, appending the
//! entry, and recomputing the cached `total_paid` / `remaining` fields
//! immediately after the append. All functions here are pure over the
//! in-memory invoice; persistence is the repository's concern.

use mongodb::bson::DateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Invoice, Payment};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid payment amount {0}: must be greater than zero")]
    InvalidAmount(Decimal),

    #[error("payment of {amount} exceeds remaining balance of {remaining}")]
    ExceedsRemaining { amount: Decimal, remaining: Decimal },

    #[error("a payment with idempotency key '{0}' was already recorded")]
    DuplicatePayment(String),
}

/// What to do when a payment would push `remaining` below zero.
///
/// The original system allowed unbounded overpayment (negative remaining),
/// so `Allow` is the default; `Reject` and `Clamp` are opt-in via
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverpaymentPolicy {
    #[default]
    Allow,
    Reject,
    Clamp,
}

impl OverpaymentPolicy {
    pub fn parse(s: &str) -> Self {
        match s {
            "reject" => OverpaymentPolicy::Reject,
            "clamp" => OverpaymentPolicy::Clamp,
            _ => OverpaymentPolicy::Allow,
        }
    }
}

/// Derived totals for an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Totals {
    pub total_paid: Decimal,
    /// `grand_total - total_paid`; negative when overpaid, never clamped.
    pub remaining: Decimal,
}

/// Sum the payment sequence in append order and derive the balance.
pub fn compute_totals(invoice: &Invoice) -> Totals {
    let total_paid: Decimal = invoice.payments.iter().map(|p| p.amount).sum();
    Totals {
        total_paid,
        remaining: invoice.grand_total - total_paid,
    }
}

/// Reject non-positive amounts before anything is appended.
pub fn validate_amount(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(())
}

/// Apply the overpayment policy, returning the amount actually recorded.
pub fn effective_amount(
    policy: OverpaymentPolicy,
    amount: Decimal,
    remaining: Decimal,
) -> Result<Decimal, LedgerError> {
    match policy {
        OverpaymentPolicy::Allow => Ok(amount),
        OverpaymentPolicy::Reject => {
            if amount > remaining {
                Err(LedgerError::ExceedsRemaining { amount, remaining })
            } else {
                Ok(amount)
            }
        }
        OverpaymentPolicy::Clamp => {
            // A settled (or overpaid) invoice leaves nothing to clamp to.
            if remaining <= Decimal::ZERO {
                return Err(LedgerError::ExceedsRemaining { amount, remaining });
            }
            Ok(amount.min(remaining))
        }
    }
}

/// Append a payment and recompute the cached totals.
///
/// The invoice is left untouched on any error. Each successful call appends
/// exactly one entry: recording is deliberately not idempotent unless the
/// caller supplies an idempotency key, in which case a key already present
/// among `payments` is refused.
pub fn record_payment(
    invoice: &mut Invoice,
    amount: Decimal,
    date: DateTime,
    policy: OverpaymentPolicy,
    idempotency_key: Option<String>,
    receipt_url: Option<String>,
) -> Result<Totals, LedgerError> {
    validate_amount(amount)?;

    if let Some(key) = idempotency_key.as_deref() {
        if invoice.payment_by_key(key).is_some() {
            return Err(LedgerError::DuplicatePayment(key.to_string()));
        }
    }

    let remaining = compute_totals(invoice).remaining;
    let amount = effective_amount(policy, amount, remaining)?;

    invoice.payments.push(Payment {
        amount,
        date,
        idempotency_key,
        receipt_url,
    });

    // The recompute hook: cached fields are refreshed right after the
    // append, before the caller persists the document.
    let totals = compute_totals(invoice);
    invoice.total_paid = totals.total_paid;
    invoice.remaining = totals.remaining;
    invoice.updated_at = DateTime::now();

    Ok(totals)
}
