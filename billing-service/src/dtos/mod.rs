//! Request and response shapes for the REST surface.
//!
//! Documents never cross the wire directly: responses are re-shaped here so
//! the password hash and Mongo internals stay out of API payloads.

use crate::models::{Client, FileRecord, GeoPoint, Invoice, Payment};
use mongodb::bson::DateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

fn rfc3339(date: DateTime) -> String {
    date.try_to_rfc3339_string().unwrap_or_default()
}

// ============================================================================
// Client requests
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterClientRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Business name is required"))]
    pub business_name: String,
    #[validate(email(message = "Please include a valid email"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be 8 or more characters"))]
    pub password: String,
    #[validate(length(equal = 10, message = "Please include a valid mobile number"))]
    pub mobile: String,
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
    pub gst_number: Option<String>,
}

/// Login identifies a client by email, mobile or customer id, in that order.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub customer_id: Option<String>,
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateClientRequest {
    pub name: Option<String>,
    pub business_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 8))]
    pub password: Option<String>,
    #[validate(length(equal = 10))]
    pub mobile: Option<String>,
    pub address: Option<String>,
    pub gst_number: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BatchClientsRequest {
    #[validate(length(min = 1, message = "customer_ids must be a non-empty array"))]
    pub customer_ids: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetRequest {
    #[validate(email(message = "Please include a valid email"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetConfirmRequest {
    #[validate(email(message = "Please include a valid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "OTP code is required"))]
    pub code: String,
    #[validate(length(min = 8, message = "Password must be 8 or more characters"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddLocationRequest {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
}

// ============================================================================
// Invoice requests
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    pub amount: Decimal,
    /// Optional de-duplication key for safe retries.
    pub idempotency_key: Option<String>,
}

// ============================================================================
// Client responses
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ClientResponse {
    pub customer_id: String,
    pub name: String,
    pub business_name: String,
    pub email: String,
    pub mobile: String,
    pub address: String,
    pub gst_number: Option<String>,
    pub role: String,
    pub file_urls: Vec<FileRecordResponse>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Client> for ClientResponse {
    fn from(client: Client) -> Self {
        Self {
            customer_id: client.customer_id,
            name: client.name,
            business_name: client.business_name,
            email: client.email,
            mobile: client.mobile,
            address: client.address,
            gst_number: client.gst_number,
            role: client.role,
            file_urls: client.file_urls.into_iter().map(Into::into).collect(),
            created_at: rfc3339(client.created_at),
            updated_at: rfc3339(client.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClientSummaryResponse {
    pub name: String,
    pub business_name: String,
}

/// The customer-detail fields printed on an invoice.
#[derive(Debug, Serialize)]
pub struct BillingDetailsResponse {
    pub name: String,
    pub mobile: String,
    pub gst_number: Option<String>,
    pub address: String,
    pub email: String,
}

impl From<Client> for BillingDetailsResponse {
    fn from(client: Client) -> Self {
        Self {
            name: client.name,
            mobile: client.mobile,
            gst_number: client.gst_number,
            address: client.address,
            email: client.email,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FileRecordResponse {
    pub url: String,
    pub date: String,
}

impl From<FileRecord> for FileRecordResponse {
    fn from(record: FileRecord) -> Self {
        Self {
            url: record.url,
            date: rfc3339(record.date),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClientFilesResponse {
    pub customer_id: String,
    pub file_urls: Vec<FileRecordResponse>,
}

#[derive(Debug, Serialize)]
pub struct LocationResponse {
    pub latitude: f64,
    pub longitude: f64,
    pub recorded_at: String,
}

impl From<&GeoPoint> for LocationResponse {
    fn from(point: &GeoPoint) -> Self {
        Self {
            latitude: point.latitude,
            longitude: point.longitude,
            recorded_at: rfc3339(point.recorded_at),
        }
    }
}

// ============================================================================
// Invoice responses
// ============================================================================

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub amount: Decimal,
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_url: Option<String>,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            amount: payment.amount,
            date: rfc3339(payment.date),
            receipt_url: payment.receipt_url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub customer_id: String,
    pub period: String,
    pub grand_total: Decimal,
    pub payments: Vec<PaymentResponse>,
    pub total_paid: Decimal,
    pub remaining: Decimal,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Invoice> for InvoiceResponse {
    fn from(invoice: Invoice) -> Self {
        Self {
            customer_id: invoice.customer_id,
            period: invoice.period,
            grand_total: invoice.grand_total,
            payments: invoice.payments.into_iter().map(Into::into).collect(),
            total_paid: invoice.total_paid,
            remaining: invoice.remaining,
            created_at: rfc3339(invoice.created_at),
            updated_at: rfc3339(invoice.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecordPaymentResponse {
    pub total_paid: Decimal,
    pub grand_total: Decimal,
    pub remaining: Decimal,
    pub receipt_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadReceiptResponse {
    pub message: String,
    pub receipt_url: String,
}
