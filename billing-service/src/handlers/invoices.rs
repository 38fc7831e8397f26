//! Invoice handlers: queries, payment recording and receipt uploads.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use mongodb::bson::DateTime;

use crate::{
    dtos::{InvoiceResponse, RecordPaymentRequest, RecordPaymentResponse, UploadReceiptResponse},
    ledger::{self, LedgerError},
    models::{FileRecord, Invoice, Payment},
    services::metrics::record_payment_outcome,
    services::receipt::{build_receipt_html, ReceiptDetails},
    services::storage,
    services::{ClientStore as _, InvoiceStore as _},
    AppState,
};
use service_core::error::AppError;

fn ledger_error(err: LedgerError) -> AppError {
    match err {
        LedgerError::InvalidAmount(_) | LedgerError::ExceedsRemaining { .. } => {
            AppError::BadRequest(anyhow::anyhow!(err.to_string()))
        }
        LedgerError::DuplicatePayment(_) => AppError::Conflict(anyhow::anyhow!(err.to_string())),
    }
}

/// GET /invoices
pub async fn list_invoices(
    State(state): State<AppState>,
) -> Result<Json<Vec<InvoiceResponse>>, AppError> {
    let invoices = state.invoices.find_all().await?;
    if invoices.is_empty() {
        return Err(AppError::NotFound(anyhow::anyhow!("No invoices found")));
    }
    Ok(Json(invoices.into_iter().map(Into::into).collect()))
}

/// GET /invoices/:customer_id
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let invoice = find_invoice(&state, &customer_id).await?;
    Ok(Json(InvoiceResponse::from(invoice)))
}

/// Record a payment against the customer's current invoice.
///
/// POST /invoices/:customer_id/payments
///
/// The receipt PDF is rendered and stored before anything is persisted, so a
/// collaborator failure leaves the ledger untouched. The append itself is a
/// single conditional update at the persistence layer; the idempotency key,
/// when supplied, makes retries safe.
#[tracing::instrument(
    skip(state, payload),
    fields(customer_id = %customer_id, amount = %payload.amount)
)]
pub async fn record_payment(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    Json(payload): Json<RecordPaymentRequest>,
) -> Result<Json<RecordPaymentResponse>, AppError> {
    let client = state
        .clients
        .find_by_customer_id(&customer_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "Customer not found for customer id: {}",
                customer_id
            ))
        })?;

    let invoice = find_invoice(&state, &customer_id).await?;

    // Retried submission: return the stored outcome, never a second entry.
    if let Some(key) = payload.idempotency_key.as_deref() {
        if let Some(existing) = invoice.payment_by_key(key) {
            record_payment_outcome("duplicate");
            return Ok(Json(duplicate_response(&invoice, existing.receipt_url.clone())));
        }
    }

    let payment_date = Utc::now();

    // Dry-run the append on a scratch copy: the same validation, policy
    // arithmetic and total recompute that the persisted append will apply.
    // The mutation is discarded; only the effective amount and the
    // prospective totals survive to the receipt.
    let current = ledger::compute_totals(&invoice);
    let mut scratch = invoice.clone();
    let totals = ledger::record_payment(
        &mut scratch,
        payload.amount,
        DateTime::from_chrono(payment_date),
        state.config.overpayment_policy,
        payload.idempotency_key.clone(),
        None,
    )
    .map_err(|e| {
        record_payment_outcome("rejected");
        ledger_error(e)
    })?;
    let amount = totals.total_paid - current.total_paid;

    let html = build_receipt_html(
        &state.config.company,
        &client,
        &ReceiptDetails {
            customer_id: &customer_id,
            paid_amount: amount,
            grand_total: invoice.grand_total,
            totals,
            payment_date,
        },
    );
    let pdf = state.renderer.render(&html).await?;
    let receipt_url = state
        .storage
        .store(&storage::receipt_key(), pdf, "application/pdf")
        .await?;

    let payment = Payment {
        amount,
        date: DateTime::from_chrono(payment_date),
        idempotency_key: payload.idempotency_key.clone(),
        receipt_url: Some(receipt_url.clone()),
    };

    let updated = state
        .invoices
        .append_payment(&invoice.id, &payment)
        .await?;

    let Some(updated) = updated else {
        // The conditional filter matched nothing: a concurrent retry with
        // the same idempotency key won the append, or the invoice vanished.
        if let Some(key) = payload.idempotency_key.as_deref() {
            let invoice = find_invoice(&state, &customer_id).await?;
            if let Some(existing) = invoice.payment_by_key(key) {
                record_payment_outcome("duplicate");
                return Ok(Json(duplicate_response(&invoice, existing.receipt_url.clone())));
            }
        }
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Payment could not be recorded"
        )));
    };

    let attached = state
        .clients
        .push_file_record(
            &customer_id,
            &FileRecord {
                url: receipt_url.clone(),
                date: payment.date,
            },
        )
        .await?;
    if !attached {
        // Client was deleted between the lookup and the push; the payment
        // itself is recorded.
        tracing::warn!(url = %receipt_url, "Receipt URL could not be attached to the client");
    }

    record_payment_outcome("recorded");
    tracing::info!(
        total_paid = %updated.total_paid,
        remaining = %updated.remaining,
        "Payment recorded"
    );

    Ok(Json(RecordPaymentResponse {
        total_paid: updated.total_paid,
        grand_total: updated.grand_total,
        remaining: updated.remaining,
        receipt_url: Some(receipt_url),
    }))
}

fn duplicate_response(invoice: &Invoice, receipt_url: Option<String>) -> RecordPaymentResponse {
    let totals = ledger::compute_totals(invoice);
    RecordPaymentResponse {
        total_paid: totals.total_paid,
        grand_total: invoice.grand_total,
        remaining: totals.remaining,
        receipt_url,
    }
}

/// Convert an uploaded HTML file to a stored PDF on the client's file list.
///
/// POST /invoices/:customer_id/receipts (multipart, field "file")
#[tracing::instrument(skip(state, multipart), fields(customer_id = %customer_id))]
pub async fn upload_receipt(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadReceiptResponse>), AppError> {
    let mut html: Option<String> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Malformed multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Failed to read file: {}", e)))?;
            html = Some(String::from_utf8_lossy(&bytes).into_owned());
            break;
        }
    }

    let html =
        html.ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("No file uploaded")))?;

    if state
        .clients
        .find_by_customer_id(&customer_id)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound(anyhow::anyhow!("Client not found")));
    }

    let pdf = state.renderer.render(&html).await?;
    let receipt_url = state
        .storage
        .store(&storage::receipt_key(), pdf, "application/pdf")
        .await?;

    let attached = state
        .clients
        .push_file_record(
            &customer_id,
            &FileRecord {
                url: receipt_url.clone(),
                date: DateTime::now(),
            },
        )
        .await?;
    if !attached {
        tracing::warn!(url = %receipt_url, "Receipt URL could not be attached to the client");
    }

    tracing::info!(url = %receipt_url, "Receipt PDF stored");

    Ok((
        StatusCode::OK,
        Json(UploadReceiptResponse {
            message: "PDF uploaded successfully".to_string(),
            receipt_url,
        }),
    ))
}

async fn find_invoice(state: &AppState, customer_id: &str) -> Result<Invoice, AppError> {
    state
        .invoices
        .find_by_customer_id(customer_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "Invoice not found for customer id: {}",
                customer_id
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CompanyConfig, Config, DatabaseConfig, RedisConfig, RendererConfig, ServerConfig,
        SmtpConfig, StorageConfig,
    };
    use crate::ledger::OverpaymentPolicy;
    use crate::models::{Client, GeoPoint};
    use crate::services::{
        ClientStore, InvoiceStore, MockEmailService, OtpStore, PdfRenderer, Storage,
    };
    use mongodb::bson::Document;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use secrecy::Secret;
    use service_core::async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{method, path as request_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FakeClients {
        client: Option<Client>,
        pushed: Mutex<Vec<FileRecord>>,
        push_matches: bool,
    }

    impl FakeClients {
        fn with(client: Option<Client>) -> Self {
            Self {
                client,
                pushed: Mutex::new(Vec::new()),
                push_matches: true,
            }
        }
    }

    #[async_trait]
    impl ClientStore for FakeClients {
        async fn find_by_customer_id(&self, customer_id: &str) -> anyhow::Result<Option<Client>> {
            Ok(self.client.clone().filter(|c| c.customer_id == customer_id))
        }

        async fn push_file_record(
            &self,
            _customer_id: &str,
            record: &FileRecord,
        ) -> anyhow::Result<bool> {
            if self.push_matches {
                self.pushed.lock().unwrap().push(record.clone());
            }
            Ok(self.push_matches)
        }

        async fn next_customer_id(&self) -> anyhow::Result<String> {
            unimplemented!()
        }
        async fn create(&self, _client: Client) -> anyhow::Result<()> {
            unimplemented!()
        }
        async fn find_by_email(&self, _email: &str) -> anyhow::Result<Option<Client>> {
            unimplemented!()
        }
        async fn find_by_mobile(&self, _mobile: &str) -> anyhow::Result<Option<Client>> {
            unimplemented!()
        }
        async fn find_all(&self) -> anyhow::Result<Vec<Client>> {
            unimplemented!()
        }
        async fn find_many(&self, _customer_ids: &[String]) -> anyhow::Result<Vec<Client>> {
            unimplemented!()
        }
        async fn update_fields(
            &self,
            _customer_id: &str,
            _fields: Document,
        ) -> anyhow::Result<Option<Client>> {
            unimplemented!()
        }
        async fn set_password_hash(&self, _email: &str, _hash: &str) -> anyhow::Result<bool> {
            unimplemented!()
        }
        async fn delete_by_customer_id(&self, _customer_id: &str) -> anyhow::Result<bool> {
            unimplemented!()
        }
        async fn push_location(
            &self,
            _customer_id: &str,
            _point: &GeoPoint,
        ) -> anyhow::Result<bool> {
            unimplemented!()
        }
    }

    struct FakeInvoices {
        invoice: Mutex<Option<Invoice>>,
        appended: Mutex<Vec<Payment>>,
    }

    impl FakeInvoices {
        fn with(invoice: Option<Invoice>) -> Self {
            Self {
                invoice: Mutex::new(invoice),
                appended: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl InvoiceStore for FakeInvoices {
        async fn find_all(&self) -> anyhow::Result<Vec<Invoice>> {
            Ok(self.invoice.lock().unwrap().clone().into_iter().collect())
        }

        async fn find_by_customer_id(
            &self,
            customer_id: &str,
        ) -> anyhow::Result<Option<Invoice>> {
            Ok(self
                .invoice
                .lock()
                .unwrap()
                .clone()
                .filter(|i| i.customer_id == customer_id))
        }

        async fn append_payment(
            &self,
            invoice_id: &str,
            payment: &Payment,
        ) -> anyhow::Result<Option<Invoice>> {
            let mut guard = self.invoice.lock().unwrap();
            let Some(invoice) = guard.as_mut() else {
                return Ok(None);
            };
            if invoice.id != invoice_id {
                return Ok(None);
            }
            if let Some(key) = payment.idempotency_key.as_deref() {
                if invoice.payment_by_key(key).is_some() {
                    return Ok(None);
                }
            }
            invoice.payments.push(payment.clone());
            let totals = ledger::compute_totals(invoice);
            invoice.total_paid = totals.total_paid;
            invoice.remaining = totals.remaining;
            self.appended.lock().unwrap().push(payment.clone());
            Ok(Some(invoice.clone()))
        }
    }

    #[derive(Default)]
    struct FakeStorage {
        stored: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Storage for FakeStorage {
        async fn store(
            &self,
            key: &str,
            _data: Vec<u8>,
            _content_type: &str,
        ) -> Result<String, AppError> {
            self.stored.lock().unwrap().push(key.to_string());
            Ok(format!("http://files.test/{}", key))
        }
    }

    fn sample_client() -> Client {
        let now = DateTime::now();
        Client {
            id: "c-1".to_string(),
            customer_id: "100001".to_string(),
            name: "Asha Traders".to_string(),
            business_name: "Asha Dry Fruits".to_string(),
            email: "asha@example.com".to_string(),
            password_hash: "$argon2id$...".to_string(),
            mobile: "9810000000".to_string(),
            address: "Khari Baoli, Delhi".to_string(),
            gst_number: None,
            role: "client".to_string(),
            file_urls: vec![],
            locations: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_invoice(grand_total: Decimal) -> Invoice {
        Invoice::new("100001".to_string(), "2026-08".to_string(), grand_total)
    }

    fn test_config(renderer_url: &str) -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseConfig {
                url: Secret::new("mongodb://localhost:27017".to_string()),
                db_name: "billing_test".to_string(),
            },
            redis: RedisConfig {
                url: Secret::new("redis://localhost:6379".to_string()),
            },
            smtp: SmtpConfig {
                host: "localhost".to_string(),
                user: String::new(),
                password: Secret::new(String::new()),
                from_email: String::new(),
            },
            renderer: RendererConfig {
                base_url: renderer_url.to_string(),
            },
            storage: StorageConfig {
                backend: "local".to_string(),
                s3_bucket: String::new(),
                local_path: "./storage".to_string(),
                public_base_url: "http://localhost/files".to_string(),
            },
            company: CompanyConfig {
                name: "Acme Cold Storage".to_string(),
                email: String::new(),
                phone: String::new(),
                gstin: String::new(),
                address: String::new(),
                logo_url: String::new(),
            },
            overpayment_policy: OverpaymentPolicy::Allow,
            service_name: "billing-service".to_string(),
        }
    }

    fn state_with(
        clients: Arc<FakeClients>,
        invoices: Arc<FakeInvoices>,
        storage: Arc<FakeStorage>,
        renderer_url: &str,
    ) -> AppState {
        let config = test_config(renderer_url);
        let renderer = PdfRenderer::new(&config.renderer);
        AppState {
            config,
            clients,
            invoices,
            otp: OtpStore::new(redis::Client::open("redis://127.0.0.1:6379").expect("redis url")),
            email: Arc::new(MockEmailService),
            renderer,
            storage,
        }
    }

    fn pay(amount: Decimal, key: Option<&str>) -> Json<RecordPaymentRequest> {
        Json(RecordPaymentRequest {
            amount,
            idempotency_key: key.map(String::from),
        })
    }

    async fn pdf_server(status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(request_path("/forms/chromium/convert/html"))
            .respond_with(ResponseTemplate::new(status).set_body_bytes(b"%PDF".to_vec()))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn unknown_customer_is_not_found() {
        let clients = Arc::new(FakeClients::with(None));
        let invoices = Arc::new(FakeInvoices::with(None));
        let storage = Arc::new(FakeStorage::default());
        let state = state_with(clients, invoices, storage, "http://127.0.0.1:1");

        let err = record_payment(State(state), Path("999999".to_string()), pay(dec!(100), None))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn customer_without_invoice_is_not_found() {
        let clients = Arc::new(FakeClients::with(Some(sample_client())));
        let invoices = Arc::new(FakeInvoices::with(None));
        let storage = Arc::new(FakeStorage::default());
        let state = state_with(clients, invoices, storage, "http://127.0.0.1:1");

        let err = record_payment(State(state), Path("100001".to_string()), pay(dec!(100), None))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn non_positive_amount_is_rejected_before_any_side_effect() {
        let clients = Arc::new(FakeClients::with(Some(sample_client())));
        let invoices = Arc::new(FakeInvoices::with(Some(sample_invoice(dec!(1000)))));
        let storage = Arc::new(FakeStorage::default());
        let state = state_with(
            clients.clone(),
            invoices.clone(),
            storage.clone(),
            "http://127.0.0.1:1",
        );

        let err = record_payment(State(state), Path("100001".to_string()), pay(dec!(0), None))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(invoices.appended.lock().unwrap().is_empty());
        assert!(storage.stored.lock().unwrap().is_empty());
        assert!(clients.pushed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_replays_the_stored_outcome() {
        let mut invoice = sample_invoice(dec!(1000));
        ledger::record_payment(
            &mut invoice,
            dec!(300),
            DateTime::now(),
            OverpaymentPolicy::Allow,
            Some("retry-1".to_string()),
            Some("http://files.test/first.pdf".to_string()),
        )
        .expect("seed payment");

        let clients = Arc::new(FakeClients::with(Some(sample_client())));
        let invoices = Arc::new(FakeInvoices::with(Some(invoice)));
        let storage = Arc::new(FakeStorage::default());
        // The renderer is unreachable: a replay must answer without it.
        let state = state_with(
            clients.clone(),
            invoices.clone(),
            storage.clone(),
            "http://127.0.0.1:1",
        );

        let response = record_payment(
            State(state),
            Path("100001".to_string()),
            pay(dec!(300), Some("retry-1")),
        )
        .await
        .expect("replay should succeed")
        .0;

        assert_eq!(response.total_paid, dec!(300));
        assert_eq!(response.remaining, dec!(700));
        assert_eq!(response.receipt_url.as_deref(), Some("http://files.test/first.pdf"));
        assert!(invoices.appended.lock().unwrap().is_empty());
        assert!(storage.stored.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn renderer_failure_leaves_the_ledger_untouched() {
        let server = pdf_server(500).await;
        let clients = Arc::new(FakeClients::with(Some(sample_client())));
        let invoices = Arc::new(FakeInvoices::with(Some(sample_invoice(dec!(1000)))));
        let storage = Arc::new(FakeStorage::default());
        let state = state_with(
            clients.clone(),
            invoices.clone(),
            storage.clone(),
            &server.uri(),
        );

        let err = record_payment(State(state), Path("100001".to_string()), pay(dec!(400), None))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::DependencyFailure(_)));
        assert!(invoices.appended.lock().unwrap().is_empty());
        assert!(storage.stored.lock().unwrap().is_empty());
        assert!(clients.pushed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn recorded_payment_updates_totals_and_attaches_the_receipt() {
        let server = pdf_server(200).await;
        let clients = Arc::new(FakeClients::with(Some(sample_client())));
        let invoices = Arc::new(FakeInvoices::with(Some(sample_invoice(dec!(1000)))));
        let storage = Arc::new(FakeStorage::default());
        let state = state_with(
            clients.clone(),
            invoices.clone(),
            storage.clone(),
            &server.uri(),
        );

        let response = record_payment(State(state), Path("100001".to_string()), pay(dec!(400), None))
            .await
            .expect("payment should succeed")
            .0;

        assert_eq!(response.total_paid, dec!(400));
        assert_eq!(response.grand_total, dec!(1000));
        assert_eq!(response.remaining, dec!(600));
        let receipt_url = response.receipt_url.expect("receipt url");
        assert!(receipt_url.ends_with("-invoice.pdf"));

        let appended = invoices.appended.lock().unwrap();
        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0].amount, dec!(400));

        let pushed = clients.pushed.lock().unwrap();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].url, receipt_url);
    }

    #[tokio::test]
    async fn payment_survives_client_deletion_before_receipt_attach() {
        let server = pdf_server(200).await;
        let mut fake = FakeClients::with(Some(sample_client()));
        fake.push_matches = false;
        let clients = Arc::new(fake);
        let invoices = Arc::new(FakeInvoices::with(Some(sample_invoice(dec!(1000)))));
        let storage = Arc::new(FakeStorage::default());
        let state = state_with(
            clients.clone(),
            invoices.clone(),
            storage.clone(),
            &server.uri(),
        );

        let response = record_payment(State(state), Path("100001".to_string()), pay(dec!(250), None))
            .await
            .expect("payment should still succeed")
            .0;

        assert_eq!(response.total_paid, dec!(250));
        assert_eq!(invoices.appended.lock().unwrap().len(), 1);
        assert!(clients.pushed.lock().unwrap().is_empty());
    }
}
