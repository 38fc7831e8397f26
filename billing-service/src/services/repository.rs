//! MongoDB repositories for clients and invoices.

use crate::ledger;
use crate::models::{Client, FileRecord, GeoPoint, Invoice, Payment};
use anyhow::Result;
use futures::TryStreamExt;
use mongodb::bson::{doc, DateTime, Document};
use mongodb::options::{
    FindOneAndUpdateOptions, FindOneOptions, FindOptions, IndexOptions, ReturnDocument,
};
use mongodb::{Collection, Database, IndexModel};
use serde::Deserialize;
use service_core::async_trait::async_trait;

/// Persistence seam for client documents.
///
/// Handlers depend on this trait rather than the MongoDB repository so the
/// request flows can be exercised against in-memory stores.
#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn next_customer_id(&self) -> Result<String>;
    async fn create(&self, client: Client) -> Result<()>;
    async fn find_by_customer_id(&self, customer_id: &str) -> Result<Option<Client>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Client>>;
    async fn find_by_mobile(&self, mobile: &str) -> Result<Option<Client>>;
    async fn find_all(&self) -> Result<Vec<Client>>;
    async fn find_many(&self, customer_ids: &[String]) -> Result<Vec<Client>>;
    async fn update_fields(&self, customer_id: &str, fields: Document) -> Result<Option<Client>>;
    async fn set_password_hash(&self, email: &str, password_hash: &str) -> Result<bool>;
    async fn delete_by_customer_id(&self, customer_id: &str) -> Result<bool>;
    async fn push_file_record(&self, customer_id: &str, record: &FileRecord) -> Result<bool>;
    async fn push_location(&self, customer_id: &str, point: &GeoPoint) -> Result<bool>;
}

/// Persistence seam for invoice documents.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn find_all(&self) -> Result<Vec<Invoice>>;
    async fn find_by_customer_id(&self, customer_id: &str) -> Result<Option<Invoice>>;
    async fn append_payment(&self, invoice_id: &str, payment: &Payment)
        -> Result<Option<Invoice>>;
}

/// Document in the `counters` collection backing sequential customer ids.
#[derive(Debug, Deserialize)]
struct Counter {
    seq: i64,
}

/// Customer ids start here so they are always six digits.
const CUSTOMER_ID_BASE: i64 = 100000;

#[derive(Clone)]
pub struct ClientRepository {
    collection: Collection<Client>,
    counters: Collection<Counter>,
}

impl ClientRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("clients"),
            counters: db.collection("counters"),
        }
    }

    /// Unique indexes on the three login identifiers.
    pub async fn init_indexes(&self) -> Result<()> {
        let unique = |name: &str| {
            IndexOptions::builder()
                .name(name.to_string())
                .unique(true)
                .build()
        };

        let email_index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(unique("client_email_idx"))
            .build();
        let mobile_index = IndexModel::builder()
            .keys(doc! { "mobile": 1 })
            .options(unique("client_mobile_idx"))
            .build();
        let customer_id_index = IndexModel::builder()
            .keys(doc! { "customer_id": 1 })
            .options(unique("client_customer_id_idx"))
            .build();

        self.collection
            .create_indexes([email_index, mobile_index, customer_id_index], None)
            .await?;

        tracing::info!("Client indexes initialized");
        Ok(())
    }
}

#[async_trait]
impl ClientStore for ClientRepository {
    /// Allocate the next sequential customer id from the counters collection.
    async fn next_customer_id(&self) -> Result<String> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        let counter = self
            .counters
            .find_one_and_update(
                doc! { "_id": "customer_id" },
                doc! { "$inc": { "seq": 1 } },
                options,
            )
            .await?
            .ok_or_else(|| anyhow::anyhow!("counter upsert returned no document"))?;

        Ok((CUSTOMER_ID_BASE + counter.seq).to_string())
    }

    async fn create(&self, client: Client) -> Result<()> {
        self.collection.insert_one(client, None).await?;
        Ok(())
    }

    async fn find_by_customer_id(&self, customer_id: &str) -> Result<Option<Client>> {
        let client = self
            .collection
            .find_one(doc! { "customer_id": customer_id }, None)
            .await?;
        Ok(client)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Client>> {
        let client = self
            .collection
            .find_one(doc! { "email": email }, None)
            .await?;
        Ok(client)
    }

    async fn find_by_mobile(&self, mobile: &str) -> Result<Option<Client>> {
        let client = self
            .collection
            .find_one(doc! { "mobile": mobile }, None)
            .await?;
        Ok(client)
    }

    async fn find_all(&self) -> Result<Vec<Client>> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": 1 })
            .build();
        let cursor = self.collection.find(None, options).await?;
        let clients: Vec<Client> = cursor.try_collect().await?;
        Ok(clients)
    }

    async fn find_many(&self, customer_ids: &[String]) -> Result<Vec<Client>> {
        let cursor = self
            .collection
            .find(doc! { "customer_id": { "$in": customer_ids } }, None)
            .await?;
        let clients: Vec<Client> = cursor.try_collect().await?;
        Ok(clients)
    }

    /// Apply a partial `$set` built by the handler; returns the updated doc.
    async fn update_fields(&self, customer_id: &str, fields: Document) -> Result<Option<Client>> {
        let mut set = fields;
        set.insert("updated_at", DateTime::now());

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let client = self
            .collection
            .find_one_and_update(
                doc! { "customer_id": customer_id },
                doc! { "$set": set },
                options,
            )
            .await?;
        Ok(client)
    }

    async fn set_password_hash(&self, email: &str, password_hash: &str) -> Result<bool> {
        let result = self
            .collection
            .update_one(
                doc! { "email": email },
                doc! { "$set": {
                    "password_hash": password_hash,
                    "updated_at": DateTime::now(),
                } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn delete_by_customer_id(&self, customer_id: &str) -> Result<bool> {
        let result = self
            .collection
            .delete_one(doc! { "customer_id": customer_id }, None)
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn push_file_record(&self, customer_id: &str, record: &FileRecord) -> Result<bool> {
        let result = self
            .collection
            .update_one(
                doc! { "customer_id": customer_id },
                doc! {
                    "$push": { "file_urls": mongodb::bson::to_bson(record)? },
                    "$set": { "updated_at": DateTime::now() },
                },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn push_location(&self, customer_id: &str, point: &GeoPoint) -> Result<bool> {
        let result = self
            .collection
            .update_one(
                doc! { "customer_id": customer_id },
                doc! {
                    "$push": { "locations": mongodb::bson::to_bson(point)? },
                    "$set": { "updated_at": DateTime::now() },
                },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }
}

#[derive(Clone)]
pub struct InvoiceRepository {
    collection: Collection<Invoice>,
}

impl InvoiceRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("invoices"),
        }
    }

    /// One invoice per customer per billing period.
    pub async fn init_indexes(&self) -> Result<()> {
        let period_index = IndexModel::builder()
            .keys(doc! { "customer_id": 1, "period": 1 })
            .options(
                IndexOptions::builder()
                    .name("invoice_customer_period_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        self.collection.create_indexes([period_index], None).await?;

        tracing::info!("Invoice indexes initialized");
        Ok(())
    }
}

#[async_trait]
impl InvoiceStore for InvoiceRepository {
    async fn find_all(&self) -> Result<Vec<Invoice>> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        let cursor = self.collection.find(None, options).await?;
        let invoices: Vec<Invoice> = cursor.try_collect().await?;
        Ok(invoices)
    }

    /// The current (most recently created) invoice for a customer.
    async fn find_by_customer_id(&self, customer_id: &str) -> Result<Option<Invoice>> {
        let options = FindOneOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        let invoice = self
            .collection
            .find_one(doc! { "customer_id": customer_id }, options)
            .await?;
        Ok(invoice)
    }

    /// Atomically append a payment to the customer's current invoice.
    ///
    /// The append is a single conditional `find_one_and_update`: concurrent
    /// submissions serialize at the document level, so no payment is lost to
    /// a read-modify-write race, and a `$ne` guard on the idempotency key
    /// refuses a second append for a retried submission. Returns the
    /// post-append document with refreshed totals, or `None` when the filter
    /// matched nothing (unknown customer, or duplicate key).
    async fn append_payment(
        &self,
        invoice_id: &str,
        payment: &Payment,
    ) -> Result<Option<Invoice>> {
        let mut filter = doc! { "_id": invoice_id };
        if let Some(key) = payment.idempotency_key.as_deref() {
            filter.insert("payments.idempotency_key", doc! { "$ne": key });
        }

        let update = doc! {
            "$push": { "payments": mongodb::bson::to_bson(payment)? },
            "$set": { "updated_at": DateTime::now() },
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let updated = self
            .collection
            .find_one_and_update(filter, update, options)
            .await?;

        let Some(mut invoice) = updated else {
            return Ok(None);
        };

        // Refresh the cached derived fields from the post-append document.
        // The cache is last-writer-wins under concurrency but always
        // recomputable from `payments`.
        let totals = ledger::compute_totals(&invoice);
        invoice.total_paid = totals.total_paid;
        invoice.remaining = totals.remaining;

        self.collection
            .update_one(
                doc! { "_id": invoice_id },
                doc! { "$set": {
                    "total_paid": mongodb::bson::to_bson(&totals.total_paid)?,
                    "remaining": mongodb::bson::to_bson(&totals.remaining)?,
                } },
                None,
            )
            .await?;

        Ok(Some(invoice))
    }
}
