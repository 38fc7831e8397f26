//! Client (customer) document.

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

/// A stored file reference (receipt PDFs and other uploads).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FileRecord {
    pub url: String,
    pub date: DateTime,
}

/// A GPS location reported for a client site.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub recorded_at: DateTime,
}

/// Client account.
///
/// `customer_id` is a short sequential identifier issued at registration and
/// is the key every other collection references; the Mongo `_id` stays
/// internal. `password_hash` is an argon2 PHC string and must never be
/// serialized into API responses (DTOs re-shape this document).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Client {
    #[serde(rename = "_id")]
    pub id: String,
    pub customer_id: String,
    pub name: String,
    pub business_name: String,
    pub email: String,
    pub password_hash: String,
    pub mobile: String,
    pub address: String,
    pub gst_number: Option<String>,
    pub role: String,
    #[serde(default)]
    pub file_urls: Vec<FileRecord>,
    #[serde(default)]
    pub locations: Vec<GeoPoint>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Client {
    pub fn latest_location(&self) -> Option<&GeoPoint> {
        self.locations.last()
    }
}
