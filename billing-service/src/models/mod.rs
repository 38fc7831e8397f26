pub mod client;
pub mod invoice;

pub use client::{Client, FileRecord, GeoPoint};
pub use invoice::{Invoice, Payment};
