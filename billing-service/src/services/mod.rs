pub mod email;
pub mod metrics;
pub mod otp;
pub mod pdf;
pub mod receipt;
pub mod repository;
pub mod storage;

pub use email::{EmailProvider, MockEmailService, SmtpEmailService};
pub use metrics::{get_metrics, init_metrics};
pub use otp::OtpStore;
pub use pdf::PdfRenderer;
pub use repository::{ClientRepository, ClientStore, InvoiceRepository, InvoiceStore};
pub use storage::{LocalStorage, S3Storage, Storage};
