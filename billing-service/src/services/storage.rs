//! Object storage returning a public URL for each stored blob.

use crate::config::StorageConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use service_core::async_trait::async_trait;
use service_core::error::AppError;
use std::path::PathBuf;
use tokio::fs;
use uuid::Uuid;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Store a blob under `key` and return its public URL.
    async fn store(&self, key: &str, data: Vec<u8>, content_type: &str)
        -> Result<String, AppError>;
}

/// Unique object key for a receipt PDF.
pub fn receipt_key() -> String {
    format!("{}-invoice.pdf", Uuid::new_v4())
}

pub struct LocalStorage {
    base_path: PathBuf,
    public_base_url: String,
}

impl LocalStorage {
    pub async fn new(
        base_path: impl Into<PathBuf>,
        public_base_url: String,
    ) -> Result<Self, AppError> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).await?;
        }
        Ok(Self {
            base_path,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn store(
        &self,
        key: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, AppError> {
        let path = self.base_path.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, data).await?;
        Ok(format!("{}/{}", self.public_base_url, key))
    }
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn store(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String, AppError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| AppError::DependencyFailure(format!("S3 upload failed: {}", e)))?;

        Ok(format!("https://{}.s3.amazonaws.com/{}", self.bucket, key))
    }
}

/// Pick the configured backend.
pub async fn from_config(config: &StorageConfig) -> Result<Box<dyn Storage>, AppError> {
    match config.backend.as_str() {
        "s3" => {
            let aws_config =
                aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
            let client = S3Client::new(&aws_config);
            Ok(Box::new(S3Storage::new(client, config.s3_bucket.clone())))
        }
        _ => Ok(Box::new(
            LocalStorage::new(config.local_path.clone(), config.public_base_url.clone()).await?,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_keys_are_unique_pdf_names() {
        let a = receipt_key();
        let b = receipt_key();
        assert_ne!(a, b);
        assert!(a.ends_with("-invoice.pdf"));
    }

    #[tokio::test]
    async fn local_storage_writes_and_returns_public_url() {
        let dir = std::env::temp_dir().join(format!("billing-storage-{}", Uuid::new_v4()));
        let storage = LocalStorage::new(&dir, "http://localhost:3005/files/".to_string())
            .await
            .expect("create storage");

        let url = storage
            .store("abc-invoice.pdf", b"%PDF".to_vec(), "application/pdf")
            .await
            .expect("store");

        assert_eq!(url, "http://localhost:3005/files/abc-invoice.pdf");
        let written = tokio::fs::read(dir.join("abc-invoice.pdf")).await.unwrap();
        assert_eq!(written, b"%PDF");

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
