//! HTML-to-PDF rendering via a Gotenberg-compatible HTTP service.
//!
//! The original system drove a headless browser in-process; here rendering
//! is a collaborator behind `render(html) -> bytes`, and any failure
//! surfaces as a `DependencyFailure` without retry.

use crate::config::RendererConfig;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use service_core::error::AppError;
use std::time::Duration;

#[derive(Clone)]
pub struct PdfRenderer {
    client: Client,
    base_url: String,
}

impl PdfRenderer {
    pub fn new(config: &RendererConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Render an HTML document to a PDF byte buffer.
    pub async fn render(&self, html: &str) -> Result<Vec<u8>, AppError> {
        let part = Part::text(html.to_string())
            .file_name("index.html")
            .mime_str("text/html")
            .map_err(|e| AppError::InternalError(e.into()))?;
        let form = Form::new().part("files", part);

        let url = format!("{}/forms/chromium/convert/html", self.base_url);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "PDF renderer unreachable");
                AppError::DependencyFailure(format!("PDF renderer unreachable: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "PDF renderer returned an error");
            return Err(AppError::DependencyFailure(format!(
                "PDF renderer returned {}: {}",
                status, body
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::DependencyFailure(format!("PDF renderer body error: {}", e)))?;

        Ok(bytes.to_vec())
    }
}
