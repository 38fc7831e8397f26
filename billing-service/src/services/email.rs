//! Email delivery for password-reset codes.

use crate::config::SmtpConfig;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use secrecy::ExposeSecret;
use service_core::async_trait::async_trait;
use service_core::error::AppError;
use std::time::Duration;

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_password_reset_code(&self, to_email: &str, code: &str) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct SmtpEmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl SmtpEmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let creds = Credentials::new(
            config.user.clone(),
            config.password.expose_secret().clone(),
        );

        let mailer = SmtpTransport::relay(&config.host)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e.to_string())))?
            .credentials(creds)
            .port(587)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, "Email service initialized");

        Ok(Self {
            mailer,
            from_email: config.from_email.clone(),
        })
    }
}

#[async_trait]
impl EmailProvider for SmtpEmailService {
    async fn send_password_reset_code(&self, to_email: &str, code: &str) -> Result<(), AppError> {
        let email = Message::builder()
            .from(self.from_email.parse().map_err(
                |e: lettre::address::AddressError| AppError::InternalError(e.into()),
            )?)
            .to(to_email.parse().map_err(
                |e: lettre::address::AddressError| AppError::InternalError(e.into()),
            )?)
            .subject("Password Reset OTP")
            .header(ContentType::TEXT_PLAIN)
            .body(format!(
                "Your OTP for password reset is: {}\n\nThe code expires in 5 minutes. \
                 If you didn't request this, please ignore this email.",
                code
            ))
            .map_err(|e| AppError::EmailError(e.to_string()))?;

        // Send in the blocking pool; the SMTP transport is synchronous.
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                // Never log the code itself.
                tracing::info!(to = %to_email, "Password reset email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e.to_string(), to = %to_email, "Failed to send email");
                Err(AppError::EmailError(e.to_string()))
            }
        }
    }
}

/// No-op provider for tests and local development without SMTP credentials.
#[derive(Clone)]
pub struct MockEmailService;

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_password_reset_code(&self, _to_email: &str, _code: &str) -> Result<(), AppError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    #[test]
    fn smtp_service_builds_from_config() {
        let config = SmtpConfig {
            host: "smtp.gmail.com".to_string(),
            user: "test@gmail.com".to_string(),
            password: Secret::new("app-password".to_string()),
            from_email: "test@gmail.com".to_string(),
        };

        assert!(SmtpEmailService::new(&config).is_ok());
    }
}
