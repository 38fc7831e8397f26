use crate::ledger::OverpaymentPolicy;
use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub smtp: SmtpConfig,
    pub renderer: RendererConfig,
    pub storage: StorageConfig,
    pub company: CompanyConfig,
    pub overpayment_policy: OverpaymentPolicy,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RedisConfig {
    pub url: Secret<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub user: String,
    pub password: Secret<String>,
    pub from_email: String,
}

/// HTML-to-PDF rendering collaborator (Gotenberg-compatible HTTP API).
#[derive(Deserialize, Clone, Debug)]
pub struct RendererConfig {
    pub base_url: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct StorageConfig {
    /// "s3" or "local".
    pub backend: String,
    pub s3_bucket: String,
    pub local_path: String,
    /// Base URL under which locally stored files are publicly served.
    pub public_base_url: String,
}

/// Company identity printed on receipt PDFs.
#[derive(Deserialize, Clone, Debug)]
pub struct CompanyConfig {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub gstin: String,
    pub address: String,
    pub logo_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("BILLING_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("BILLING_SERVICE_PORT")
            .unwrap_or_else(|_| "3005".to_string())
            .parse()?;

        let db_url = env::var("BILLING_DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("BILLING_DATABASE_URL must be set"))?;
        let db_name =
            env::var("BILLING_DATABASE_NAME").unwrap_or_else(|_| "billing_db".to_string());

        let redis_url = env::var("BILLING_REDIS_URL")
            .unwrap_or_else(|_| "redis://localhost:6379".to_string());

        let smtp_host = env::var("BILLING_SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string());
        let smtp_user = env::var("BILLING_SMTP_USER").unwrap_or_default();
        let smtp_password = env::var("BILLING_SMTP_PASSWORD").unwrap_or_default();
        let smtp_from = env::var("BILLING_SMTP_FROM").unwrap_or_else(|_| smtp_user.clone());

        let renderer_base_url = env::var("BILLING_RENDERER_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        let storage_backend =
            env::var("BILLING_STORAGE_BACKEND").unwrap_or_else(|_| "local".to_string());
        let s3_bucket = env::var("BILLING_S3_BUCKET").unwrap_or_default();
        let local_path =
            env::var("BILLING_STORAGE_PATH").unwrap_or_else(|_| "./storage".to_string());
        let public_base_url = env::var("BILLING_STORAGE_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}/files", port));

        let overpayment_policy = OverpaymentPolicy::parse(
            &env::var("BILLING_OVERPAYMENT_POLICY").unwrap_or_else(|_| "allow".to_string()),
        );

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                db_name,
            },
            redis: RedisConfig {
                url: Secret::new(redis_url),
            },
            smtp: SmtpConfig {
                host: smtp_host,
                user: smtp_user,
                password: Secret::new(smtp_password),
                from_email: smtp_from,
            },
            renderer: RendererConfig {
                base_url: renderer_base_url,
            },
            storage: StorageConfig {
                backend: storage_backend,
                s3_bucket,
                local_path,
                public_base_url,
            },
            company: CompanyConfig {
                name: env::var("BILLING_COMPANY_NAME").unwrap_or_else(|_| "Acme Cold Storage".to_string()),
                email: env::var("BILLING_COMPANY_EMAIL").unwrap_or_default(),
                phone: env::var("BILLING_COMPANY_PHONE").unwrap_or_default(),
                gstin: env::var("BILLING_COMPANY_GSTIN").unwrap_or_default(),
                address: env::var("BILLING_COMPANY_ADDRESS").unwrap_or_default(),
                logo_url: env::var("BILLING_COMPANY_LOGO_URL").unwrap_or_default(),
            },
            overpayment_policy,
            service_name: "billing-service".to_string(),
        })
    }
}
