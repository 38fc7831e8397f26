pub mod config;
pub mod dtos;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod services;
pub mod utils;

use axum::middleware::from_fn;
use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use service_core::middleware::{metrics::metrics_middleware, tracing::request_id_middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use config::Config;
use services::{
    storage, ClientRepository, ClientStore, EmailProvider, InvoiceRepository, InvoiceStore,
    MockEmailService, OtpStore, PdfRenderer, SmtpEmailService, Storage,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub clients: Arc<dyn ClientStore>,
    pub invoices: Arc<dyn InvoiceStore>,
    pub otp: OtpStore,
    pub email: Arc<dyn EmailProvider>,
    pub renderer: PdfRenderer,
    pub storage: Arc<dyn Storage>,
}

pub struct Application {
    port: u16,
    router: Router,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let mut client_options = ClientOptions::parse(config.database.url.expose_secret()).await?;
        client_options.app_name = Some("billing-service".to_string());

        let client = Client::with_options(client_options)?;
        let db = client.database(&config.database.db_name);

        let redis = redis::Client::open(config.redis.url.expose_secret().as_str())?;

        let clients = ClientRepository::new(&db);
        let invoices = InvoiceRepository::new(&db);
        clients.init_indexes().await?;
        invoices.init_indexes().await?;

        let otp = OtpStore::new(redis);

        // Without SMTP credentials the reset flow logs instead of sending.
        let email: Arc<dyn EmailProvider> = if config.smtp.user.is_empty() {
            tracing::warn!("SMTP credentials not configured - password reset emails are disabled");
            Arc::new(MockEmailService)
        } else {
            Arc::new(SmtpEmailService::new(&config.smtp)?)
        };

        let renderer = PdfRenderer::new(&config.renderer);
        let storage: Arc<dyn Storage> = Arc::from(storage::from_config(&config.storage).await?);

        let state = AppState {
            config: config.clone(),
            clients: Arc::new(clients),
            invoices: Arc::new(invoices),
            otp,
            email,
            renderer,
            storage,
        };

        let mut router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/ready", get(handlers::readiness_check))
            .route("/metrics", get(handlers::metrics))
            // Client endpoints
            .route("/clients", get(handlers::clients::list_clients))
            .route("/clients/register", post(handlers::clients::register))
            .route("/clients/login", post(handlers::clients::login))
            .route("/clients/batch", post(handlers::clients::batch_clients))
            .route("/clients/files", get(handlers::clients::all_file_urls))
            .route(
                "/clients/password-reset/request",
                post(handlers::clients::password_reset_request),
            )
            .route(
                "/clients/password-reset/confirm",
                post(handlers::clients::password_reset_confirm),
            )
            .route("/clients/:customer_id", get(handlers::clients::get_client))
            .route(
                "/clients/:customer_id",
                patch(handlers::clients::update_client),
            )
            .route(
                "/clients/:customer_id",
                delete(handlers::clients::remove_client),
            )
            .route(
                "/clients/:customer_id/summary",
                get(handlers::clients::client_summary),
            )
            .route(
                "/clients/:customer_id/billing-details",
                get(handlers::clients::billing_details),
            )
            .route(
                "/clients/:customer_id/files",
                get(handlers::clients::list_files),
            )
            .route(
                "/clients/:customer_id/locations",
                post(handlers::clients::add_location),
            )
            .route(
                "/clients/:customer_id/locations/latest",
                get(handlers::clients::latest_location),
            )
            // Invoice endpoints
            .route("/invoices", get(handlers::invoices::list_invoices))
            .route(
                "/invoices/:customer_id",
                get(handlers::invoices::get_invoice),
            )
            .route(
                "/invoices/:customer_id/payments",
                post(handlers::invoices::record_payment),
            )
            .route(
                "/invoices/:customer_id/receipts",
                post(handlers::invoices::upload_receipt),
            );

        // Locally stored receipts are served straight from disk.
        if config.storage.backend != "s3" {
            router = router.nest_service(
                "/files",
                ServeDir::new(config.storage.local_path.clone()),
            );
        }

        let router = router
            .layer(from_fn(metrics_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(CorsLayer::permissive())
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                    )
                }),
            )
            .with_state(state);

        Ok(Self {
            port: config.server.port,
            router,
        })
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        tracing::info!("Listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router).await?;

        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}
