//! Application startup and lifecycle management.

use crate::config::{Config, StorageBackend};
use crate::handlers;
use crate::services::{
    InMemoryPaymentStore, NotificationDispatcher, PaymentGateway, PaymentRepository,
    PaymentServices, PaymentStore, RazorpayGateway,
};
use axum::{
    middleware::from_fn,
    routing::{get, patch, post},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware, REQUEST_ID_HEADER};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub services: PaymentServices,
    /// Present for the MongoDB backend; used by readiness checks.
    pub db: Option<mongodb::Database>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: NotificationDispatcher,
        db: Option<mongodb::Database>,
    ) -> Self {
        let services = PaymentServices::new(store, gateway, notifier, &config);
        Self {
            config: Arc::new(config),
            services,
            db,
        }
    }
}

/// All HTTP routes with the observability layers applied.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        // Booking payment view (booking/dispatch subsystem)
        .route("/bookings", post(handlers::bookings::register_booking))
        .route("/bookings/:id", get(handlers::bookings::get_booking))
        .route(
            "/bookings/:id/status",
            patch(handlers::bookings::update_status),
        )
        // Online rails
        .route(
            "/bookings/:id/payment/order",
            post(handlers::payments::create_order),
        )
        .route("/payments/verify", post(handlers::payments::verify_payment))
        .route(
            "/bookings/:id/payment/wallet",
            post(handlers::payments::wallet_pay),
        )
        .route(
            "/bookings/:id/payment/cancel",
            post(handlers::payments::cancel_payment),
        )
        .route("/bookings/:id/refund", post(handlers::payments::refund))
        // In-person collection
        .route(
            "/bookings/:id/cash/initiate",
            post(handlers::cash::initiate),
        )
        .route("/bookings/:id/cash/confirm", post(handlers::cash::confirm))
        // Close-out
        .route(
            "/bookings/:id/settlement/worker",
            post(handlers::settlement::pay_worker),
        )
        .route(
            "/bookings/:id/settlement/final",
            post(handlers::settlement::final_settlement),
        )
        // Wallets and vendor ledgers
        .route("/wallets/:user_id", get(handlers::wallets::get_wallet))
        .route(
            "/wallets/:user_id/topups",
            post(handlers::wallets::create_topup),
        )
        .route(
            "/wallets/:user_id/topups/verify",
            post(handlers::wallets::verify_topup),
        )
        .route(
            "/vendors/:vendor_id/ledger",
            get(handlers::vendors::get_ledger),
        )
        .route(
            "/vendors/:vendor_id/settlements",
            post(handlers::vendors::settle_dues),
        )
        .route("/webhooks/gateway", post(handlers::webhooks::gateway_webhook))
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    user_id = tracing::field::Empty,
                    vendor_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Wire the configured store, gateway and notifier and bind the listener.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let (store, db): (Arc<dyn PaymentStore>, Option<mongodb::Database>) =
            match config.database.backend {
                StorageBackend::Mongo => {
                    let mut client_options =
                        ClientOptions::parse(config.database.url.expose_secret())
                            .await
                            .map_err(|e| {
                                tracing::error!("Failed to parse MongoDB connection string: {}", e);
                                AppError::DatabaseError(e.into())
                            })?;
                    client_options.app_name = Some(config.service_name.clone());

                    let client = Client::with_options(client_options).map_err(|e| {
                        tracing::error!("Failed to create MongoDB client: {}", e);
                        AppError::DatabaseError(e.into())
                    })?;
                    let db = client.database(&config.database.db_name);

                    let repository = PaymentRepository::new(&db);
                    repository.init_indexes().await.map_err(|e| {
                        tracing::error!("Failed to initialize database indexes: {}", e);
                        AppError::DatabaseError(e)
                    })?;
                    let store: Arc<dyn PaymentStore> = Arc::new(repository);
                    (store, Some(db))
                }
                StorageBackend::Memory => {
                    tracing::warn!("Using in-memory storage, state is lost on restart");
                    let store: Arc<dyn PaymentStore> = Arc::new(InMemoryPaymentStore::new());
                    (store, None)
                }
            };

        let gateway = RazorpayGateway::new(config.gateway.clone()).map_err(|e| {
            tracing::error!("Failed to initialize payment gateway: {}", e);
            AppError::ConfigError(anyhow::anyhow!(e.to_string()))
        })?;
        if gateway.is_configured() {
            tracing::info!("Payment gateway initialized");
        } else {
            tracing::warn!("Gateway credentials not configured - online payments disabled");
        }

        let notifier = NotificationDispatcher::from_config(&config.notification).map_err(|e| {
            tracing::error!("Failed to initialize notifier: {}", e);
            AppError::InternalError(e)
        })?;

        let state = AppState::new(config, store, Arc::new(gateway), notifier, db);
        Self::with_state(state).await
    }

    /// Bind the HTTP listener for prebuilt state (port 0 picks a random port).
    pub async fn with_state(state: AppState) -> Result<Self, AppError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], state.config.server.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Booking payment service: HTTP on port {}", port);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = router(self.state);
        axum::serve(self.listener, router).await.map_err(|e| {
            tracing::error!("HTTP server error: {}", e);
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
