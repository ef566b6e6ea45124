//! Application startup and lifecycle management.

use crate::config::{ContractConfig, StorageBackend};
use crate::handlers;
use crate::middleware::metrics_middleware;
use crate::services::{
    init_metrics, ContractFactory, ContractStore, Database, HttpNotifier, LogNotifier,
    MemoryStore, NotificationDispatcher, PaymentEngine, PropertyRegistry, ReservationSource,
    TransferWorkflow, VoidController,
};
use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{request_id_middleware, REQUEST_ID_HEADER};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Persistence and notification collaborators.
#[derive(Clone)]
pub struct Backends {
    pub contracts: Arc<dyn ContractStore>,
    pub reservations: Arc<dyn ReservationSource>,
    pub properties: Arc<dyn PropertyRegistry>,
    pub notifier: Arc<dyn NotificationDispatcher>,
}

impl Backends {
    /// All three stores backed by one in-process [`MemoryStore`].
    pub fn memory(store: MemoryStore, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        let store = Arc::new(store);
        Self {
            contracts: store.clone(),
            reservations: store.clone(),
            properties: store,
            notifier,
        }
    }

    pub async fn from_config(config: &ContractConfig) -> Result<Self, AppError> {
        let notifier: Arc<dyn NotificationDispatcher> = match &config.notification_service.url {
            Some(url) => Arc::new(HttpNotifier::new(url, config.notification_service.timeout)?),
            None => {
                tracing::warn!("NOTIFICATION_SERVICE_URL not set - notifications are only logged");
                Arc::new(LogNotifier)
            }
        };

        match config.storage {
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage - data is lost on restart");
                Ok(Self::memory(MemoryStore::new(), notifier))
            }
            StorageBackend::Postgres => {
                let database = config.database.as_ref().ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?;
                let db = Database::new(
                    database.url.expose_secret(),
                    database.max_connections,
                    database.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                    e
                })?;
                db.run_migrations().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to run migrations");
                    e
                })?;

                let db = Arc::new(db);
                Ok(Self {
                    contracts: db.clone(),
                    reservations: db.clone(),
                    properties: db,
                    notifier,
                })
            }
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ContractConfig,
    pub store: Arc<dyn ContractStore>,
    pub contracts: ContractFactory,
    pub voids: VoidController,
    pub payments: PaymentEngine,
    pub transfers: TransferWorkflow,
}

impl AppState {
    pub fn new(config: ContractConfig, backends: Backends) -> Self {
        let Backends {
            contracts: store,
            reservations,
            properties,
            notifier,
        } = backends;

        Self {
            config,
            contracts: ContractFactory::new(store.clone(), reservations, notifier.clone()),
            voids: VoidController::new(store.clone(), properties, notifier.clone()),
            payments: PaymentEngine::new(store.clone(), notifier.clone()),
            transfers: TransferWorkflow::new(store.clone(), notifier),
            store,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/contracts", post(handlers::contracts::create_contract))
        .route("/contracts/:id", get(handlers::contracts::get_contract))
        .route(
            "/contracts/:id/schedules",
            get(handlers::contracts::list_schedules),
        )
        .route("/contracts/:id/void", post(handlers::contracts::void_contract))
        .route(
            "/contracts/:id/transfers",
            post(handlers::transfers::create_transfer).get(handlers::transfers::list_transfers),
        )
        .route(
            "/schedules/:id/payments",
            post(handlers::payments::record_payment),
        )
        .route(
            "/schedules/:id/transactions",
            get(handlers::payments::list_transactions),
        )
        .route(
            "/schedules/:id/revert",
            post(handlers::payments::revert_payment),
        )
        .route("/transfers/:id", get(handlers::transfers::get_transfer))
        .route(
            "/transfers/:id/decision",
            post(handlers::transfers::decide_transfer),
        )
        .route_layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
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
                        version = ?request.version(),
                    )
                })
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    state: AppState,
}

impl Application {
    /// Build the application with backends chosen by configuration.
    pub async fn build(config: ContractConfig) -> Result<Self, AppError> {
        init_metrics();
        let backends = Backends::from_config(&config).await?;
        Self::build_with(config, backends).await
    }

    /// Build the application around the given backends.
    pub async fn build_with(config: ContractConfig, backends: Backends) -> Result<Self, AppError> {
        init_metrics();
        let addr = config.common.socket_addr()?;
        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        let state = AppState::new(config, backends);
        let router = router(state.clone());

        Ok(Self {
            port,
            listener,
            router,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        tracing::info!(
            service = %self.state.config.service_name,
            version = %self.state.config.service_version,
            http_port = self.port,
            "Service ready to accept connections"
        );
        axum::serve(self.listener, self.router).await
    }
}
