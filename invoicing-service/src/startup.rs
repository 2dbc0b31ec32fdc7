//! Application startup and lifecycle management.

use crate::config::{InvoicingConfig, StorageBackend};
use crate::handlers::{
    health_check, internal, invoices, metrics_endpoint, readiness_check, reminders,
};
use crate::services::{
    Clock, Database, EmailTransport, InvoiceService, InvoiceStatusMachine, InvoiceStore,
    LoggingChangeListener, MemoryStore, MockEmailTransport, OrganizationScopeAuthorizer,
    ReminderDispatcher, ReminderScheduler, SmtpTransport, SystemClock,
};
use axum::{
    middleware::from_fn,
    routing::{get, patch, post, put},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{metrics::metrics_middleware, tracing::request_id_middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<InvoicingConfig>,
    pub store: Arc<dyn InvoiceStore>,
    pub transport: Arc<dyn EmailTransport>,
    pub clock: Arc<dyn Clock>,
    pub invoices: Arc<InvoiceService>,
    pub scheduler: Arc<ReminderScheduler>,
    pub dispatcher: Arc<ReminderDispatcher>,
}

impl AppState {
    /// Wire the core services over the given collaborators.
    pub fn new(
        config: InvoicingConfig,
        store: Arc<dyn InvoiceStore>,
        transport: Arc<dyn EmailTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let authorizer = Arc::new(OrganizationScopeAuthorizer);

        let invoices = InvoiceService::new(
            store.clone(),
            authorizer.clone(),
            clock.clone(),
            Arc::new(LoggingChangeListener),
            InvoiceStatusMachine::new(config.invoicing.transition_policy),
            config.invoicing.currency.clone(),
        );
        let scheduler = ReminderScheduler::new(
            store.clone(),
            authorizer,
            clock.clone(),
            config.reminders.send_time,
        );
        let dispatcher = ReminderDispatcher::new(
            store.clone(),
            transport.clone(),
            clock.clone(),
            config.reminders.dispatcher_settings(),
        );

        Self {
            config: Arc::new(config),
            store,
            transport,
            clock,
            invoices: Arc::new(invoices),
            scheduler: Arc::new(scheduler),
            dispatcher: Arc::new(dispatcher),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_endpoint))
        .route("/invoices", post(invoices::create_invoice))
        .route("/invoices/:invoice_id", get(invoices::get_invoice))
        .route(
            "/invoices/:invoice_id/line-items",
            put(invoices::replace_line_items),
        )
        .route("/invoices/:invoice_id/status", patch(invoices::update_status))
        .route(
            "/invoices/:invoice_id/reminders",
            post(reminders::schedule_reminder).get(reminders::list_reminders),
        )
        .route(
            "/reminders/:reminder_id/cancel",
            post(reminders::cancel_reminder),
        )
        .route(
            "/internal/reminders/process",
            post(internal::process_reminders),
        )
        .route(
            "/internal/payments/confirmed",
            post(internal::payment_confirmed),
        )
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: InvoicingConfig) -> Result<Self, AppError> {
        let store: Arc<dyn InvoiceStore> = match config.storage {
            StorageBackend::Postgres => {
                let db = Database::new(
                    &config.database.url,
                    config.database.max_connections,
                    config.database.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!("Failed to connect to PostgreSQL: {}", e);
                    AppError::from(e)
                })?;

                db.run_migrations().await.map_err(|e| {
                    tracing::error!("Failed to run database migrations: {}", e);
                    AppError::from(e)
                })?;

                Arc::new(db)
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage, data will not survive a restart");
                Arc::new(MemoryStore::new())
            }
        };

        let transport: Arc<dyn EmailTransport> = if config.smtp.enabled {
            match SmtpTransport::new(config.smtp.clone()) {
                Ok(transport) => {
                    tracing::info!("SMTP email transport initialized");
                    Arc::new(transport)
                }
                Err(e) => {
                    tracing::warn!("Failed to initialize SMTP transport: {}. Using mock.", e);
                    Arc::new(MockEmailTransport::new())
                }
            }
        } else {
            tracing::info!("SMTP transport disabled, using mock email transport");
            Arc::new(MockEmailTransport::new())
        };

        Self::build_with_components(config, store, transport, Arc::new(SystemClock)).await
    }

    /// Build over explicit collaborators. Port 0 binds a random port.
    pub async fn build_with_components(
        config: InvoicingConfig,
        store: Arc<dyn InvoiceStore>,
        transport: Arc<dyn EmailTransport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Invoicing service: HTTP on port {}", port);

        let state = AppState::new(config, store, transport, clock);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until `shutdown` resolves. The in-process reminder poller, when
    /// configured, stops with the server.
    pub async fn run_until_stopped<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let poller = self
            .state
            .config
            .reminders
            .poll_interval_secs
            .map(|secs| spawn_reminder_poller(self.state.dispatcher.clone(), secs));

        let result = axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await;

        if let Some(handle) = poller {
            handle.abort();
        }

        result.map_err(|e| {
            tracing::error!("HTTP server error: {}", e);
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}

/// Run the dispatcher on a fixed interval. Overlap with the cron trigger is
/// safe: each reminder is claimed before it is sent.
fn spawn_reminder_poller(
    dispatcher: Arc<ReminderDispatcher>,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tracing::info!(interval_secs = interval_secs, "Starting in-process reminder poller");
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            // Failures are logged and counted by the dispatcher itself.
            let _ = dispatcher.run().await;
        }
    })
}
