//! HTTP/JSON API.
//!
//! Every route lives under `/api`. Handlers authenticate with [`AuthUser`],
//! lock the shared [`BloodBank`] for the duration of one operation and hand
//! any notifications it produced to the [`Dispatcher`].

mod accounts;
mod appointments;
mod donors;
mod error;
mod extract;
mod inventory;
mod rate_limit;
mod reports;
mod requests;

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{DefaultBodyLimit, State};
use axum::routing::get;
use axum::{middleware, Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

pub use error::ApiError;
pub use extract::AuthUser;
pub use rate_limit::RateLimiter;

use crate::config::Config;
use crate::dispatch::{Dispatcher, LogSink, DEFAULT_QUEUE_CAPACITY};
use crate::error::{Error, Result};
use crate::model::{BloodGroup, User};
use crate::service::{BloodBank, Dashboard};
use crate::storage::StorageStats;

/// Result type returned by handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    bank: Arc<Mutex<BloodBank>>,
    dispatcher: Dispatcher,
    limiter: Arc<RateLimiter>,
    config: Arc<Config>,
}

impl AppState {
    /// Wrap a blood bank for serving.
    #[must_use]
    pub fn new(bank: BloodBank, dispatcher: Dispatcher) -> Self {
        let config = Arc::new(bank.config().clone());
        Self {
            bank: Arc::new(Mutex::new(bank)),
            dispatcher,
            limiter: Arc::new(RateLimiter::per_minute(
                config.server.auth_requests_per_minute,
            )),
            config,
        }
    }

    /// Lock the blood bank. Never hold the guard across an `.await`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if a previous holder panicked.
    pub fn bank(&self) -> Result<MutexGuard<'_, BloodBank>> {
        self.bank
            .lock()
            .map_err(|_| Error::internal("blood bank lock poisoned"))
    }

    /// The notification dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Fail unless `user` is an admin.
fn admin_only(user: &User) -> Result<()> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(Error::forbidden("admin access required"))
    }
}

/// Parse an optional blood group from a query string.
///
/// `+` decodes to a space in query strings, so `a_pos` or `A%2B` are the
/// reliable spellings.
fn parse_group(value: Option<&str>) -> Result<Option<BloodGroup>> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(BloodGroup::from_str)
        .transpose()
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    let auth = accounts::auth_routes().layer(middleware::from_fn_with_state(
        state.clone(),
        rate_limit::limit_auth,
    ));

    let api = Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .nest("/auth", auth)
        .nest("/admin", accounts::admin_routes())
        .nest("/donors", donors::routes())
        .nest("/inventory", inventory::routes())
        .nest("/requests", requests::routes())
        .nest("/notifications", requests::notification_routes())
        .nest("/appointments", appointments::routes())
        .nest("/reports", reports::routes());

    Router::new()
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(state.config.server.max_body_bytes))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// Dashboard figures plus storage statistics.
#[derive(Debug, Serialize)]
struct Stats {
    dashboard: Dashboard,
    storage: StorageStats,
}

async fn stats(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<Json<Stats>> {
    admin_only(&user)?;
    let bank = state.bank()?;
    Ok(Json(Stats {
        dashboard: bank.dashboard(Utc::now().date_naive())?,
        storage: bank.storage().stats()?,
    }))
}

/// Run one maintenance sweep, logging failures.
fn sweep(state: &AppState) {
    let result = state
        .bank()
        .and_then(|bank| bank.run_maintenance(Utc::now()));
    if let Err(e) = result {
        error!(error = %e, "Maintenance sweep failed");
    }
}

/// Serve the API until Ctrl-C or SIGTERM.
///
/// Opens the configured database, starts the notification worker and the
/// periodic maintenance task, and shuts all three down in order.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the database cannot be
/// opened or the address cannot be bound.
pub async fn serve(config: Config) -> Result<()> {
    config.validate()?;
    let addr = config.bind_address()?;
    if config.auth.token_secret.is_none() {
        warn!("No auth.token_secret configured; tokens will not survive a restart");
    }

    let bank = BloodBank::open(config)?;
    let (dispatcher, worker) = Dispatcher::spawn(Arc::new(LogSink), DEFAULT_QUEUE_CAPACITY);
    let state = AppState::new(bank, dispatcher);

    let interval = state.config.maintenance_interval();
    let maintenance_state = state.clone();
    let maintenance = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            sweep(&maintenance_state);
        }
    });

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Listening");

    let app = router(state);
    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    maintenance.abort();
    let _ = maintenance.await;
    // Every dispatcher handle is gone now; the worker drains its queue.
    if let Err(e) = worker.await {
        warn!(error = %e, "Notification worker ended abnormally");
    }
    info!("Server stopped");
    served.map_err(Error::from)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl-C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, shutting down");
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
