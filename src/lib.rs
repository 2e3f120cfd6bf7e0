//! Menstrual-cycle analytics service.
//!
//! The [`analytics`] module is the engine: average cycle length and period
//! duration from a logged history, next-period and ovulation prediction,
//! fertile window, irregularity checks and current-phase inference. The
//! rest of the crate feeds it records from a [`storage::RecordStore`] and
//! serves the results over HTTP.
//!
//! # Configuration
//!
//! | Variable             | Default   |
//! |----------------------|-----------|
//! | `SAFEHER_PORT`       | `8080`    |
//! | `SAFEHER_STORE`      | `memory` (or `encrypted`) |
//! | `SAFEHER_DATA_DIR`   | platform local data dir + `/safeher` |
//! | `SAFEHER_PASSPHRASE` | falls back to `/run/secrets/SAFEHER_PASSPHRASE` |
//! | `RUST_LOG`           | tracing filter |
//!
//! ```sh
//! RUST_LOG=safeher=debug cargo run
//! curl 'localhost:8080/subjects/alice/prediction?now=2024-01-20'
//! ```

use std::{sync::Arc, time::Duration};

use axum::{
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

pub mod analytics;
pub mod config;
pub mod crypto;
pub mod error;
pub mod models;
pub mod reporting;
pub mod routes;
pub mod service;
pub mod state;
pub mod storage;

use config::Config;
use error::StartupError;
use routes::{
    aggregate_irregularity_handler, calendar_handler, create_cycle_handler,
    delete_cycle_handler, health_handler, insights_handler, list_cycles_handler,
    phase_handler, prediction_handler, stats_handler, update_cycle_handler,
};
use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/subjects/:subject_id/cycles",
            get(list_cycles_handler).post(create_cycle_handler),
        )
        .route(
            "/subjects/:subject_id/cycles/:cycle_id",
            put(update_cycle_handler).delete(delete_cycle_handler),
        )
        .route("/subjects/:subject_id/prediction", get(prediction_handler))
        .route("/subjects/:subject_id/insights", get(insights_handler))
        .route("/subjects/:subject_id/phase", get(phase_handler))
        .route("/subjects/:subject_id/calendar", get(calendar_handler))
        .route("/subjects/:subject_id/stats", get(stats_handler))
        .route("/admin/irregularity", post(aggregate_irregularity_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() -> Result<(), StartupError> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading configuration...");
    let config = Config::load()?;

    info!("Initializing state...");
    let state = AppState::new(config)?;

    let address = format!("0.0.0.0:{}", state.port);
    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
