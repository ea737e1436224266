// Code Mapping - Web Server
// REST API over one mapping session (axum)

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use clap::Parser;
use code_mapping::{
    CoverageSummary, MappingConfig, MappingError, MappingSession, MergedRecord, SessionEvent,
    SessionSnapshot, Side,
};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;

#[derive(Parser, Debug)]
#[clap(name = "code-mapping-server", version, about = "Code mapping REST API")]
struct Cli {
    #[clap(long, short, help = "JSON config file with registry and connection paths")]
    config: Option<PathBuf>,

    #[clap(long, default_value = "127.0.0.1:3000")]
    bind_addr: String,

    #[clap(long, short, default_value = "info")]
    log_level: String,
}

/// Shared application state. Each request holds the lock for its whole event.
#[derive(Clone)]
struct AppState {
    session: Arc<Mutex<MappingSession>>,
}

impl AppState {
    fn session(&self) -> MutexGuard<'_, MappingSession> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Deserialize)]
struct ConfirmRequest {
    hospital_row: Option<usize>,
    company_row: Option<usize>,
}

#[derive(Deserialize)]
struct RevokeRequest {
    #[serde(default)]
    positions: BTreeSet<usize>,
}

fn status_for(error: &MappingError) -> StatusCode {
    match error {
        MappingError::NoSelection(_) => StatusCode::BAD_REQUEST,
        MappingError::SourceRead { .. } | MappingError::Persistence { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn event_response(result: code_mapping::Result<SessionEvent>) -> Response {
    match result {
        Ok(event) => (StatusCode::OK, Json(ApiResponse::ok(event))).into_response(),
        Err(e) => {
            log::warn!("Request failed: {}", e);
            (
                status_for(&e),
                Json(ApiResponse::<SessionEvent>::err(e.to_string())),
            )
                .into_response()
        }
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/snapshot - Registries with coverage flags plus connections
async fn get_snapshot(State(state): State<AppState>) -> Json<ApiResponse<SessionSnapshot>> {
    Json(ApiResponse::ok(state.session().snapshot()))
}

/// GET /api/coverage - Linked/unlinked counts per registry
async fn get_coverage(State(state): State<AppState>) -> Json<ApiResponse<Vec<CoverageSummary>>> {
    let session = state.session();
    let summaries = vec![
        session.coverage_summary(Side::Hospital),
        session.coverage_summary(Side::Company),
    ];
    Json(ApiResponse::ok(summaries))
}

/// GET /api/merge - Union of both registries by name
async fn get_merge(State(state): State<AppState>) -> Json<ApiResponse<Vec<MergedRecord>>> {
    Json(ApiResponse::ok(state.session().merge()))
}

/// POST /api/connections - Link the selected rows
async fn confirm_connection(
    State(state): State<AppState>,
    Json(request): Json<ConfirmRequest>,
) -> Response {
    let result = state
        .session()
        .confirm(request.hospital_row, request.company_row);
    event_response(result)
}

/// DELETE /api/connections - Remove connection rows
async fn revoke_connections(
    State(state): State<AppState>,
    Json(request): Json<RevokeRequest>,
) -> Response {
    let result = state.session().revoke(&request.positions);
    event_response(result)
}

/// POST /api/save - Write connections to disk
async fn save_connections(State(state): State<AppState>) -> Response {
    let result = state.session().save_connections();
    event_response(result)
}

/// POST /api/load - Reload connections from disk
async fn load_connections(State(state): State<AppState>) -> Response {
    let result = state.session().load_connections();
    event_response(result)
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/snapshot", get(get_snapshot))
        .route("/coverage", get(get_coverage))
        .route("/merge", get(get_merge))
        .route(
            "/connections",
            post(confirm_connection).delete(revoke_connections),
        )
        .route("/save", post(save_connections))
        .route("/load", post(load_connections))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Shutdown
// ============================================================================

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a signal handler the server keeps running until killed
        log::error!("Could not listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    println!("\n🛑 Shutting down");
}

/// Write the connection store so API changes outlive the process
fn save_on_shutdown(state: &AppState) -> code_mapping::Result<SessionEvent> {
    state.session().save_connections()
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.log_level.parse().unwrap_or(LevelFilter::Info))
        .init();

    println!("🌐 Code Mapping - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = MappingConfig::load(cli.config.as_deref())?;
    let mut session = MappingSession::from_config(&config).with_context(|| {
        format!(
            "Could not open registries {} / {}",
            config.hospital_registry.display(),
            config.company_registry.display()
        )
    })?;

    match session.load_connections() {
        Ok(event) => println!("✓ {}", event.describe()),
        Err(e) => eprintln!("⚠️  {} (starting with no connections)", e),
    }

    let state = AppState {
        session: Arc::new(Mutex::new(session)),
    };

    let listener = tokio::net::TcpListener::bind(&cli.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", cli.bind_addr))?;

    println!("\n🚀 Server running on http://{}", cli.bind_addr);
    println!("   API: http://{}/api/snapshot", cli.bind_addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server stopped unexpectedly")?;

    match save_on_shutdown(&state) {
        Ok(event) => println!("💾 {}", event.describe()),
        Err(e) => {
            eprintln!("⚠️  {}", e);
            return Err(e).context("Connections were not saved on shutdown");
        }
    }

    Ok(())
}
