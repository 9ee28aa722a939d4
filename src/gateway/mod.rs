//! Axum-based HTTP gateway for the state API.
//!
//! - `POST /api/login`, `POST /api/logout`, `GET /api/me` manage the signed session cookie
//! - `GET /api/state`, `POST /api/state` read and replace the caller's state document
//! - `GET /health` is public
//!
//! `/api/*` is CORS-enabled with credentials for the configured frontend origins.
//! Every request is bounded by a body size limit and a timeout.

pub mod error;

pub use error::{ApiError, ApiResult};

use crate::auth::{Credential, SessionClaims, SessionSigner};
use crate::config::{Config, GatewayConfig};
use crate::storage::StateStore;
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Shared state for all axum handlers. Built once at startup, read-only afterwards.
#[derive(Clone)]
pub struct AppState {
    pub credential: Arc<Credential>,
    pub sessions: Arc<SessionSigner>,
    pub store: Arc<StateStore>,
}

impl AppState {
    pub fn new(credential: Credential, sessions: SessionSigner, store: StateStore) -> Self {
        Self {
            credential: Arc::new(credential),
            sessions: Arc::new(sessions),
            store: Arc::new(store),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let store = StateStore::open(&config.storage.data_dir, config.storage.strict_reads)
            .with_context(|| {
                format!(
                    "Failed to create data directory {}",
                    config.storage.data_dir.display()
                )
            })?;

        let (secret, insecure) = config.session_secret();
        if insecure {
            tracing::warn!(
                "No session secret configured, using the development placeholder. \
                 Set STATEKEEP_SECRET before exposing this server."
            );
        }
        let sessions = SessionSigner::new(
            secret,
            Duration::from_secs(config.auth.session_ttl_secs),
        )
        .context("Failed to initialize session signer")?
        .with_cookie(&config.auth.cookie_name, config.auth.cookie_secure);

        let credential = Credential::new(&config.auth.username, &config.auth.password);

        Ok(Self::new(credential, sessions, store))
    }
}

fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer> {
    let origins = allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .with_context(|| format!("Invalid CORS origin {origin:?}"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600)))
}

/// Build the full router with middleware.
pub fn build_router(state: AppState, gateway: &GatewayConfig) -> Result<Router> {
    let api = Router::new()
        .route("/api/login", post(handle_login))
        .route("/api/logout", post(handle_logout))
        .route("/api/me", get(handle_me))
        .route("/api/state", get(handle_get_state).post(handle_save_state))
        .layer(cors_layer(&gateway.allowed_origins)?);

    Ok(Router::new()
        .route("/health", get(handle_health))
        .merge(api)
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(gateway.max_body_bytes))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(gateway.request_timeout_secs),
        )))
}

/// Run the HTTP gateway until Ctrl+C / SIGTERM.
pub async fn run_gateway(config: Config) -> Result<()> {
    let state = AppState::from_config(&config)?;
    let app = build_router(state, &config.gateway)?;

    let addr: SocketAddr = format!("{}:{}", config.gateway.host, config.gateway.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.gateway.host, config.gateway.port
            )
        })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let local_addr = listener.local_addr()?;

    tracing::info!(
        addr = %local_addr,
        data_dir = %config.storage.data_dir.display(),
        environment = ?config.environment,
        "State service listening"
    );
    println!("statekeep listening on http://{local_addr}");
    println!("  POST /api/login   — {{\"username\", \"password\"}}");
    println!("  POST /api/logout  — clear the session cookie");
    println!("  GET  /api/me      — current user");
    println!("  GET  /api/state   — load saved state");
    println!("  POST /api/state   — {{\"state\": <json>}}");
    println!("  GET  /health      — health check");
    println!("  Press Ctrl+C to stop.\n");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("State service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {e}");
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
    tracing::info!("Shutdown signal received");
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// Request body for login. Missing or malformed bodies read as empty.
#[derive(Debug, Default, Deserialize)]
struct LoginBody {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Request body for saving state. `"state": null` counts as missing.
#[derive(Debug, Default, Deserialize)]
struct SaveStateBody {
    #[serde(default)]
    state: Option<serde_json::Value>,
}

/// Verify the session cookie on a protected endpoint.
fn require_session(state: &AppState, jar: &CookieJar) -> ApiResult<SessionClaims> {
    state
        .sessions
        .claims_from_jar(jar)
        .ok_or(ApiError::Unauthorized)
}

/// GET /health — always public
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// POST /api/login — check the credential and set the session cookie.
async fn handle_login(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let body = match body {
        Ok(Json(b)) => b,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return Err(ApiError::BodyTooLarge);
        }
        Err(_) => LoginBody::default(),
    };
    let username = body.username.as_deref().unwrap_or("").trim();
    let password = body.password.as_deref().unwrap_or("");

    if !state.credential.verify(username, password) {
        tracing::warn!("Login failed");
        return Err(ApiError::AuthenticationFailed);
    }

    let token = state.sessions.issue(username);
    tracing::info!(username, "Session established");
    Ok((
        jar.add(state.sessions.session_cookie(token)),
        Json(serde_json::json!({"ok": true, "user": {"username": username}})),
    ))
}

/// POST /api/logout — clear the session cookie. Always succeeds.
async fn handle_logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    if let Some(claims) = state.sessions.claims_from_jar(&jar) {
        tracing::info!(username = %claims.sub, "Session cleared");
    }
    (
        jar.add(state.sessions.removal_cookie()),
        Json(serde_json::json!({"ok": true})),
    )
}

/// GET /api/me — who the session cookie belongs to.
async fn handle_me(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    match state.sessions.claims_from_jar(&jar) {
        Some(claims) => (
            StatusCode::OK,
            Json(serde_json::json!({"loggedIn": true, "user": {"username": claims.sub}})),
        ),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"loggedIn": false})),
        ),
    }
}

/// GET /api/state — the caller's saved state, or `null` if none yet.
async fn handle_get_state(
    State(state): State<AppState>,
    jar: CookieJar,
) -> ApiResult<Json<serde_json::Value>> {
    let claims = require_session(&state, &jar)?;
    let saved = state.store.load(&claims.sub).await?;
    Ok(Json(serde_json::json!({ "state": saved })))
}

/// POST /api/state — replace the caller's saved state.
async fn handle_save_state(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Result<Json<SaveStateBody>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let claims = require_session(&state, &jar)?;

    let body = match body {
        Ok(Json(b)) => b,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return Err(ApiError::BodyTooLarge);
        }
        Err(_) => SaveStateBody::default(),
    };
    let new_state = body
        .state
        .ok_or_else(|| ApiError::Validation("Missing 'state'".into()))?;

    state.store.save(&claims.sub, &new_state).await?;
    tracing::debug!(username = %claims.sub, "State saved");
    Ok(Json(serde_json::json!({"ok": true})))
}
