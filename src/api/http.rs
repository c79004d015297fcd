//! HTTP API Server
//!
//! REST API for round state, scores, admin control and vote export, plus
//! the WebSocket endpoint used by voters and display screens.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State, Json},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::model::{ContestantId, Mode};
use crate::round::{RoundSnapshot, Scoreboard, VoteHub};
use crate::store::{ExportFormat, ExportReport};
use super::auth::{session_token, AdminGate, SessionGate, SESSION_COOKIE};
use super::identity::IdentityResolver;
use super::ws::handle_ws;

/// Shared application state
pub struct AppState {
    /// Round state, votes and broadcasting
    pub hub: Arc<VoteHub>,
    /// Password login and session bookkeeping
    pub sessions: Arc<SessionGate>,
    /// Authorization check for state-changing requests
    pub gate: Arc<dyn AdminGate>,
    /// Voter identity resolution for WebSocket clients
    pub identity: IdentityResolver,
}

/// HTTP API server
pub struct HttpServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(
        config: ServerConfig,
        hub: Arc<VoteHub>,
        sessions: Arc<SessionGate>,
        identity: IdentityResolver,
    ) -> Self {
        let gate: Arc<dyn AdminGate> = sessions.clone();
        let state = Arc::new(AppState { hub, sessions, gate, identity });
        Self { config, state }
    }

    /// Get the state for sharing with other components
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Create the router
    pub fn create_router(state: Arc<AppState>) -> Router {
        Router::new()
            // Public reads
            .route("/health", get(handle_health))
            .route("/state", get(handle_state))
            .route("/scores", get(handle_scores))
            .route("/contestants", get(handle_contestants))
            // Sessions
            .route("/login", post(handle_login))
            .route("/logout", post(handle_logout))
            // Admin operations
            .route("/admin/round/open", post(handle_open_round))
            .route("/admin/round/close", post(handle_close_round))
            .route("/admin/reset", post(handle_reset))
            .route("/admin/landing", post(handle_landing))
            .route("/admin/export", get(handle_export))
            // Live updates
            .route("/ws", get(handle_ws))
            .with_state(state)
    }

    /// Serve until `shutdown` resolves
    pub async fn start<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut app = Self::create_router(Arc::clone(&self.state)).layer(TraceLayer::new_for_http());
        if self.config.cors_enabled {
            app = app.layer(CorsLayer::permissive());
        }

        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.config.bind_address);

        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

// ============ Request/Response Types ============

/// Login request
#[derive(Debug, Deserialize, Serialize)]
pub struct LoginRequest {
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: u64,
}

/// Open round request
#[derive(Debug, Deserialize, Serialize)]
pub struct OpenRoundRequest {
    pub contestant_id: ContestantId,
    #[serde(default)]
    pub duration_seconds: Option<u64>,
}

/// Close round request
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CloseRoundRequest {
    #[serde(default)]
    pub mode: Option<Mode>,
}

/// Reset request
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub landing: bool,
}

/// Export query string
#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: Option<String>,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub mode: Mode,
    pub connections: usize,
}

/// Scores response
#[derive(Debug, Serialize)]
pub struct ScoresResponse {
    pub scores: Scoreboard,
}

/// Result of an admin transition
#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub changed: bool,
    pub state: RoundSnapshot,
}

/// Reset response
#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub cleared_votes: u64,
    pub state: RoundSnapshot,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// ============ Handlers ============

async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        mode: state.hub.snapshot().await.mode,
        connections: state.hub.gateway().connection_count().await,
    })
}

async fn handle_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.hub.snapshot().await)
}

async fn handle_scores(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ScoresResponse { scores: state.hub.scoreboard().await })
}

async fn handle_contestants(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.hub.contestants().await)
}

async fn handle_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Response {
    match state.sessions.login(&req.password).await {
        Ok(token) => {
            let ttl = state.sessions.ttl().as_secs();
            let cookie = format!(
                "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
                SESSION_COOKIE, token, ttl
            );
            (
                [(header::SET_COOKIE, cookie)],
                Json(LoginResponse { token, expires_in: ttl }),
            )
                .into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn handle_logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        state.sessions.logout(&token).await;
    }
    let cookie = format!("{}=; Path=/; HttpOnly; Max-Age=0", SESSION_COOKIE);
    ([(header::SET_COOKIE, cookie)], StatusCode::NO_CONTENT).into_response()
}

async fn handle_open_round(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<OpenRoundRequest>,
) -> Response {
    if let Err(e) = require_admin(&state, &headers).await {
        return error_response(&e);
    }

    let duration = req.duration_seconds.map(Duration::from_secs);
    match state.hub.open_round(req.contestant_id, duration).await {
        Ok(snapshot) => Json(TransitionResponse { changed: true, state: snapshot }).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn handle_close_round(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<CloseRoundRequest>>,
) -> Response {
    if let Err(e) = require_admin(&state, &headers).await {
        return error_response(&e);
    }

    let mode = body.and_then(|Json(req)| req.mode).unwrap_or(Mode::Stopped);
    match state.hub.close_round(mode).await {
        Ok(changed) => Json(TransitionResponse {
            changed,
            state: state.hub.snapshot().await,
        })
        .into_response(),
        Err(e) => error_response(&e),
    }
}

async fn handle_reset(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<ResetRequest>>,
) -> Response {
    if let Err(e) = require_admin(&state, &headers).await {
        return error_response(&e);
    }

    let landing = body.map(|Json(req)| req.landing).unwrap_or(false);
    match state.hub.reset(landing).await {
        Ok(cleared_votes) => Json(ResetResponse {
            cleared_votes,
            state: state.hub.snapshot().await,
        })
        .into_response(),
        Err(e) => error_response(&e),
    }
}

async fn handle_landing(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(e) = require_admin(&state, &headers).await {
        return error_response(&e);
    }

    let changed = state.hub.show_landing().await;
    Json(TransitionResponse {
        changed,
        state: state.hub.snapshot().await,
    })
    .into_response()
}

async fn handle_export(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ExportQuery>,
) -> Response {
    if let Err(e) = require_admin(&state, &headers).await {
        return error_response(&e);
    }

    let format = match query.format.as_deref().unwrap_or("csv").parse::<ExportFormat>() {
        Ok(format) => format,
        Err(e) => return error_response(&e),
    };

    let report = match ExportReport::from_store(state.hub.store()).await {
        Ok(report) => report,
        Err(e) => return error_response(&e),
    };

    match report.render(format) {
        Ok(body) => {
            let disposition = format!(
                "attachment; filename=\"voting_results_{}.{}\"",
                report.generated_at.format("%Y%m%d_%H%M%S"),
                format.extension()
            );
            (
                [
                    (header::CONTENT_TYPE, format.content_type().to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                body,
            )
                .into_response()
        }
        Err(e) => error_response(&e),
    }
}

// ============ Helpers ============

async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let token = session_token(headers);
    if state.gate.is_authorized(token.as_deref()).await {
        Ok(())
    } else {
        Err(Error::Unauthorized)
    }
}

/// HTTP status for an error
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Unauthorized => StatusCode::UNAUTHORIZED,
        Error::InvalidRequest(_) | Error::UnknownContestant(_) => StatusCode::BAD_REQUEST,
        Error::RoundNotOpen
        | Error::RoundExpired
        | Error::DuplicateVote
        | Error::ContestantMismatch { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &Error) -> Response {
    if !err.is_rejection() {
        tracing::error!("Request failed: {}", err);
    }
    (
        status_for(err),
        Json(ErrorResponse {
            error: err.to_string(),
            code: err.code().to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    use crate::broadcast::Gateway;
    use crate::config::IdentitySource;
    use crate::store::VoteStore;

    async fn app() -> (Router, Arc<AppState>, TempDir) {
        let dir = tempdir().unwrap();
        let store = Arc::new(VoteStore::open(&dir.path().join("voting.db")).unwrap());
        store.seed_contestants(&["Alice", "Bob"]).await.unwrap();
        let hub = VoteHub::new(store, Arc::new(Gateway::new()), Duration::from_secs(60))
            .await
            .unwrap();
        let sessions = Arc::new(SessionGate::new("secret", Duration::from_secs(600)));
        let server = HttpServer::new(
            ServerConfig::default(),
            hub,
            sessions,
            IdentityResolver::new(IdentitySource::Address, false),
        );
        let state = server.state();
        (HttpServer::create_router(Arc::clone(&state)), state, dir)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn login(app: &Router) -> String {
        let response = app
            .clone()
            .oneshot(post_json("/login", None, serde_json::json!({"password": "secret"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_some());
        body_json(response).await["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_and_state() {
        let (app, _state, _dir) = app().await;

        let response = app.clone().oneshot(Request::get("/health").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["healthy"], true);
        assert_eq!(json["mode"], "LANDING");

        let response = app.oneshot(Request::get("/contestants").body(Body::empty()).unwrap()).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json[0]["name"], "Alice");
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let (app, _state, _dir) = app().await;
        let response = app
            .oneshot(post_json("/login", None, serde_json::json!({"password": "nope"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_admin_requires_session() {
        let (app, state, _dir) = app().await;

        let response = app
            .clone()
            .oneshot(post_json("/admin/round/open", None, serde_json::json!({"contestant_id": 1})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(state.hub.snapshot().await.mode, Mode::Landing);

        let response = app
            .oneshot(post_json("/admin/round/open", Some("forged"), serde_json::json!({"contestant_id": 1})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(state.hub.snapshot().await.mode, Mode::Landing);
    }

    #[tokio::test]
    async fn test_admin_round_lifecycle() {
        let (app, state, _dir) = app().await;
        let token = login(&app).await;

        let response = app
            .clone()
            .oneshot(post_json(
                "/admin/round/open",
                Some(&token),
                serde_json::json!({"contestant_id": 2, "duration_seconds": 30}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["state"]["mode"], "VOTING");
        assert_eq!(json["state"]["active_contestant"]["name"], "Bob");

        let response = app
            .clone()
            .oneshot(post_json("/admin/round/close", Some(&token), serde_json::json!({"mode": "ENDED"})))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["changed"], true);
        assert_eq!(json["state"]["mode"], "ENDED");
        assert_eq!(state.hub.snapshot().await.mode, Mode::Ended);

        let response = app
            .oneshot(post_json("/admin/round/open", Some(&token), serde_json::json!({"contestant_id": 99})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "UNKNOWN_CONTESTANT");
    }

    #[tokio::test]
    async fn test_oversized_round_duration_is_bad_request() {
        let (app, state, _dir) = app().await;
        let token = login(&app).await;

        let response = app
            .oneshot(post_json(
                "/admin/round/open",
                Some(&token),
                serde_json::json!({"contestant_id": 1, "duration_seconds": 10_000_000_000_000u64}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.hub.snapshot().await.mode, Mode::Landing);
    }

    #[tokio::test]
    async fn test_reset_and_export() {
        let (app, state, _dir) = app().await;
        let token = login(&app).await;

        state.hub.open_round(1, None).await.unwrap();
        state
            .hub
            .submit_vote(&crate::model::VoterIdentity::new("10.0.0.1"), None, crate::model::VoteType::Yes)
            .await
            .unwrap();

        let request = Request::get("/admin/export?format=csv")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/csv"));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let csv = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(csv.contains("Alice"));
        assert!(csv.contains("10.0.0.1"));

        let response = app
            .clone()
            .oneshot(post_json("/admin/reset", Some(&token), serde_json::json!({"landing": true})))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["cleared_votes"], 1);
        assert_eq!(json["state"]["mode"], "LANDING");

        let response = app.oneshot(Request::get("/scores").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(body_json(response).await["scores"]["1"]["yes_count"], 0);
    }

    #[tokio::test]
    async fn test_session_cookie_accepted() {
        let (app, state, _dir) = app().await;
        let token = login(&app).await;
        state.hub.open_round(1, None).await.unwrap();
        assert_eq!(state.hub.snapshot().await.mode, Mode::Voting);

        let request = Request::post("/admin/landing")
            .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.hub.snapshot().await.mode, Mode::Landing);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&Error::DuplicateVote), StatusCode::CONFLICT);
        assert_eq!(status_for(&Error::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(&Error::Store("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
