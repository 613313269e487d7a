/**
 * API HTTP LEGION - Surface HTTP/WebSocket du relais
 *
 * RÔLE :
 * Routeur Axum unique : présence robots (REST), upgrades WebSocket par
 * (canal, rôle, robot) et fallback MJPEG pour les viewers sans WebSocket.
 *
 * ROUTES :
 * - GET  /, /health, /system/health
 * - GET  /api/robots?online=1|0
 * - POST /api/robots/register, /api/clients/register
 * - GET  /ws/{channel}/{robot|client}/{robot_id}
 * - GET  /stream/{channel}/{robot_id}?fps=N
 * - GET  /mjpeg/{robot_id}, /mjpeg/thermal/{robot_id}  (anciens chemins)
 *
 * CORS : ouvert sur les routes /api (le dashboard web est servi depuis une autre origine).
 */

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderValue},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{CorsConf, RelayConfig};
use crate::error::ApiError;
use crate::health::{HealthTracker, RelayHealth};
use crate::payload::ChannelKind;
use crate::polling::{content_type, poll_stream};
use crate::presence::now_unix;
use crate::relay::{
    ClientRegisterRequest, ClientRegisterResponse, RegisterRequest, RegisterResponse, Relay,
    SharedRelay,
};
use crate::ws::ws_handler;

pub const SERVICE_NAME: &str = "legionm3";

#[derive(Clone)]
pub struct AppState {
    pub relay: SharedRelay,
    pub config: Arc<RelayConfig>,
    pub health_tracker: HealthTracker,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            relay: Arc::new(Relay::new(&config)),
            config: Arc::new(config),
            health_tracker: HealthTracker::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RobotsParams {
    online: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamParams {
    fps: Option<String>,
}

impl StreamParams {
    /// Requested rate; non-numeric values fall back to the default, out-of-range ones get clamped later.
    fn fps(&self) -> Option<u32> {
        let fps: i64 = self.fps.as_deref()?.trim().parse().ok()?;
        Some(u32::try_from(fps.max(0)).unwrap_or(u32::MAX))
    }
}

fn cors_layer(conf: Option<&CorsConf>) -> CorsLayer {
    let origins: Vec<HeaderValue> = conf
        .map(|c| c.allow_origins.iter().filter_map(|o| o.parse().ok()).collect())
        .unwrap_or_default();
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

pub fn build_router(app_state: AppState) -> Router {
    let api = Router::new()
        .route("/api/robots", get(list_robots))
        .route("/api/robots/register", post(register_robot))
        .route("/api/clients/register", post(register_client))
        .layer(cors_layer(app_state.config.cors.as_ref()));

    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/system/health", get(get_system_health))
        .route("/ws/{channel}/{role}/{robot_id}", get(ws_handler))
        .route("/stream/{channel}/{robot_id}", get(stream_channel))
        .route("/mjpeg/{robot_id}", get(mjpeg_video))
        .route("/mjpeg/thermal/{robot_id}", get(mjpeg_thermal))
        .merge(api)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}

// GET /
async fn home(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "ok": true,
        "service": SERVICE_NAME,
        "robots": app.relay.presence().len(),
        "ts": now_unix(),
    }))
}

// GET /health
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true, "ts": now_unix() }))
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<RelayHealth> {
    Json(app.health_tracker.get_health(&app.relay))
}

// GET /api/robots?online=1
async fn list_robots(
    State(app): State<AppState>,
    Query(params): Query<RobotsParams>,
) -> Json<serde_json::Value> {
    let online_only = params.online.as_deref() == Some("1");
    let robots = app.relay.presence().list(online_only);
    Json(serde_json::json!({ "robots": robots }))
}

// POST /api/robots/register — corps JSON invalide traité comme {}
async fn register_robot(
    State(app): State<AppState>,
    body: Bytes,
) -> Result<Json<RegisterResponse>, ApiError> {
    let req: RegisterRequest = serde_json::from_slice(&body).unwrap_or_default();
    app.relay.register_robot(&req).map(Json)
}

// POST /api/clients/register
async fn register_client(
    State(app): State<AppState>,
    body: Bytes,
) -> Result<Json<ClientRegisterResponse>, ApiError> {
    let req: ClientRegisterRequest = serde_json::from_slice(&body).unwrap_or_default();
    app.relay.register_client(&req).map(Json)
}

fn stream_response(
    app: &AppState,
    kind: ChannelKind,
    robot_id: &str,
    fps: Option<u32>,
) -> Result<Response, ApiError> {
    if !kind.policy().caches_latest {
        return Err(ApiError::not_found(format!("channel {kind} has no frame to stream")));
    }
    let stream_conf = &app.config.stream;
    let hub = app.relay.hubs(kind).hub(robot_id);
    let frames = poll_stream(hub, stream_conf.effective_fps(fps), stream_conf.boundary.clone());
    let body = Body::from_stream(frames.map(Ok::<_, Infallible>));
    Response::builder()
        .header(header::CONTENT_TYPE, content_type(&stream_conf.boundary))
        .header(header::CACHE_CONTROL, "no-cache, no-store")
        .body(body)
        .map_err(|e| ApiError::internal(e.to_string()))
}

// GET /stream/{channel}/{robot_id}
async fn stream_channel(
    State(app): State<AppState>,
    Path((channel, robot_id)): Path<(String, String)>,
    Query(params): Query<StreamParams>,
) -> Result<Response, ApiError> {
    let kind: ChannelKind = channel.parse()?;
    stream_response(&app, kind, &robot_id, params.fps())
}

// GET /mjpeg/{robot_id}
async fn mjpeg_video(
    State(app): State<AppState>,
    Path(robot_id): Path<String>,
    Query(params): Query<StreamParams>,
) -> Result<Response, ApiError> {
    stream_response(&app, ChannelKind::Video, &robot_id, params.fps())
}

// GET /mjpeg/thermal/{robot_id}
async fn mjpeg_thermal(
    State(app): State<AppState>,
    Path(robot_id): Path<String>,
    Query(params): Query<StreamParams>,
) -> Result<Response, ApiError> {
    stream_response(&app, ChannelKind::Thermal, &robot_id, params.fps())
}
