/**
 * API REST MPPT KERNEL - Serveur HTTP du kernel
 *
 * RÔLE :
 * Expose l'état du kernel et le live view aux navigateurs et outils.
 *
 * FONCTIONNEMENT :
 * - GET  /health                → "ok", toujours accessible
 * - GET  /system/health         → compteurs du kernel
 * - GET  /api/livedata/status   → vue consolidée de la flotte (JSON)
 * - GET  /ws/livedata           → flux websocket du live view
 * - POST /api/publish/force     → cycle MQTT complet + réannonce HA au tick suivant
 *
 * SÉCURITÉ :
 * - Routes GET ouvertes si `live.allow_readonly`
 * - Sinon, et pour toute écriture : header x-api-key == MPPT_API_KEY
 */

use crate::clock::MonotonicClock;
use crate::config::KernelConfig;
use crate::fleet::Fleet;
use crate::health::{HealthTracker, KernelHealth};
use crate::hub::{self, LiveHub};
use crate::state::{ForceFlag, Shared};
use crate::transport::LiveSink;
use crate::view::LiveView;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub fleet: Shared<Fleet>,
    pub cfg: Arc<KernelConfig>,
    pub clock: MonotonicClock,
    pub hub: LiveHub,
    pub force: ForceFlag,
    pub health_tracker: HealthTracker,
}

async fn require_api_key(State(app): State<AppState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    let path = req.uri().path();

    // Health check toujours accessible
    if path == "/health" {
        return Ok(next.run(req).await);
    }
    if req.method() == Method::GET && app.cfg.live.allow_readonly {
        return Ok(next.run(req).await);
    }

    let expected = std::env::var("MPPT_API_KEY").unwrap_or_default();
    if expected.is_empty() {
        warn!("SECURITY: MPPT_API_KEY not set - API access denied");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        warn!("[http] unauthorized {} {}", req.method(), path);
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/api/livedata/status", get(get_livedata_status))
        .route("/ws/livedata", get(livedata_ws))
        .route("/api/publish/force", post(force_publish))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_api_key))
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    let now = app.clock.now();
    let devices = {
        let fleet = app.fleet.lock();
        let valid = (0..fleet.len()).filter(|i| fleet.is_data_valid(*i, now)).count();
        (fleet.len() as u32, valid as u32)
    };
    Json(app.health_tracker.get_health(devices, app.hub.viewer_count()))
}

// GET /api/livedata/status
async fn get_livedata_status(State(app): State<AppState>) -> Json<LiveView> {
    let view = LiveView::build(&app.fleet.lock(), app.clock.now(), app.cfg.publish.include_invalid_in_aggregates);
    Json(view)
}

// GET /ws/livedata
async fn livedata_ws(ws: WebSocketUpgrade, State(app): State<AppState>) -> Response {
    hub::upgrade(ws, app.hub.clone())
}

// POST /api/publish/force
async fn force_publish(State(app): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    app.force.raise();
    (StatusCode::ACCEPTED, Json(serde_json::json!({ "ok": true, "msg": "full refresh scheduled" })))
}
