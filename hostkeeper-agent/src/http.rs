//! Operator control API
//!
//! - `x-api-key` header required on every route except `/health`
//! - On-demand checks run through the same engine as scheduled cycles and
//!   notify the operator the same way
//! - Start/stop/restart only for configured services and containers

use crate::backends::UnitAction;
use crate::error::MonitorError;
use crate::metrics::SystemMetrics;
use crate::models::{EntityDescriptor, EntityKind, HealthStatus};
use crate::monitor::{ControlOutcome, CycleReport, Monitor};
use crate::state::StateSnapshot;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
    /// `None` or empty denies every protected route
    pub api_key: Option<Arc<str>>,
}

#[derive(Debug, Serialize)]
struct HealthView {
    status: &'static str,
    host: String,
    entities: usize,
}

#[derive(Debug, Serialize)]
struct ActionView {
    ok: bool,
    action: UnitAction,
    name: String,
    output: String,
    status: HealthStatus,
    detail: String,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(code: StatusCode, message: impl Into<String>) -> ApiError {
    (code, Json(serde_json::json!({ "ok": false, "error": message.into() })))
}

async fn require_api_key(
    State(app): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let Some(expected) = app.api_key.as_deref().filter(|k| !k.is_empty()) else {
        warn!("HOSTKEEPER_API_KEY not set, API access denied");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        warn!("Rejected API request to {}", req.uri().path());
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(get_status))
        .route("/entities", get(list_entities))
        .route("/system", get(get_system))
        .route("/check", post(check_all))
        .route("/check/{kind}", post(check_kind))
        .route("/check/{kind}/{*name}", post(check_entity))
        .route("/services/{name}/{action}", post(control_service))
        .route("/containers/{name}/{action}", post(control_container))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_api_key))
        .with_state(app_state)
}

// GET /health
async fn health(State(app): State<AppState>) -> Json<HealthView> {
    Json(HealthView {
        status: "ok",
        host: gethostname::gethostname().to_string_lossy().into_owned(),
        entities: app.monitor.entities().len(),
    })
}

// GET /status (stored statuses)
async fn get_status(State(app): State<AppState>) -> Json<StateSnapshot> {
    Json(app.monitor.stored_states().await)
}

// GET /entities
async fn list_entities(State(app): State<AppState>) -> Json<Vec<EntityDescriptor>> {
    Json(app.monitor.entities().to_vec())
}

// GET /system
async fn get_system(State(app): State<AppState>) -> Json<SystemMetrics> {
    Json(app.monitor.system_info().await)
}

// POST /check
async fn check_all(State(app): State<AppState>) -> Json<CycleReport> {
    Json(app.monitor.check_all().await)
}

// POST /check/{kind}
async fn check_kind(
    State(app): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<CycleReport>, ApiError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(app.monitor.check_kind(kind).await))
}

// POST /check/{kind}/{name}
async fn check_entity(
    State(app): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Result<Json<CycleReport>, ApiError> {
    let kind = parse_kind(&kind)?;
    app.monitor
        .check_entity(kind, &name)
        .await
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("{} {} is not monitored", kind, name)))
}

// POST /services/{name}/{action}
async fn control_service(
    State(app): State<AppState>,
    Path((name, action)): Path<(String, String)>,
) -> Result<Json<ActionView>, ApiError> {
    control(&app, EntityKind::Service, name, &action).await
}

// POST /containers/{name}/{action}
async fn control_container(
    State(app): State<AppState>,
    Path((name, action)): Path<(String, String)>,
) -> Result<Json<ActionView>, ApiError> {
    control(&app, EntityKind::Container, name, &action).await
}

async fn control(
    app: &AppState,
    kind: EntityKind,
    name: String,
    action: &str,
) -> Result<Json<ActionView>, ApiError> {
    let action = UnitAction::parse(action).ok_or_else(|| {
        api_error(StatusCode::BAD_REQUEST, format!("unknown action {}, expected start, stop or restart", action))
    })?;

    match app.monitor.control(kind, &name, action).await {
        Ok(ControlOutcome { report, status }) => Ok(Json(ActionView {
            ok: report.success,
            action,
            name,
            output: report.output,
            status: status.status,
            detail: status.detail,
        })),
        Err(e @ MonitorError::UnknownEntity { .. }) => Err(api_error(StatusCode::NOT_FOUND, e.to_string())),
        Err(e) => Err(api_error(StatusCode::BAD_GATEWAY, e.to_string())),
    }
}

fn parse_kind(segment: &str) -> Result<EntityKind, ApiError> {
    EntityKind::from_segment(segment)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("unknown entity kind {}", segment)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::Backends;
    use crate::execution::CommandExecutor;
    use crate::notifier::{LogSink, Notifier, OperatorId};
    use crate::probe::ProbeSettings;
    use crate::remediate::RemediationSettings;
    use crate::state::StateStore;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn router(dir: &TempDir, api_key: Option<&str>) -> Router {
        let notifier = Notifier::new(Arc::new(LogSink), OperatorId(1), true, Duration::from_secs(5));
        let monitor = Monitor::new(
            vec![EntityDescriptor::service("nginx"), EntityDescriptor::container("homeassistant")],
            Backends::system(CommandExecutor::new(Duration::from_secs(5), false)),
            ProbeSettings::default(),
            RemediationSettings::default(),
            notifier,
            Arc::new(StateStore::new(dir.path().join("server_states.json"))),
        );
        build_router(AppState {
            monitor: Arc::new(monitor),
            api_key: api_key.map(Arc::from),
        })
    }

    fn request(method: &str, uri: &str, key: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header("x-api-key", key);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_needs_no_key() {
        let dir = TempDir::new().unwrap();
        let response = router(&dir, None)
            .oneshot(request("GET", "/health", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_or_wrong_key_rejected() {
        let dir = TempDir::new().unwrap();
        let app = router(&dir, Some("s3cret"));

        let response = app.clone().oneshot(request("GET", "/status", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.oneshot(request("GET", "/status", Some("nope"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unset_key_denies_protected_routes() {
        let dir = TempDir::new().unwrap();
        let response = router(&dir, None)
            .oneshot(request("GET", "/entities", Some("")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_status_empty_before_first_cycle() {
        let dir = TempDir::new().unwrap();
        let response = router(&dir, Some("k"))
            .oneshot(request("GET", "/status", Some("k")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"{}");
    }

    #[tokio::test]
    async fn test_unconfigured_entity_cannot_be_controlled() {
        let dir = TempDir::new().unwrap();
        let response = router(&dir, Some("k"))
            .oneshot(request("POST", "/services/sshd/restart", Some("k")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_action_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let response = router(&dir, Some("k"))
            .oneshot(request("POST", "/containers/homeassistant/rm", Some("k")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_kind_and_name_are_not_found() {
        let dir = TempDir::new().unwrap();
        let app = router(&dir, Some("k"));

        let response = app.clone().oneshot(request("POST", "/check/printers", Some("k"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.oneshot(request("POST", "/check/services/ghost", Some("k"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
