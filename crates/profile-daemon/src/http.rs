use crate::core::{ControlCommand, DaemonEvent, Responder};
use crate::error::SyncError;
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use profile_proto::activity::ActivityLog;
use profile_proto::protocol::{
    ApiError, Availability, AvailabilityRequest, BioRequest, ExportReport, ExportRequest,
    LogsResponse, RankRequest, SettingsEdit, SetupReport, StatusSnapshot,
};
use std::path::{Component, Path, PathBuf};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info, warn};

#[derive(Clone)]
struct HttpState {
    event_tx: mpsc::Sender<DaemonEvent>,
    activity: ActivityLog,
    export_dir: PathBuf,
    allowed_origins: Vec<String>,
}

/// Error body plus status; every failing handler answers `{"error": ...}`.
struct ApiFailure(StatusCode, String);

impl From<SyncError> for ApiFailure {
    fn from(err: SyncError) -> Self {
        let status = match &err {
            SyncError::Unreachable => StatusCode::SERVICE_UNAVAILABLE,
            SyncError::CredentialInvalid(_) => StatusCode::UNAUTHORIZED,
            SyncError::Transient(_) => StatusCode::BAD_GATEWAY,
            SyncError::ConfigurationInvalid(_) => StatusCode::BAD_REQUEST,
            SyncError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self(status, err.to_string())
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (self.0, Json(ApiError { error: self.1 })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiFailure>;

pub fn router(
    event_tx: mpsc::Sender<DaemonEvent>,
    activity: ActivityLog,
    export_dir: PathBuf,
    allowed_origins: Vec<String>,
) -> Router {
    // The desktop front end is a local webview on its own origin; only that
    // origin may make cross-origin calls.
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    let app_state = HttpState {
        event_tx,
        activity,
        export_dir,
        allowed_origins,
    };

    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/settings", put(update_settings))
        .route("/api/sync/enable", post(enable))
        .route("/api/sync/disable", post(disable))
        .route("/api/sync/test", post(test_setup))
        .route("/api/bio", post(apply_bio))
        .route("/api/rank", post(override_rank))
        .route("/api/availability", get(get_availability).put(set_availability))
        .route("/api/logs", get(get_logs).delete(clear_logs))
        .route("/api/logs/export", post(export_logs))
        .layer(cors)
        .layer(middleware::from_fn_with_state(app_state.clone(), check_origin))
        .with_state(app_state)
}

/// Refuse browser requests from pages other than the front end. Requests
/// without an `Origin` header (curl, the webview's own fetches on some
/// platforms) pass.
async fn check_origin(State(state): State<HttpState>, request: Request, next: Next) -> Response {
    if let Some(origin) = request.headers().get(header::ORIGIN) {
        let allowed = state
            .allowed_origins
            .iter()
            .any(|o| o.as_bytes() == origin.as_bytes());
        if !allowed {
            warn!("HTTP API: refused request from origin {:?}", origin);
            return ApiFailure(StatusCode::FORBIDDEN, "origin not allowed".to_string())
                .into_response();
        }
    }
    next.run(request).await
}

pub fn start_server(
    bind_address: String,
    port: u16,
    app: Router,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await });
        if let Err(e) = serve.await {
            error!("HTTP server error: {}", e);
        }
    })
}

/// Hand a command to the core loop and wait for its answer.
async fn request<T>(
    state: &HttpState,
    make: impl FnOnce(Responder<T>) -> ControlCommand,
) -> Result<T, ApiFailure> {
    let (reply, rx) = oneshot::channel();
    if state.event_tx.send(DaemonEvent::Control(make(reply))).await.is_err() {
        error!("Failed to send command: core loop is gone");
        return Err(core_gone());
    }
    match rx.await {
        Ok(result) => result.map_err(ApiFailure::from),
        Err(_) => Err(core_gone()),
    }
}

fn core_gone() -> ApiFailure {
    ApiFailure(
        StatusCode::INTERNAL_SERVER_ERROR,
        "daemon is shutting down".to_string(),
    )
}

async fn get_status(State(state): State<HttpState>) -> ApiResult<StatusSnapshot> {
    request(&state, ControlCommand::Status).await.map(Json)
}

async fn update_settings(
    State(state): State<HttpState>,
    Json(edit): Json<SettingsEdit>,
) -> ApiResult<StatusSnapshot> {
    info!("HTTP API: update settings");
    request(&state, |r| ControlCommand::UpdateSettings(edit, r))
        .await
        .map(Json)
}

async fn enable(State(state): State<HttpState>) -> ApiResult<StatusSnapshot> {
    info!("HTTP API: enable music sync");
    request(&state, ControlCommand::Enable).await.map(Json)
}

async fn disable(State(state): State<HttpState>) -> ApiResult<StatusSnapshot> {
    info!("HTTP API: disable music sync");
    request(&state, ControlCommand::Disable).await.map(Json)
}

async fn test_setup(State(state): State<HttpState>) -> ApiResult<SetupReport> {
    info!("HTTP API: test setup");
    request(&state, ControlCommand::TestSetup).await.map(Json)
}

async fn apply_bio(
    State(state): State<HttpState>,
    Json(body): Json<BioRequest>,
) -> Result<StatusCode, ApiFailure> {
    request(&state, |r| ControlCommand::ApplyBio(body.text, r)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn override_rank(
    State(state): State<HttpState>,
    Json(body): Json<RankRequest>,
) -> Result<StatusCode, ApiFailure> {
    info!("HTTP API: rank override {:?} {:?}", body.tier, body.division);
    request(&state, |r| ControlCommand::OverrideRank(body.tier, body.division, r)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_availability(State(state): State<HttpState>) -> ApiResult<AvailabilityRequest> {
    let availability: Availability = request(&state, ControlCommand::GetAvailability).await?;
    Ok(Json(AvailabilityRequest { availability }))
}

async fn set_availability(
    State(state): State<HttpState>,
    Json(body): Json<AvailabilityRequest>,
) -> Result<StatusCode, ApiFailure> {
    request(&state, |r| ControlCommand::SetAvailability(body.availability, r)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_logs(State(state): State<HttpState>) -> Json<LogsResponse> {
    Json(LogsResponse {
        entries: state.activity.entries(),
    })
}

async fn clear_logs(State(state): State<HttpState>) -> StatusCode {
    state.activity.clear();
    StatusCode::NO_CONTENT
}

async fn export_logs(
    State(state): State<HttpState>,
    body: Option<Json<ExportRequest>>,
) -> ApiResult<ExportReport> {
    let file_name = body.and_then(|Json(req)| req.file_name);
    let path = export_target(&state.export_dir, file_name)?;

    let activity = state.activity.clone();
    let target = path.clone();
    let entries = tokio::task::spawn_blocking(move || activity.export(&target))
        .await
        .map_err(|e| SyncError::Persistence(e.to_string()))?
        .map_err(|e| SyncError::Persistence(format!("{:#}", e)))?;

    info!("Exported {} activity entries to {:?}", entries, path);
    Ok(Json(ExportReport { path, entries }))
}

/// Resolve the export file inside `dir`. A caller-supplied name must be a
/// single plain component: no separators, no `..`, not absolute.
fn export_target(dir: &Path, file_name: Option<String>) -> Result<PathBuf, SyncError> {
    let Some(name) = file_name else {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        return Ok(dir.join(format!("activity-{}.log", stamp)));
    };
    let mut components = Path::new(name.trim()).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) => Ok(dir.join(part)),
        _ => Err(SyncError::ConfigurationInvalid(format!(
            "Export file name {:?} must not contain a path",
            name
        ))),
    }
}
