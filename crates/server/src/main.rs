use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use server_api::{badge, ApiContext};
use shared::{
    domain::TeamId,
    error::{ApiError, ErrorCode},
    protocol::{
        AttendanceStats, RegisterTeamRequest, RegisterTeamResponse, TeamLookupResponse,
        TeamRoster, UpdateMembersRequest, UpdateMembersResponse,
    },
};
use storage::Storage;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};

mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, prepare_database_url};

const MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// Error body shared by every endpoint. `error` matches the in-band shape of
/// a missed team lookup so browser clients can check a single field.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: ErrorCode,
}

type HttpError = (StatusCode, Json<ErrorResponse>);

fn http_error(err: ApiError) -> HttpError {
    let status = match err.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(message = %err.message, "request failed");
    }
    (
        status,
        Json(ErrorResponse {
            error: err.message,
            code: err.code,
        }),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let state = AppState {
        api: ApiContext { storage },
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "check-in server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/register", post(http_register))
        .route("/team/:team_id", get(http_get_team))
        .route("/team_payload/:team_id", get(http_team_payload))
        .route("/team_qr/:team_id", get(http_team_qr))
        .route("/export_qrs", get(http_export_qrs))
        .route("/update_members", post(http_update_members))
        .route("/admin", get(http_admin))
        .route("/delete_team/:team_id", post(http_delete_team))
        .route("/delete_all", post(http_delete_all))
        .route("/stats", get(http_stats))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BYTES))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    state
        .api
        .storage
        .health_check()
        .await
        .map_err(|e| http_error(ApiError::internal(e.to_string())))?;
    Ok("ok")
}

async fn http_register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterTeamRequest>,
) -> Result<Json<RegisterTeamResponse>, HttpError> {
    server_api::register_team(&state.api, req)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_get_team(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
) -> Result<Json<TeamLookupResponse>, HttpError> {
    server_api::lookup_team(&state.api, &TeamId(team_id))
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_team_payload(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let payload = server_api::team_payload(&state.api, &TeamId(team_id))
        .await
        .map_err(http_error)?;
    Ok(([(header::CONTENT_TYPE, "application/json")], payload))
}

async fn http_team_qr(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let png = server_api::team_badge_png(&state.api, &TeamId(team_id))
        .await
        .map_err(http_error)?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

async fn http_export_qrs(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, HttpError> {
    let archive = server_api::export_badges(&state.api)
        .await
        .map_err(http_error)?;
    let disposition = format!("attachment; filename=\"{}\"", badge::EXPORT_FILE_NAME);
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        archive,
    ))
}

async fn http_update_members(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateMembersRequest>,
) -> Result<Json<UpdateMembersResponse>, HttpError> {
    server_api::update_members(&state.api, &req.members)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_admin(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TeamRoster>>, HttpError> {
    server_api::list_teams(&state.api)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_delete_team(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
) -> Result<Redirect, HttpError> {
    server_api::delete_team(&state.api, &TeamId(team_id))
        .await
        .map_err(http_error)?;
    Ok(Redirect::to("/admin"))
}

async fn http_delete_all(State(state): State<Arc<AppState>>) -> Result<Redirect, HttpError> {
    server_api::delete_all(&state.api).await.map_err(http_error)?;
    Ok(Redirect::to("/admin"))
}

async fn http_stats(State(state): State<Arc<AppState>>) -> Result<Json<AttendanceStats>, HttpError> {
    server_api::attendance_stats(&state.api)
        .await
        .map(Json)
        .map_err(http_error)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
