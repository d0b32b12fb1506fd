//! # Ponies API Handlers
//!
//! Registration, heartbeat and management endpoints. Every route except registration
//! authenticates with the pony's passcode; an unknown name and a wrong passcode both
//! produce the same 404.

use axum::{
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::ApiError;
use crate::models::history::Model as HistoryModel;
use crate::models::pony::Model as PonyModel;
use crate::server::AppState;
use crate::service::{DEFAULT_HISTORY_LIMIT, NewPony, PonyUpdate, TransitionResult};

/// Public view of a pony. The passcode hash is never exposed.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PonyResponse {
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: String,
    #[schema(example = "backup-job")]
    pub name: String,
    /// Allowed silence in minutes
    pub dark_minute: i32,
    /// init | normal | missing
    #[schema(example = "normal")]
    pub status: String,
    /// Most recent heartbeat (RFC 3339), absent before the first one
    pub last_hi_time: Option<String>,
    pub notify_channel: String,
    pub notify_url: String,
    pub created_at: String,
}

impl From<PonyModel> for PonyResponse {
    fn from(pony: PonyModel) -> Self {
        Self {
            id: pony.id.to_string(),
            name: pony.name,
            dark_minute: pony.dark_minute,
            status: pony.status,
            last_hi_time: pony.last_hi_time.map(|at| at.to_rfc3339()),
            notify_channel: pony.notify_channel,
            notify_url: pony.notify_url,
            created_at: pony.created_at.to_rfc3339(),
        }
    }
}

/// Result of a heartbeat
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HeartbeatResponse {
    pub name: String,
    #[schema(example = "init")]
    pub previous_status: String,
    #[schema(example = "normal")]
    pub current_status: String,
    /// Whether the status changed (and a notification was queued)
    pub changed: bool,
    pub last_hi_time: Option<String>,
}

impl From<TransitionResult> for HeartbeatResponse {
    fn from(result: TransitionResult) -> Self {
        Self {
            name: result.pony.name,
            previous_status: result.previous.as_str().to_string(),
            current_status: result.current.as_str().to_string(),
            changed: result.changed,
            last_hi_time: result.pony.last_hi_time.map(|at| at.to_rfc3339()),
        }
    }
}

/// One recorded status change
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntry {
    pub previous_status: String,
    pub current_status: String,
    pub created_at: String,
}

impl From<HistoryModel> for HistoryEntry {
    fn from(record: HistoryModel) -> Self {
        Self {
            previous_status: record.previous_status,
            current_status: record.current_status,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HistoryResponse {
    pub name: String,
    /// Newest first
    pub entries: Vec<HistoryEntry>,
}

/// Passcode supplied as a query parameter
#[derive(Debug, Deserialize, IntoParams)]
pub struct PasscodeQuery {
    pub passcode: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryQuery {
    pub passcode: String,
    /// 1-100, default 20
    pub limit: Option<u64>,
}

/// Update payload; `passcode` authenticates, the rest are optional changes
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdatePonyRequest {
    pub passcode: String,
    pub dark_minute: Option<i32>,
    pub notify_channel: Option<String>,
    pub notify_url: Option<String>,
    pub new_passcode: Option<String>,
}

/// Register a pony
#[utoipa::path(
    post,
    path = "/api/v1/ponies",
    request_body = NewPony,
    responses(
        (status = 201, description = "Pony registered", body = PonyResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 409, description = "Name already taken", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "ponies"
)]
pub async fn create_pony(
    State(state): State<AppState>,
    payload: Result<Json<NewPony>, JsonRejection>,
) -> Result<(StatusCode, Json<PonyResponse>), ApiError> {
    let Json(new) = payload?;
    let pony = state.service.add_pony(new).await?;
    Ok((StatusCode::CREATED, Json(pony.into())))
}

/// Send a heartbeat
#[utoipa::path(
    get,
    path = "/api/v1/ponies/{name}/hello",
    params(("name" = String, Path, description = "Pony name"), PasscodeQuery),
    responses(
        (status = 200, description = "Heartbeat recorded", body = HeartbeatResponse),
        (status = 404, description = "Unknown pony or wrong passcode", body = ApiError),
        (status = 409, description = "Pony kept changing during the update", body = ApiError)
    ),
    tag = "ponies"
)]
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(name): Path<String>,
    query: Result<Query<PasscodeQuery>, QueryRejection>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let Query(query) = query?;
    let result = state.service.heartbeat(&name, &query.passcode).await?;
    Ok(Json(result.into()))
}

/// Send a heartbeat (POST form for clients that cannot issue GET)
#[utoipa::path(
    post,
    path = "/api/v1/ponies/{name}/hello",
    params(("name" = String, Path, description = "Pony name"), PasscodeQuery),
    responses(
        (status = 200, description = "Heartbeat recorded", body = HeartbeatResponse),
        (status = 404, description = "Unknown pony or wrong passcode", body = ApiError),
        (status = 409, description = "Pony kept changing during the update", body = ApiError)
    ),
    tag = "ponies"
)]
pub async fn heartbeat_post(
    state: State<AppState>,
    name: Path<String>,
    query: Result<Query<PasscodeQuery>, QueryRejection>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    heartbeat(state, name, query).await
}

/// Read a pony
#[utoipa::path(
    get,
    path = "/api/v1/ponies/{name}",
    params(("name" = String, Path, description = "Pony name"), PasscodeQuery),
    responses(
        (status = 200, description = "Pony details", body = PonyResponse),
        (status = 404, description = "Unknown pony or wrong passcode", body = ApiError)
    ),
    tag = "ponies"
)]
pub async fn get_pony(
    State(state): State<AppState>,
    Path(name): Path<String>,
    query: Result<Query<PasscodeQuery>, QueryRejection>,
) -> Result<Json<PonyResponse>, ApiError> {
    let Query(query) = query?;
    let pony = state.service.get_pony(&name, &query.passcode).await?;
    Ok(Json(pony.into()))
}

/// Update tolerance, notification target or passcode
#[utoipa::path(
    patch,
    path = "/api/v1/ponies/{name}",
    params(("name" = String, Path, description = "Pony name")),
    request_body = UpdatePonyRequest,
    responses(
        (status = 200, description = "Pony updated", body = PonyResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 404, description = "Unknown pony or wrong passcode", body = ApiError)
    ),
    tag = "ponies"
)]
pub async fn update_pony(
    State(state): State<AppState>,
    Path(name): Path<String>,
    payload: Result<Json<UpdatePonyRequest>, JsonRejection>,
) -> Result<Json<PonyResponse>, ApiError> {
    let Json(request) = payload?;
    let update = PonyUpdate {
        dark_minute: request.dark_minute,
        notify_channel: request.notify_channel,
        notify_url: request.notify_url,
        new_passcode: request.new_passcode,
    };

    let pony = state
        .service
        .update_pony(&name, &request.passcode, update)
        .await?;
    Ok(Json(pony.into()))
}

/// Remove a pony. Its history is kept.
#[utoipa::path(
    delete,
    path = "/api/v1/ponies/{name}",
    params(("name" = String, Path, description = "Pony name"), PasscodeQuery),
    responses(
        (status = 204, description = "Pony removed"),
        (status = 404, description = "Unknown pony or wrong passcode", body = ApiError)
    ),
    tag = "ponies"
)]
pub async fn delete_pony(
    State(state): State<AppState>,
    Path(name): Path<String>,
    query: Result<Query<PasscodeQuery>, QueryRejection>,
) -> Result<StatusCode, ApiError> {
    let Query(query) = query?;
    state.service.remove_pony(&name, &query.passcode).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List recorded status changes, newest first
#[utoipa::path(
    get,
    path = "/api/v1/ponies/{name}/history",
    params(("name" = String, Path, description = "Pony name"), HistoryQuery),
    responses(
        (status = 200, description = "Status history", body = HistoryResponse),
        (status = 400, description = "Invalid limit", body = ApiError),
        (status = 404, description = "Unknown pony or wrong passcode", body = ApiError)
    ),
    tag = "ponies"
)]
pub async fn list_history(
    State(state): State<AppState>,
    Path(name): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);

    let entries = state
        .service
        .list_history(&name, &query.passcode, limit)
        .await?;

    Ok(Json(HistoryResponse {
        name,
        entries: entries.into_iter().map(HistoryEntry::from).collect(),
    }))
}
