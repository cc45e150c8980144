use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{ConceptStore, SyncAuditLog};
use crate::error::SyncError;
use crate::models::{ConceptPatch, ConceptRecord, SyncAttempt};
use crate::sync::{ItemUpdateGuard, SyncCoordinator, SyncItem, SyncReport};

use super::{AppState, AuthUser};

/// Default and maximum page size for the audit query.
const DEFAULT_ATTEMPT_LIMIT: i64 = 20;
const MAX_ATTEMPT_LIMIT: i64 = 100;

/// Error payload returned to clients.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    error: &'static str,
    message: String,
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match &err {
            SyncError::Validation(_) => ApiError {
                status: StatusCode::BAD_REQUEST,
                error: "validation_error",
                message: err.to_string(),
            },
            SyncError::VersionMismatch { .. } => ApiError {
                status: StatusCode::CONFLICT,
                error: "version_conflict",
                message: format!(
                    "{}. Refetch the record and retry with the current version.",
                    err
                ),
            },
            SyncError::NotFound(_) => ApiError {
                status: StatusCode::NOT_FOUND,
                error: "not_found",
                message: err.to_string(),
            },
            SyncError::Duplicate(_) => ApiError {
                status: StatusCode::CONFLICT,
                error: "duplicate_concept",
                message: err.to_string(),
            },
            // Storage faults stay generic on the wire; details go to the
            // log and the audit row.
            SyncError::Database(e) => {
                tracing::error!("storage failure: {}", e);
                ApiError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    error: "server_error",
                    message: "Internal server error".to_string(),
                }
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: crate::version(),
    })
}

#[derive(Serialize)]
pub struct MeResponse {
    user_id: String,
}

pub async fn me(Extension(user): Extension<AuthUser>) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: user.user_id,
    })
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub device_label: Option<String>,
    #[serde(default)]
    pub concepts: Vec<SyncItem>,
}

pub async fn sync_batch(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncReport>, ApiError> {
    let coordinator = SyncCoordinator::new(state.pool.clone());
    let report = coordinator
        .sync_batch(&user.user_id, request.device_label, &request.concepts)
        .await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct AttemptsQuery {
    pub limit: Option<i64>,
}

pub async fn recent_attempts(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<AttemptsQuery>,
) -> Result<Json<Vec<SyncAttempt>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ATTEMPT_LIMIT)
        .clamp(1, MAX_ATTEMPT_LIMIT);
    let attempts = SyncAuditLog::new(state.pool.clone())
        .recent(&user.user_id, limit)
        .await?;
    Ok(Json(attempts))
}

pub async fn list_concepts(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<ConceptRecord>>, ApiError> {
    let concepts = ConceptStore::new(state.pool.clone())
        .list(&user.user_id)
        .await?;
    Ok(Json(concepts))
}

#[derive(Debug, Deserialize)]
pub struct CreateConceptRequest {
    pub concept_type: String,
    #[serde(flatten)]
    pub fields: ConceptPatch,
}

pub async fn create_concept(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateConceptRequest>,
) -> Result<(StatusCode, Json<ConceptRecord>), ApiError> {
    let guard = ItemUpdateGuard::new(state.pool.clone());
    let record = guard
        .create(&user.user_id, &request.concept_type, &request.fields)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateConceptRequest {
    pub version: Option<i64>,
    #[serde(flatten)]
    pub fields: ConceptPatch,
}

pub async fn update_concept(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateConceptRequest>,
) -> Result<Json<ConceptRecord>, ApiError> {
    let guard = ItemUpdateGuard::new(state.pool.clone());
    let record = guard
        .update(&user.user_id, id, request.version, &request.fields)
        .await?;
    Ok(Json(record))
}

pub async fn delete_concept(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    ItemUpdateGuard::new(state.pool.clone())
        .delete(&user.user_id, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
