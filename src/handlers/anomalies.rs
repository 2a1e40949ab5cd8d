//! Anomaly query and lifecycle handlers

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::MutationResponse;
use crate::models::{Anomaly, AnomalyPayload, AnomalyStatus};
use crate::storage::Storage;
use crate::{AppError, AppResult, AppState};

const DEFAULT_LIMIT: i64 = 15;

#[derive(Debug, Deserialize, Default)]
pub struct AnomalyListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomaliesResponse {
    pub anomalies: Vec<AnomalyPayload>,
    pub total_count: i64,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

/// One page of anomalies, newest first, with pagination flags.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<AnomalyListQuery>,
) -> Json<AnomaliesResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).max(0);
    let offset = query.offset.unwrap_or(0).max(0);

    let (rows, total_count) = match state.storage.list_anomalies(limit, offset).await {
        Ok(page) => page,
        Err(e) => {
            tracing::error!("failed to list anomalies: {}", e);
            (Vec::new(), 0)
        }
    };

    let mut anomalies = Vec::with_capacity(rows.len());
    for row in rows {
        anomalies.push(to_payload(state.storage.as_ref(), row).await);
    }

    Json(AnomaliesResponse {
        anomalies,
        total_count,
        has_next_page: offset + limit < total_count,
        has_previous_page: offset > 0,
    })
}

/// Attach the originating log entry when one is linked; lookup failures
/// degrade to a detached payload.
async fn to_payload(storage: &dyn Storage, anomaly: Anomaly) -> AnomalyPayload {
    let log = match anomaly.log_entry_id {
        Some(log_id) => storage.find_log(log_id).await.unwrap_or_else(|e| {
            tracing::error!("failed to load linked log entry: {}", e);
            None
        }),
        None => None,
    };

    AnomalyPayload::from(anomaly).with_log(log.map(Into::into))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAnomalyStatusRequest {
    pub status: String,
    pub resolution_notes: Option<String>,
    pub resolved_by: Option<String>,
}

/// Update an anomaly's lifecycle status, enforcing the transition rules:
/// OPEN may move anywhere, INVESTIGATING may only close out, and the
/// terminal states never change again.
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateAnomalyStatusRequest>,
) -> AppResult<Json<MutationResponse>> {
    let next = AnomalyStatus::parse(&req.status)
        .ok_or_else(|| AppError::ValidationError(format!("Invalid status '{}'", req.status)))?;

    let current = state
        .storage
        .find_anomaly(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Anomaly not found".to_string()))?;

    let current_status = AnomalyStatus::parse(&current.status).ok_or_else(|| {
        AppError::DatabaseError(format!(
            "anomaly {} has invalid stored status '{}'",
            id, current.status
        ))
    })?;

    if !current_status.can_transition_to(next) {
        return Err(AppError::ValidationError(format!(
            "Cannot transition from {} to {}",
            current_status.as_str(),
            next.as_str()
        )));
    }

    state
        .storage
        .update_anomaly_status(id, next, req.resolution_notes, req.resolved_by)
        .await?
        .ok_or_else(|| AppError::NotFound("Anomaly not found".to_string()))?;

    Ok(Json(MutationResponse::ok(format!(
        "Anomaly {} marked {}",
        id,
        next.as_str()
    ))))
}
