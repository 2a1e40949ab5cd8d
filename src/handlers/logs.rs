//! Log ingestion and query handlers

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::detection::pipeline::{self, IngestResponse};
use crate::models::{IngestLogRequest, LogEntryPayload};
use crate::storage::Storage;
use crate::AppState;

/// Cap on the logs-by-ip query.
const LOGS_BY_IP_LIMIT: i64 = 100;

/// Ingest one log record. Validation failures and a failed log write are
/// reported in the body; the endpoint itself always answers.
pub async fn ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestLogRequest>,
) -> Json<IngestResponse> {
    let response = pipeline::ingest_log(state.storage.as_ref(), &state.events, req).await;
    Json(response)
}

#[derive(Debug, Deserialize)]
pub struct LogsByIpQuery {
    pub ip: String,
}

/// Most recent log entries for one ip, newest first.
pub async fn by_ip(
    State(state): State<AppState>,
    Query(query): Query<LogsByIpQuery>,
) -> Json<Vec<LogEntryPayload>> {
    let logs = match state.storage.logs_by_ip(&query.ip, LOGS_BY_IP_LIMIT).await {
        Ok(logs) => logs,
        Err(e) => {
            tracing::error!("failed to query logs by ip: {}", e);
            Vec::new()
        }
    };

    Json(logs.into_iter().map(Into::into).collect())
}
