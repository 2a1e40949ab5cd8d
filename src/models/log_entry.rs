//! LogEntry model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// One observed event, persisted verbatim at ingestion. Immutable after
/// creation; retention is an external concern.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LogEntry {
    pub id: i64,
    pub source: String,
    pub event: String,
    pub event_type: Option<String>,
    pub ip: String,
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
}

/// Fields for a new log entry; id and timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub source: String,
    pub event: String,
    pub event_type: Option<String>,
    pub ip: String,
    pub user_name: String,
}

/// Ingestion request body. Required fields are optional at the serde
/// layer so an omitted field surfaces as a validation failure in the
/// response body instead of a deserialization rejection.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct IngestLogRequest {
    #[validate(
        required(message = "source is required"),
        length(min = 1, message = "source is required")
    )]
    pub source: Option<String>,
    #[validate(
        required(message = "event is required"),
        length(min = 1, message = "event is required")
    )]
    pub event: Option<String>,
    pub event_type: Option<String>,
    #[validate(
        required(message = "ip is required"),
        length(min = 1, message = "ip is required")
    )]
    pub ip: Option<String>,
    #[validate(
        required(message = "user is required"),
        length(min = 1, message = "user is required")
    )]
    pub user: Option<String>,
}

impl From<IngestLogRequest> for NewLogEntry {
    fn from(req: IngestLogRequest) -> Self {
        Self {
            source: req.source.unwrap_or_default(),
            event: req.event.unwrap_or_default(),
            event_type: req.event_type,
            ip: req.ip.unwrap_or_default(),
            user_name: req.user.unwrap_or_default(),
        }
    }
}

/// Wire representation: string id, RFC 3339 timestamp.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntryPayload {
    pub id: String,
    pub source: String,
    pub event: String,
    pub event_type: Option<String>,
    pub ip: String,
    pub user: String,
    pub timestamp: String,
}

impl From<LogEntry> for LogEntryPayload {
    fn from(log: LogEntry) -> Self {
        Self {
            id: log.id.to_string(),
            source: log.source,
            event: log.event,
            event_type: log.event_type,
            ip: log.ip,
            user: log.user_name,
            timestamp: log.timestamp.to_rfc3339(),
        }
    }
}
