//! Storage boundary
//!
//! The detection core talks to persistence only through the [`Storage`]
//! trait. `PgStorage` is the production implementation; `MemoryStorage`
//! backs tests and database-less development.

mod memory;
mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Anomaly, AnomalyStatus, LogEntry, NewAnomaly, NewLogEntry};

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist a new log entry; id and timestamp are assigned here.
    async fn create_log(&self, log: NewLogEntry) -> StorageResult<LogEntry>;

    async fn find_log(&self, id: i64) -> StorageResult<Option<LogEntry>>;

    /// Count log entries matching ip + event type at or after `since`.
    async fn count_logs_by_ip_and_type(
        &self,
        ip: &str,
        event_type: &str,
        since: DateTime<Utc>,
    ) -> StorageResult<i64>;

    /// Most recent log entries, newest first, excluding the given ids.
    async fn recent_logs_excluding(
        &self,
        exclude: &[i64],
        limit: i64,
    ) -> StorageResult<Vec<LogEntry>>;

    /// Most recent log entries for an ip, newest first.
    async fn logs_by_ip(&self, ip: &str, limit: i64) -> StorageResult<Vec<LogEntry>>;

    /// Persist a new anomaly with OPEN status. Confidence is clamped to
    /// the 0-100 scale, never rejected.
    async fn create_anomaly(&self, anomaly: NewAnomaly) -> StorageResult<Anomaly>;

    async fn find_anomaly(&self, id: i64) -> StorageResult<Option<Anomaly>>;

    /// Dedup lookup: an anomaly for this ip and originating log at or
    /// after `since`.
    async fn find_recent_anomaly(
        &self,
        ip: &str,
        log_entry_id: i64,
        since: DateTime<Utc>,
    ) -> StorageResult<Option<Anomaly>>;

    /// Upgrade a rule-based anomaly to HYBRID, attaching AI fields.
    /// Severity and reason are left untouched.
    async fn upgrade_to_hybrid(
        &self,
        id: i64,
        ai_explanation: Option<String>,
        recommended_action: Option<String>,
        confidence_score: Option<f32>,
    ) -> StorageResult<Option<Anomaly>>;

    /// Update lifecycle status. Terminal statuses stamp `resolved_at` and
    /// record notes/resolver when provided.
    async fn update_anomaly_status(
        &self,
        id: i64,
        status: AnomalyStatus,
        resolution_notes: Option<String>,
        resolved_by: Option<String>,
    ) -> StorageResult<Option<Anomaly>>;

    /// One page of anomalies ordered by timestamp descending, plus the
    /// total row count.
    async fn list_anomalies(&self, limit: i64, offset: i64)
        -> StorageResult<(Vec<Anomaly>, i64)>;

    async fn anomalies_by_ip(&self, ip: &str) -> StorageResult<Vec<Anomaly>>;

    /// Anomalies at or after `since`, newest first, capped at `limit`.
    async fn anomalies_since(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> StorageResult<Vec<Anomaly>>;
}
