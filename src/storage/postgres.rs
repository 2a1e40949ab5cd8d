//! PostgreSQL storage implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{Storage, StorageResult};
use crate::models::{clamp_score, Anomaly, AnomalyStatus, LogEntry, NewAnomaly, NewLogEntry};

pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn create_log(&self, log: NewLogEntry) -> StorageResult<LogEntry> {
        let row = sqlx::query_as::<_, LogEntry>(
            r#"
            INSERT INTO log_entries (source, event, event_type, ip, user_name)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&log.source)
        .bind(&log.event)
        .bind(&log.event_type)
        .bind(&log.ip)
        .bind(&log.user_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_log(&self, id: i64) -> StorageResult<Option<LogEntry>> {
        let row = sqlx::query_as::<_, LogEntry>("SELECT * FROM log_entries WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn count_logs_by_ip_and_type(
        &self,
        ip: &str,
        event_type: &str,
        since: DateTime<Utc>,
    ) -> StorageResult<i64> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM log_entries
            WHERE ip = $1 AND event_type = $2 AND timestamp >= $3
            "#,
        )
        .bind(ip)
        .bind(event_type)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }

    async fn recent_logs_excluding(
        &self,
        exclude: &[i64],
        limit: i64,
    ) -> StorageResult<Vec<LogEntry>> {
        let rows = sqlx::query_as::<_, LogEntry>(
            r#"
            SELECT * FROM log_entries
            WHERE id <> ALL($1)
            ORDER BY timestamp DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(exclude.to_vec())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn logs_by_ip(&self, ip: &str, limit: i64) -> StorageResult<Vec<LogEntry>> {
        let rows = sqlx::query_as::<_, LogEntry>(
            r#"
            SELECT * FROM log_entries
            WHERE ip = $1
            ORDER BY timestamp DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(ip)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn create_anomaly(&self, anomaly: NewAnomaly) -> StorageResult<Anomaly> {
        let row = sqlx::query_as::<_, Anomaly>(
            r#"
            INSERT INTO anomalies
                (ip, severity, reason, detection_source, ai_explanation,
                 recommended_action, confidence_score, log_entry_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(&anomaly.ip)
        .bind(anomaly.severity.as_str())
        .bind(&anomaly.reason)
        .bind(anomaly.detection_source.as_str())
        .bind(&anomaly.ai_explanation)
        .bind(&anomaly.recommended_action)
        .bind(anomaly.confidence_score.map(clamp_score))
        .bind(anomaly.log_entry_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_anomaly(&self, id: i64) -> StorageResult<Option<Anomaly>> {
        let row = sqlx::query_as::<_, Anomaly>("SELECT * FROM anomalies WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn find_recent_anomaly(
        &self,
        ip: &str,
        log_entry_id: i64,
        since: DateTime<Utc>,
    ) -> StorageResult<Option<Anomaly>> {
        let row = sqlx::query_as::<_, Anomaly>(
            r#"
            SELECT * FROM anomalies
            WHERE ip = $1 AND log_entry_id = $2 AND timestamp >= $3
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
        )
        .bind(ip)
        .bind(log_entry_id)
        .bind(since)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn upgrade_to_hybrid(
        &self,
        id: i64,
        ai_explanation: Option<String>,
        recommended_action: Option<String>,
        confidence_score: Option<f32>,
    ) -> StorageResult<Option<Anomaly>> {
        let row = sqlx::query_as::<_, Anomaly>(
            r#"
            UPDATE anomalies
            SET detection_source = 'HYBRID',
                ai_explanation = $2,
                recommended_action = $3,
                confidence_score = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&ai_explanation)
        .bind(&recommended_action)
        .bind(confidence_score.map(clamp_score))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn update_anomaly_status(
        &self,
        id: i64,
        status: AnomalyStatus,
        resolution_notes: Option<String>,
        resolved_by: Option<String>,
    ) -> StorageResult<Option<Anomaly>> {
        let row = if status.is_terminal() {
            sqlx::query_as::<_, Anomaly>(
                r#"
                UPDATE anomalies
                SET status = $2,
                    resolution_notes = COALESCE($3, resolution_notes),
                    resolved_by = COALESCE($4, resolved_by),
                    resolved_at = NOW()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(status.as_str())
            .bind(&resolution_notes)
            .bind(&resolved_by)
            .fetch_optional(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, Anomaly>(
                r#"
                UPDATE anomalies
                SET status = $2,
                    resolution_notes = COALESCE($3, resolution_notes)
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(status.as_str())
            .bind(&resolution_notes)
            .fetch_optional(&self.pool)
            .await?
        };

        Ok(row)
    }

    async fn list_anomalies(
        &self,
        limit: i64,
        offset: i64,
    ) -> StorageResult<(Vec<Anomaly>, i64)> {
        let rows = sqlx::query_as::<_, Anomaly>(
            r#"
            SELECT * FROM anomalies
            ORDER BY timestamp DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM anomalies")
            .fetch_one(&self.pool)
            .await?;

        Ok((rows, total.0))
    }

    async fn anomalies_by_ip(&self, ip: &str) -> StorageResult<Vec<Anomaly>> {
        let rows = sqlx::query_as::<_, Anomaly>(
            r#"
            SELECT * FROM anomalies
            WHERE ip = $1
            ORDER BY timestamp DESC, id DESC
            "#,
        )
        .bind(ip)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn anomalies_since(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> StorageResult<Vec<Anomaly>> {
        let rows = sqlx::query_as::<_, Anomaly>(
            r#"
            SELECT * FROM anomalies
            WHERE timestamp >= $1
            ORDER BY timestamp DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
