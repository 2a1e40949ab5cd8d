//! Database module - PostgreSQL connection and migrations

use sqlx::{postgres::PgPoolOptions, PgPool};

/// Create database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;

    tracing::info!("Database schema applied successfully");
    Ok(())
}

/// Database schema SQL
const SCHEMA_SQL: &str = r#"
-- Ingested log entries (immutable)
CREATE TABLE IF NOT EXISTS log_entries (
    id BIGSERIAL PRIMARY KEY,
    source TEXT NOT NULL,
    event TEXT NOT NULL,
    event_type TEXT,
    ip TEXT NOT NULL,
    user_name TEXT NOT NULL,
    timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Flagged anomalies
CREATE TABLE IF NOT EXISTS anomalies (
    id BIGSERIAL PRIMARY KEY,
    ip TEXT NOT NULL,
    severity TEXT NOT NULL,
    reason TEXT NOT NULL,
    timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    detection_source TEXT NOT NULL DEFAULT 'RULE',
    ai_explanation TEXT,
    recommended_action TEXT,
    confidence_score REAL,
    log_entry_id BIGINT REFERENCES log_entries(id),
    status TEXT NOT NULL DEFAULT 'OPEN',
    resolution_notes TEXT,
    resolved_by TEXT,
    resolved_at TIMESTAMPTZ
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_log_entries_ip_type_time ON log_entries(ip, event_type, timestamp);
CREATE INDEX IF NOT EXISTS idx_log_entries_time ON log_entries(timestamp);
CREATE INDEX IF NOT EXISTS idx_anomalies_time ON anomalies(timestamp);
CREATE INDEX IF NOT EXISTS idx_anomalies_ip ON anomalies(ip);
CREATE INDEX IF NOT EXISTS idx_anomalies_source ON anomalies(detection_source);
CREATE INDEX IF NOT EXISTS idx_anomalies_status ON anomalies(status);
CREATE INDEX IF NOT EXISTS idx_anomalies_dedup ON anomalies(ip, log_entry_id, timestamp);
"#;
