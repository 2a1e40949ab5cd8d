//! In-memory storage for tests and database-less development

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{Storage, StorageResult};
use crate::models::{
    clamp_score, Anomaly, AnomalyStatus, DetectionSource, LogEntry, NewAnomaly, NewLogEntry,
};

#[derive(Default)]
pub struct MemoryStorage {
    logs: RwLock<Vec<LogEntry>>,
    anomalies: RwLock<Vec<Anomaly>>,
    next_log_id: AtomicI64,
    next_anomaly_id: AtomicI64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            logs: RwLock::new(Vec::new()),
            anomalies: RwLock::new(Vec::new()),
            next_log_id: AtomicI64::new(1),
            next_anomaly_id: AtomicI64::new(1),
        }
    }

    /// Insert a log entry with an explicit timestamp (seeding histories).
    pub async fn insert_log_at(
        &self,
        log: NewLogEntry,
        timestamp: DateTime<Utc>,
    ) -> LogEntry {
        let entry = LogEntry {
            id: self.next_log_id.fetch_add(1, Ordering::SeqCst),
            source: log.source,
            event: log.event,
            event_type: log.event_type,
            ip: log.ip,
            user_name: log.user_name,
            timestamp,
        };
        self.logs.write().await.push(entry.clone());
        entry
    }

    /// Insert an anomaly with an explicit timestamp (seeding histories).
    pub async fn insert_anomaly_at(
        &self,
        anomaly: NewAnomaly,
        timestamp: DateTime<Utc>,
    ) -> Anomaly {
        let row = Anomaly {
            id: self.next_anomaly_id.fetch_add(1, Ordering::SeqCst),
            ip: anomaly.ip,
            severity: anomaly.severity.as_str().to_string(),
            reason: anomaly.reason,
            timestamp,
            detection_source: anomaly.detection_source.as_str().to_string(),
            ai_explanation: anomaly.ai_explanation,
            recommended_action: anomaly.recommended_action,
            confidence_score: anomaly.confidence_score.map(clamp_score),
            log_entry_id: anomaly.log_entry_id,
            status: AnomalyStatus::Open.as_str().to_string(),
            resolution_notes: None,
            resolved_by: None,
            resolved_at: None,
        };
        self.anomalies.write().await.push(row.clone());
        row
    }
}

fn newest_first<T, F>(rows: &mut [T], key: F)
where
    F: Fn(&T) -> (DateTime<Utc>, i64),
{
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn create_log(&self, log: NewLogEntry) -> StorageResult<LogEntry> {
        Ok(self.insert_log_at(log, Utc::now()).await)
    }

    async fn find_log(&self, id: i64) -> StorageResult<Option<LogEntry>> {
        let logs = self.logs.read().await;
        Ok(logs.iter().find(|l| l.id == id).cloned())
    }

    async fn count_logs_by_ip_and_type(
        &self,
        ip: &str,
        event_type: &str,
        since: DateTime<Utc>,
    ) -> StorageResult<i64> {
        let logs = self.logs.read().await;
        let count = logs
            .iter()
            .filter(|l| {
                l.ip == ip
                    && l.event_type.as_deref() == Some(event_type)
                    && l.timestamp >= since
            })
            .count();
        Ok(count as i64)
    }

    async fn recent_logs_excluding(
        &self,
        exclude: &[i64],
        limit: i64,
    ) -> StorageResult<Vec<LogEntry>> {
        let logs = self.logs.read().await;
        let mut rows: Vec<LogEntry> = logs
            .iter()
            .filter(|l| !exclude.contains(&l.id))
            .cloned()
            .collect();
        newest_first(&mut rows, |l| (l.timestamp, l.id));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn logs_by_ip(&self, ip: &str, limit: i64) -> StorageResult<Vec<LogEntry>> {
        let logs = self.logs.read().await;
        let mut rows: Vec<LogEntry> = logs.iter().filter(|l| l.ip == ip).cloned().collect();
        newest_first(&mut rows, |l| (l.timestamp, l.id));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn create_anomaly(&self, anomaly: NewAnomaly) -> StorageResult<Anomaly> {
        Ok(self.insert_anomaly_at(anomaly, Utc::now()).await)
    }

    async fn find_anomaly(&self, id: i64) -> StorageResult<Option<Anomaly>> {
        let anomalies = self.anomalies.read().await;
        Ok(anomalies.iter().find(|a| a.id == id).cloned())
    }

    async fn find_recent_anomaly(
        &self,
        ip: &str,
        log_entry_id: i64,
        since: DateTime<Utc>,
    ) -> StorageResult<Option<Anomaly>> {
        let anomalies = self.anomalies.read().await;
        let mut rows: Vec<Anomaly> = anomalies
            .iter()
            .filter(|a| {
                a.ip == ip && a.log_entry_id == Some(log_entry_id) && a.timestamp >= since
            })
            .cloned()
            .collect();
        newest_first(&mut rows, |a| (a.timestamp, a.id));
        Ok(rows.into_iter().next())
    }

    async fn upgrade_to_hybrid(
        &self,
        id: i64,
        ai_explanation: Option<String>,
        recommended_action: Option<String>,
        confidence_score: Option<f32>,
    ) -> StorageResult<Option<Anomaly>> {
        let mut anomalies = self.anomalies.write().await;
        if let Some(row) = anomalies.iter_mut().find(|a| a.id == id) {
            row.detection_source = DetectionSource::Hybrid.as_str().to_string();
            row.ai_explanation = ai_explanation;
            row.recommended_action = recommended_action;
            row.confidence_score = confidence_score.map(clamp_score);
            return Ok(Some(row.clone()));
        }
        Ok(None)
    }

    async fn update_anomaly_status(
        &self,
        id: i64,
        status: AnomalyStatus,
        resolution_notes: Option<String>,
        resolved_by: Option<String>,
    ) -> StorageResult<Option<Anomaly>> {
        let mut anomalies = self.anomalies.write().await;
        if let Some(row) = anomalies.iter_mut().find(|a| a.id == id) {
            row.status = status.as_str().to_string();
            if let Some(notes) = resolution_notes {
                row.resolution_notes = Some(notes);
            }
            if status.is_terminal() {
                if let Some(by) = resolved_by {
                    row.resolved_by = Some(by);
                }
                row.resolved_at = Some(Utc::now());
            }
            return Ok(Some(row.clone()));
        }
        Ok(None)
    }

    async fn list_anomalies(
        &self,
        limit: i64,
        offset: i64,
    ) -> StorageResult<(Vec<Anomaly>, i64)> {
        let anomalies = self.anomalies.read().await;
        let total = anomalies.len() as i64;
        let mut rows: Vec<Anomaly> = anomalies.clone();
        newest_first(&mut rows, |a| (a.timestamp, a.id));
        let page = rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn anomalies_by_ip(&self, ip: &str) -> StorageResult<Vec<Anomaly>> {
        let anomalies = self.anomalies.read().await;
        let mut rows: Vec<Anomaly> =
            anomalies.iter().filter(|a| a.ip == ip).cloned().collect();
        newest_first(&mut rows, |a| (a.timestamp, a.id));
        Ok(rows)
    }

    async fn anomalies_since(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> StorageResult<Vec<Anomaly>> {
        let anomalies = self.anomalies.read().await;
        let mut rows: Vec<Anomaly> = anomalies
            .iter()
            .filter(|a| a.timestamp >= since)
            .cloned()
            .collect();
        newest_first(&mut rows, |a| (a.timestamp, a.id));
        rows.truncate(limit as usize);
        Ok(rows)
    }
}
