//! Anomaly model
//!
//! Severity, detection source and lifecycle status are stored as canonical
//! uppercase strings; parsing at the boundary is case-insensitive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::log_entry::LogEntryPayload;

/// Fixed confidence assigned to rule-based findings, on the canonical
/// 0-100 scale.
pub const RULE_CONFIDENCE: f32 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "CRITICAL" => Some(Severity::Critical),
            "HIGH" => Some(Severity::High),
            "MEDIUM" => Some(Severity::Medium),
            "LOW" => Some(Severity::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionSource {
    Rule,
    Ai,
    Hybrid,
}

impl DetectionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionSource::Rule => "RULE",
            DetectionSource::Ai => "AI",
            DetectionSource::Hybrid => "HYBRID",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyStatus {
    Open,
    Investigating,
    FalsePositive,
    Resolved,
}

impl AnomalyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyStatus::Open => "OPEN",
            AnomalyStatus::Investigating => "INVESTIGATING",
            AnomalyStatus::FalsePositive => "FALSE_POSITIVE",
            AnomalyStatus::Resolved => "RESOLVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "OPEN" => Some(AnomalyStatus::Open),
            "INVESTIGATING" => Some(AnomalyStatus::Investigating),
            "FALSE_POSITIVE" => Some(AnomalyStatus::FalsePositive),
            "RESOLVED" => Some(AnomalyStatus::Resolved),
            _ => None,
        }
    }

    /// FALSE_POSITIVE and RESOLVED are terminal.
    pub fn can_transition_to(&self, next: AnomalyStatus) -> bool {
        match self {
            AnomalyStatus::Open => matches!(
                next,
                AnomalyStatus::Investigating
                    | AnomalyStatus::FalsePositive
                    | AnomalyStatus::Resolved
            ),
            AnomalyStatus::Investigating => matches!(
                next,
                AnomalyStatus::FalsePositive | AnomalyStatus::Resolved
            ),
            AnomalyStatus::FalsePositive | AnomalyStatus::Resolved => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AnomalyStatus::FalsePositive | AnomalyStatus::Resolved)
    }
}

/// Clamp a confidence or risk score to the canonical 0-100 scale.
pub fn clamp_score(score: f32) -> f32 {
    score.clamp(0.0, 100.0)
}

/// A flagged suspicious condition.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Anomaly {
    pub id: i64,
    pub ip: String,
    pub severity: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub detection_source: String,
    pub ai_explanation: Option<String>,
    pub recommended_action: Option<String>,
    pub confidence_score: Option<f32>,
    pub log_entry_id: Option<i64>,
    pub status: String,
    pub resolution_notes: Option<String>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Fields for a new anomaly; id, timestamp and OPEN status are assigned by
/// the store. Confidence is clamped on insert.
#[derive(Debug, Clone)]
pub struct NewAnomaly {
    pub ip: String,
    pub severity: Severity,
    pub reason: String,
    pub detection_source: DetectionSource,
    pub ai_explanation: Option<String>,
    pub recommended_action: Option<String>,
    pub confidence_score: Option<f32>,
    pub log_entry_id: Option<i64>,
}

/// Wire representation: string id, RFC 3339 timestamps, optional nested log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyPayload {
    pub id: String,
    pub ip: String,
    pub severity: String,
    pub reason: String,
    pub timestamp: String,
    pub ai_explanation: Option<String>,
    pub recommended_action: Option<String>,
    pub detection_source: String,
    pub confidence_score: Option<f32>,
    pub status: String,
    pub resolution_notes: Option<String>,
    pub resolved_at: Option<String>,
    pub resolved_by: Option<String>,
    pub log_entry: Option<LogEntryPayload>,
}

impl From<Anomaly> for AnomalyPayload {
    fn from(anomaly: Anomaly) -> Self {
        Self {
            id: anomaly.id.to_string(),
            ip: anomaly.ip,
            severity: anomaly.severity,
            reason: anomaly.reason,
            timestamp: anomaly.timestamp.to_rfc3339(),
            ai_explanation: anomaly.ai_explanation,
            recommended_action: anomaly.recommended_action,
            detection_source: anomaly.detection_source,
            confidence_score: anomaly.confidence_score,
            status: anomaly.status,
            resolution_notes: anomaly.resolution_notes,
            resolved_at: anomaly.resolved_at.map(|t| t.to_rfc3339()),
            resolved_by: anomaly.resolved_by,
            log_entry: None,
        }
    }
}

impl AnomalyPayload {
    pub fn with_log(mut self, log: Option<LogEntryPayload>) -> Self {
        self.log_entry = log;
        self
    }
}
