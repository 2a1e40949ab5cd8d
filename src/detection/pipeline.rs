//! Ingestion pipeline
//!
//! One call per inbound log: validate, persist the log, evaluate rules,
//! persist one anomaly per finding (or the default anomaly when nothing
//! fires) and publish each on the fan-out channel right after its own
//! insert. A failed anomaly insert or publish never rolls back the log or
//! the anomalies already created.

use serde::Serialize;
use validator::Validate;

use super::rules;
use crate::events::AnomalyBroadcaster;
use crate::models::{
    AnomalyPayload, DetectionSource, IngestLogRequest, LogEntry, NewAnomaly, NewLogEntry,
    Severity, RULE_CONFIDENCE,
};
use crate::storage::Storage;

/// Reason attached to the guaranteed-traceability anomaly created when no
/// rule fires.
pub const DEFAULT_ANOMALY_REASON: &str = "No specific anomalies detected";

#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub success: bool,
    pub message: String,
}

impl IngestResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Ingest one log record. Validation failures and a failed primary log
/// write are the only failure responses; everything downstream degrades.
pub async fn ingest_log(
    store: &dyn Storage,
    events: &AnomalyBroadcaster,
    req: IngestLogRequest,
) -> IngestResponse {
    if let Err(errors) = req.validate() {
        return IngestResponse::failure(validation_message(&errors));
    }

    let log = match store.create_log(NewLogEntry::from(req)).await {
        Ok(log) => log,
        Err(e) => {
            tracing::error!("failed to persist log entry: {}", e);
            return IngestResponse::failure("Failed to ingest log");
        }
    };

    tracing::info!(
        log_id = log.id,
        source = %log.source,
        ip = %log.ip,
        "log ingested"
    );

    let mut findings = rules::detect_anomalies(store, &log).await;
    if findings.is_empty() {
        findings.push(rules::RuleFinding {
            severity: Severity::Low,
            reason: DEFAULT_ANOMALY_REASON,
        });
    }

    for finding in findings {
        let new_anomaly = NewAnomaly {
            ip: log.ip.clone(),
            severity: finding.severity,
            reason: finding.reason.to_string(),
            detection_source: DetectionSource::Rule,
            ai_explanation: None,
            recommended_action: None,
            confidence_score: Some(RULE_CONFIDENCE),
            log_entry_id: Some(log.id),
        };

        match store.create_anomaly(new_anomaly).await {
            Ok(anomaly) => {
                tracing::info!(
                    anomaly_id = anomaly.id,
                    severity = %anomaly.severity,
                    reason = %anomaly.reason,
                    "rule anomaly created"
                );
                publish(events, &log, anomaly.into());
            }
            Err(e) => {
                tracing::warn!("failed to persist anomaly, skipping: {}", e);
            }
        }
    }

    IngestResponse {
        success: true,
        message: "Log received".to_string(),
    }
}

fn publish(events: &AnomalyBroadcaster, log: &LogEntry, payload: AnomalyPayload) {
    events.publish(payload.with_log(Some(log.clone().into())));
}

fn validation_message(errors: &validator::ValidationErrors) -> String {
    let mut parts: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field))
            })
        })
        .collect();
    parts.sort();
    parts.join("; ")
}
