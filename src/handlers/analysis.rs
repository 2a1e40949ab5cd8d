//! AI analysis summary and trigger handlers

use axum::extract::State;
use axum::Json;
use chrono::{Duration, Utc};
use serde::Serialize;

use super::MutationResponse;
use crate::analysis::scheduler::CycleOutcome;
use crate::models::{clamp_score, Anomaly};
use crate::storage::Storage;
use crate::AppState;

/// Trailing window the summary is computed over.
const SUMMARY_WINDOW_MINUTES: i64 = 60;
const SUMMARY_SCAN_LIMIT: i64 = 1000;

const TOP_THREATS_LIMIT: usize = 5;
const ATTACK_PATTERNS_LIMIT: usize = 3;

/// Confidence assumed for AI anomalies that carry no score.
const DEFAULT_CONFIDENCE: f32 = 50.0;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSummaryResponse {
    pub last_analysis_time: String,
    pub overall_risk_score: i32,
    pub top_threats: Vec<String>,
    pub attack_patterns_detected: Vec<String>,
    pub total_ai_anomalies: i64,
}

/// Summary of AI-assisted detections over the trailing hour.
pub async fn summary(State(state): State<AppState>) -> Json<AiSummaryResponse> {
    let since = Utc::now() - Duration::minutes(SUMMARY_WINDOW_MINUTES);
    let recent = match state.storage.anomalies_since(since, SUMMARY_SCAN_LIMIT).await {
        Ok(anomalies) => anomalies,
        Err(e) => {
            tracing::error!("failed to load anomalies for summary: {}", e);
            Vec::new()
        }
    };

    let last_analysis_time = state.scheduler.last_analysis_time().await.to_rfc3339();
    Json(summarize(last_analysis_time, &recent))
}

fn summarize(last_analysis_time: String, recent: &[Anomaly]) -> AiSummaryResponse {
    let ai_anomalies: Vec<&Anomaly> = recent
        .iter()
        .filter(|a| a.detection_source == "AI" || a.detection_source == "HYBRID")
        .collect();

    let overall_risk_score = if ai_anomalies.is_empty() {
        0
    } else {
        let sum: f32 = ai_anomalies
            .iter()
            .map(|a| a.confidence_score.unwrap_or(DEFAULT_CONFIDENCE))
            .sum();
        clamp_score((sum / ai_anomalies.len() as f32).round()) as i32
    };

    let distinct_reasons: Vec<String> = {
        let mut seen = Vec::new();
        for anomaly in &ai_anomalies {
            if !seen.contains(&anomaly.reason) {
                seen.push(anomaly.reason.clone());
            }
        }
        seen
    };

    AiSummaryResponse {
        last_analysis_time,
        overall_risk_score,
        top_threats: distinct_reasons
            .iter()
            .take(TOP_THREATS_LIMIT)
            .cloned()
            .collect(),
        attack_patterns_detected: distinct_reasons
            .iter()
            .take(ATTACK_PATTERNS_LIMIT)
            .cloned()
            .collect(),
        total_ai_anomalies: ai_anomalies.len() as i64,
    }
}

/// Force one analysis cycle, bypassing the cool-down but not the
/// running-flag mutual exclusion.
pub async fn trigger(State(state): State<AppState>) -> Json<MutationResponse> {
    let response = match state.scheduler.trigger().await {
        CycleOutcome::Completed { created, upgraded } => MutationResponse::ok(format!(
            "AI analysis complete: {} created, {} upgraded",
            created, upgraded
        )),
        CycleOutcome::Idle => MutationResponse::ok("No unprocessed logs to analyze"),
        CycleOutcome::SkippedBusy => {
            MutationResponse::failure("AI analysis already running, skipped")
        }
        CycleOutcome::SkippedCooldown => {
            MutationResponse::failure("AI analysis within cool-down window, skipped")
        }
    };

    Json(response)
}
