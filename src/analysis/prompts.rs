//! Prompt contract for the external classifier
//!
//! The template and the mock result are fixed: the mock is what the
//! adapter returns whenever the classifier is disabled or fails, so it
//! must stay deterministic.

use crate::models::{Anomaly, LogEntry, Severity};

use super::classifier::{AiAnalysisResult, AiCandidate};

pub const SECURITY_ANALYSIS_PROMPT: &str = r#"
You are a cybersecurity expert analyzing log data for potential threats and anomalies. Analyze the provided logs and identify security issues that may have been missed by rule-based detection.

## Your Task:
1. Identify suspicious patterns, attack vectors, and security threats
2. Explain WHY each anomaly is suspicious with technical details
3. Rate severity: CRITICAL, HIGH, MEDIUM, or LOW
4. Provide specific, actionable remediation steps
5. Look for multi-step attack patterns across different IPs/users
6. Calculate overall risk score (0-100)

## Response Format:
Return ONLY valid JSON in this exact format:
{
  "newAnomalies": [
    {
      "ip": "string",
      "severity": "CRITICAL|HIGH|MEDIUM|LOW",
      "reason": "brief descriptive title",
      "aiExplanation": "detailed technical explanation of why this is suspicious",
      "recommendedAction": "specific actionable steps to address this threat",
      "confidenceScore": 85
    }
  ],
  "overallRiskScore": 65,
  "threatSummary": "overall security assessment of the log batch",
  "attackPatternsDetected": ["pattern1", "pattern2"]
}

## Log Data:
{LOGS_DATA}

## Existing Anomalies:
{EXISTING_ANOMALIES}

Analyze this data and provide your security assessment in the specified JSON format.
"#;

/// Render the full prompt for one batch.
pub fn build_prompt(logs: &[LogEntry], anomalies: &[Anomaly]) -> String {
    SECURITY_ANALYSIS_PROMPT
        .replace("{LOGS_DATA}", &format_logs(logs))
        .replace("{EXISTING_ANOMALIES}", &format_anomalies(anomalies))
}

fn format_logs(logs: &[LogEntry]) -> String {
    logs.iter()
        .map(|log| {
            format!(
                "[{}] {} - {} ({}) - IP: {} - User: {}",
                log.timestamp.to_rfc3339(),
                log.source,
                log.event,
                log.event_type.as_deref().unwrap_or("-"),
                log.ip,
                log.user_name,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_anomalies(anomalies: &[Anomaly]) -> String {
    anomalies
        .iter()
        .map(|anomaly| {
            format!(
                "[{}] {} - {} - IP: {}",
                anomaly.timestamp.to_rfc3339(),
                anomaly.severity,
                anomaly.reason,
                anomaly.ip,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Deterministic result used whenever the classifier is disabled or its
/// response cannot be used.
pub fn mock_response() -> AiAnalysisResult {
    AiAnalysisResult {
        new_anomalies: vec![AiCandidate {
            ip: "192.168.1.100".to_string(),
            severity: Severity::High,
            reason: "Suspicious data exfiltration pattern".to_string(),
            ai_explanation: Some(
                "Detected unusual data transfer patterns with large file sizes during \
                 off-hours, combined with multiple failed authentication attempts \
                 suggesting potential data breach attempt."
                    .to_string(),
            ),
            recommended_action: Some(
                "Immediately block this IP, audit data access logs, and check for any \
                 unauthorized data transfers."
                    .to_string(),
            ),
            confidence_score: Some(87.0),
        }],
        overall_risk_score: 75.0,
        threat_summary: "High-risk activity detected with potential data exfiltration and \
                         brute force attempts. Immediate investigation recommended."
            .to_string(),
        attack_patterns_detected: vec![
            "Data Exfiltration".to_string(),
            "Brute Force".to_string(),
            "Off-hours Activity".to_string(),
        ],
    }
}
