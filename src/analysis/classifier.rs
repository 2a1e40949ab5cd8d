//! AI classifier adapter
//!
//! Wraps the external classifier behind the [`Classifier`] transport
//! trait. [`AiAnalyzer`] selects between a configured transport and the
//! deterministic mock, and converts every transport, parse or validation
//! failure into the mock result. Callers always receive a valid
//! [`AiAnalysisResult`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::Config;
use crate::models::{clamp_score, Anomaly, LogEntry, Severity};

use super::prompts;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// One candidate finding returned by the classifier, already validated
/// and canonicalized.
#[derive(Debug, Clone, PartialEq)]
pub struct AiCandidate {
    pub ip: String,
    pub severity: Severity,
    pub reason: String,
    pub ai_explanation: Option<String>,
    pub recommended_action: Option<String>,
    pub confidence_score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AiAnalysisResult {
    pub new_anomalies: Vec<AiCandidate>,
    pub overall_risk_score: f32,
    pub threat_summary: String,
    pub attack_patterns_detected: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("classifier returned status {0}")]
    Server(u16),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Transport boundary: one prompt in, raw model text out.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ClassifierError>;
}

/// Gemini `generateContent` transport.
pub struct GeminiClassifier {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

#[derive(serde::Serialize)]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
}

#[derive(serde::Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(serde::Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Deserialize)]
struct ResponseCandidate {
    content: ResponseContent,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: String,
}

impl GeminiClassifier {
    pub fn new(api_key: String, model: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            api_base: GEMINI_API_BASE.to_string(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl Classifier for GeminiClassifier {
    async fn complete(&self, prompt: &str) -> Result<String, ClassifierError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base, self.model, self.api_key
        );

        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ClassifierError::Server(response.status().as_u16()));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;

        body.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| ClassifierError::InvalidResponse("empty candidates".to_string()))
    }
}

/// Raw response shape as the model emits it, prior to validation.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnalysis {
    new_anomalies: Option<Vec<RawCandidate>>,
    overall_risk_score: Option<f32>,
    threat_summary: Option<String>,
    attack_patterns_detected: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCandidate {
    #[serde(default)]
    ip: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    reason: String,
    ai_explanation: Option<String>,
    recommended_action: Option<String>,
    confidence_score: Option<f32>,
}

/// Parse and validate the model's JSON. One invalid candidate invalidates
/// the entire response; out-of-range scores are clamped, never rejected.
pub fn parse_ai_response(text: &str) -> Result<AiAnalysisResult, ClassifierError> {
    let cleaned = text
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string();

    let raw: RawAnalysis = serde_json::from_str(&cleaned)
        .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;

    let candidates = raw
        .new_anomalies
        .ok_or_else(|| ClassifierError::InvalidResponse("missing newAnomalies".to_string()))?;

    let mut new_anomalies = Vec::with_capacity(candidates.len());
    for (index, candidate) in candidates.into_iter().enumerate() {
        if candidate.ip.trim().is_empty() || candidate.reason.trim().is_empty() {
            return Err(ClassifierError::InvalidResponse(format!(
                "candidate {} missing required fields",
                index
            )));
        }
        let severity = Severity::parse(&candidate.severity).ok_or_else(|| {
            ClassifierError::InvalidResponse(format!(
                "candidate {} has invalid severity '{}'",
                index, candidate.severity
            ))
        })?;

        new_anomalies.push(AiCandidate {
            ip: candidate.ip,
            severity,
            reason: candidate.reason,
            ai_explanation: candidate.ai_explanation,
            recommended_action: candidate.recommended_action,
            confidence_score: candidate.confidence_score.map(clamp_score),
        });
    }

    Ok(AiAnalysisResult {
        new_anomalies,
        overall_risk_score: clamp_score(raw.overall_risk_score.unwrap_or(0.0)),
        threat_summary: raw
            .threat_summary
            .unwrap_or_else(|| "No specific threats detected".to_string()),
        attack_patterns_detected: raw.attack_patterns_detected.unwrap_or_default(),
    })
}

/// Adapter facade: selects transport vs. mock and never fails.
#[derive(Clone)]
pub struct AiAnalyzer {
    classifier: Option<Arc<dyn Classifier>>,
}

impl AiAnalyzer {
    /// Enabled only when the feature flag is set and an API key is
    /// present; otherwise every call returns the mock result.
    pub fn from_config(config: &Config) -> Self {
        if !config.ai_analysis_enabled {
            tracing::info!("AI analysis disabled via AI_ANALYSIS_ENABLED");
            return Self::disabled();
        }
        if config.gemini_api_key.is_empty() {
            tracing::warn!("GEMINI_API_KEY not configured, AI analysis disabled");
            return Self::disabled();
        }

        tracing::info!(model = %config.gemini_model, "AI analysis enabled");
        Self {
            classifier: Some(Arc::new(GeminiClassifier::new(
                config.gemini_api_key.clone(),
                config.gemini_model.clone(),
            ))),
        }
    }

    pub fn disabled() -> Self {
        Self { classifier: None }
    }

    pub fn with_classifier(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            classifier: Some(classifier),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.classifier.is_some()
    }

    /// Classify one batch. Any failure along the way degrades to the
    /// deterministic mock result.
    pub async fn analyze(&self, logs: &[LogEntry], context: &[Anomaly]) -> AiAnalysisResult {
        let Some(classifier) = &self.classifier else {
            tracing::debug!("classifier disabled, returning mock analysis");
            return prompts::mock_response();
        };

        let prompt = prompts::build_prompt(logs, context);

        match classifier.complete(&prompt).await {
            Ok(text) => match parse_ai_response(&text) {
                Ok(result) => {
                    tracing::info!(
                        candidates = result.new_anomalies.len(),
                        risk = result.overall_risk_score,
                        "AI analysis response accepted"
                    );
                    result
                }
                Err(e) => {
                    tracing::warn!("AI response rejected, using mock result: {}", e);
                    prompts::mock_response()
                }
            },
            Err(e) => {
                tracing::warn!("classifier call failed, using mock result: {}", e);
                prompts::mock_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedClassifier(String);

    #[async_trait]
    impl Classifier for CannedClassifier {
        async fn complete(&self, _prompt: &str) -> Result<String, ClassifierError> {
            Ok(self.0.clone())
        }
    }

    struct FailingClassifier;

    #[async_trait]
    impl Classifier for FailingClassifier {
        async fn complete(&self, _prompt: &str) -> Result<String, ClassifierError> {
            Err(ClassifierError::Transport("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn disabled_analyzer_returns_mock() {
        let analyzer = AiAnalyzer::disabled();
        assert!(!analyzer.is_enabled());

        let first = analyzer.analyze(&[], &[]).await;
        let second = analyzer.analyze(&[], &[]).await;
        assert_eq!(first, second);
        assert_eq!(first, prompts::mock_response());
    }

    #[tokio::test]
    async fn transport_failure_degrades_to_mock() {
        let analyzer = AiAnalyzer::with_classifier(Arc::new(FailingClassifier));
        let result = analyzer.analyze(&[], &[]).await;
        assert_eq!(result, prompts::mock_response());
    }

    #[tokio::test]
    async fn unparseable_response_degrades_to_mock() {
        let analyzer =
            AiAnalyzer::with_classifier(Arc::new(CannedClassifier("not json".to_string())));
        let result = analyzer.analyze(&[], &[]).await;
        assert_eq!(result, prompts::mock_response());
    }

    #[tokio::test]
    async fn one_invalid_candidate_invalidates_the_response() {
        let body = r#"{
            "newAnomalies": [
                {"ip": "10.0.0.1", "severity": "HIGH", "reason": "valid"},
                {"ip": "", "severity": "LOW", "reason": "missing ip"}
            ],
            "overallRiskScore": 40
        }"#;
        let analyzer = AiAnalyzer::with_classifier(Arc::new(CannedClassifier(body.to_string())));
        let result = analyzer.analyze(&[], &[]).await;
        assert_eq!(result, prompts::mock_response());
    }

    #[test]
    fn parse_strips_markdown_fences() {
        let body = "```json\n{\"newAnomalies\": [], \"overallRiskScore\": 10}\n```";
        let result = parse_ai_response(body).unwrap();
        assert!(result.new_anomalies.is_empty());
        assert_eq!(result.overall_risk_score, 10.0);
        assert_eq!(result.threat_summary, "No specific threats detected");
    }

    #[test]
    fn parse_clamps_scores() {
        let body = r#"{
            "newAnomalies": [
                {"ip": "10.0.0.1", "severity": "high", "reason": "a", "confidenceScore": 150},
                {"ip": "10.0.0.2", "severity": "LOW", "reason": "b", "confidenceScore": -10}
            ],
            "overallRiskScore": 900
        }"#;
        let result = parse_ai_response(body).unwrap();
        assert_eq!(result.new_anomalies[0].confidence_score, Some(100.0));
        assert_eq!(result.new_anomalies[0].severity, Severity::High);
        assert_eq!(result.new_anomalies[1].confidence_score, Some(0.0));
        assert_eq!(result.overall_risk_score, 100.0);
    }

    #[test]
    fn parse_requires_findings_list() {
        let err = parse_ai_response(r#"{"overallRiskScore": 10}"#).unwrap_err();
        assert!(err.to_string().contains("newAnomalies"));
    }

    #[test]
    fn parse_rejects_unknown_severity() {
        let body = r#"{
            "newAnomalies": [{"ip": "10.0.0.1", "severity": "SEVERE", "reason": "a"}]
        }"#;
        assert!(parse_ai_response(body).is_err());
    }
}
