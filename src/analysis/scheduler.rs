//! Periodic AI analysis scheduler
//!
//! A single long-lived instance owns the cycle state: the last completed
//! cycle's start time, the processed-id set from the previous cycle, and
//! the running flag. Two protections against overlap: the running flag
//! skips a cycle that fires while another executes (never queued), and a
//! cool-down window skips cycles that fire too soon after the last
//! completed one. Forced runs bypass the cool-down but not the flag.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::events::AnomalyBroadcaster;
use crate::models::{Anomaly, AnomalyPayload, DetectionSource, LogEntry, NewAnomaly};
use crate::storage::{Storage, StorageError};

use super::classifier::{AiAnalysisResult, AiAnalyzer, AiCandidate};

/// Trailing window of anomalies fetched as classification context.
const CONTEXT_WINDOW_MINUTES: i64 = 60;
const CONTEXT_CAP: i64 = 100;

/// Dedup window when matching candidates against existing anomalies.
const DEDUP_WINDOW_MINUTES: i64 = 10;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub interval: std::time::Duration,
    pub cooldown: Duration,
    pub batch_size: i64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval: std::time::Duration::from_secs(5 * 60),
            cooldown: Duration::minutes(2),
            batch_size: 50,
        }
    }
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: std::time::Duration::from_secs(config.ai_interval_minutes * 60),
            cooldown: Duration::minutes(config.ai_cooldown_minutes as i64),
            batch_size: config.ai_batch_size,
        }
    }
}

/// What a cycle did, reported to the trigger endpoint and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was still executing; this one was dropped.
    SkippedBusy,
    /// The cool-down window had not elapsed.
    SkippedCooldown,
    /// No unprocessed logs; classifier not invoked, cache untouched.
    Idle,
    Completed { created: usize, upgraded: usize },
}

struct AnalysisCache {
    last_analysis_time: DateTime<Utc>,
    processed_ids: HashSet<i64>,
}

/// Resets the running flag even when a cycle unwinds.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

enum Reconciled {
    Created,
    Upgraded,
    Skipped,
}

pub struct AnalysisScheduler {
    store: Arc<dyn Storage>,
    analyzer: AiAnalyzer,
    events: AnomalyBroadcaster,
    settings: SchedulerSettings,
    cache: Mutex<AnalysisCache>,
    running: AtomicBool,
}

impl AnalysisScheduler {
    pub fn new(
        store: Arc<dyn Storage>,
        analyzer: AiAnalyzer,
        events: AnomalyBroadcaster,
        settings: SchedulerSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            analyzer,
            events,
            settings,
            cache: Mutex::new(AnalysisCache {
                last_analysis_time: Utc::now(),
                processed_ids: HashSet::new(),
            }),
            running: AtomicBool::new(false),
        })
    }

    /// Spawn the interval-driven loop. The first tick fires one full
    /// interval after startup.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            tracing::info!(
                interval_secs = scheduler.settings.interval.as_secs(),
                "analysis scheduler started"
            );
            let mut ticker = tokio::time::interval(scheduler.settings.interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                scheduler.run_cycle(false).await;
            }
        })
    }

    /// Run one cycle inline, bypassing the cool-down. Used by the manual
    /// trigger endpoint.
    pub async fn trigger(&self) -> CycleOutcome {
        tracing::info!("manually triggered analysis cycle");
        self.run_cycle(true).await
    }

    pub async fn last_analysis_time(&self) -> DateTime<Utc> {
        self.cache.lock().await.last_analysis_time
    }

    async fn run_cycle(&self, forced: bool) -> CycleOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::info!("analysis cycle already running, skipping");
            return CycleOutcome::SkippedBusy;
        }
        let _guard = RunningGuard(&self.running);

        let cycle_start = Utc::now();

        if !forced {
            let last = self.cache.lock().await.last_analysis_time;
            if cycle_start - last < self.settings.cooldown {
                tracing::info!("analysis cycle within cool-down window, skipping");
                return CycleOutcome::SkippedCooldown;
            }
        }

        let exclude: Vec<i64> = {
            let cache = self.cache.lock().await;
            cache.processed_ids.iter().copied().collect()
        };

        let logs = match self
            .store
            .recent_logs_excluding(&exclude, self.settings.batch_size)
            .await
        {
            Ok(logs) => logs,
            Err(e) => {
                tracing::error!("failed to fetch logs for analysis: {}", e);
                Vec::new()
            }
        };

        if logs.is_empty() {
            tracing::info!("no unprocessed logs to analyze");
            return CycleOutcome::Idle;
        }

        let context_since = Utc::now() - Duration::minutes(CONTEXT_WINDOW_MINUTES);
        let context = match self.store.anomalies_since(context_since, CONTEXT_CAP).await {
            Ok(anomalies) => anomalies,
            Err(e) => {
                tracing::error!("failed to fetch context anomalies: {}", e);
                Vec::new()
            }
        };

        tracing::info!(
            logs = logs.len(),
            context = context.len(),
            "starting analysis cycle"
        );

        let result = self.analyzer.analyze(&logs, &context).await;
        let (created, upgraded) = self.reconcile(&result, &logs).await;

        {
            let mut cache = self.cache.lock().await;
            cache.last_analysis_time = cycle_start;
            cache.processed_ids = logs.iter().map(|l| l.id).collect();
        }

        tracing::info!(created, upgraded, "analysis cycle complete");
        CycleOutcome::Completed { created, upgraded }
    }

    async fn reconcile(&self, result: &AiAnalysisResult, logs: &[LogEntry]) -> (usize, usize) {
        let mut created = 0;
        let mut upgraded = 0;

        for candidate in &result.new_anomalies {
            match self.reconcile_candidate(candidate, logs).await {
                Ok(Reconciled::Created) => created += 1,
                Ok(Reconciled::Upgraded) => upgraded += 1,
                Ok(Reconciled::Skipped) => {}
                Err(e) => {
                    tracing::error!(ip = %candidate.ip, "failed to process AI candidate: {}", e);
                }
            }
        }

        (created, upgraded)
    }

    async fn reconcile_candidate(
        &self,
        candidate: &AiCandidate,
        logs: &[LogEntry],
    ) -> Result<Reconciled, StorageError> {
        // Logs arrive newest first, so an ip match picks the most recent
        // entry. No match leaves the anomaly unlinked.
        let relevant = logs.iter().find(|l| l.ip == candidate.ip);

        if let Some(log) = relevant {
            let dedup_since = Utc::now() - Duration::minutes(DEDUP_WINDOW_MINUTES);
            if let Some(existing) = self
                .store
                .find_recent_anomaly(&candidate.ip, log.id, dedup_since)
                .await?
            {
                if existing.detection_source == DetectionSource::Rule.as_str() {
                    self.store
                        .upgrade_to_hybrid(
                            existing.id,
                            candidate.ai_explanation.clone(),
                            candidate.recommended_action.clone(),
                            candidate.confidence_score,
                        )
                        .await?;
                    tracing::info!(anomaly_id = existing.id, "anomaly upgraded to HYBRID");
                    return Ok(Reconciled::Upgraded);
                }
                // Already AI or HYBRID: nothing left to merge.
                return Ok(Reconciled::Skipped);
            }
        }

        let anomaly = self
            .store
            .create_anomaly(NewAnomaly {
                ip: candidate.ip.clone(),
                severity: candidate.severity,
                reason: candidate.reason.clone(),
                detection_source: DetectionSource::Ai,
                ai_explanation: candidate.ai_explanation.clone(),
                recommended_action: candidate.recommended_action.clone(),
                confidence_score: candidate.confidence_score,
                log_entry_id: relevant.map(|l| l.id),
            })
            .await?;

        tracing::info!(
            anomaly_id = anomaly.id,
            severity = %anomaly.severity,
            "AI anomaly created"
        );
        self.publish(anomaly, relevant.cloned());
        Ok(Reconciled::Created)
    }

    fn publish(&self, anomaly: Anomaly, log: Option<LogEntry>) {
        let payload = AnomalyPayload::from(anomaly).with_log(log.map(Into::into));
        self.events.publish(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::classifier::{Classifier, ClassifierError};
    use crate::models::{NewLogEntry, Severity};
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn settings() -> SchedulerSettings {
        SchedulerSettings::default()
    }

    fn log_for(ip: &str) -> NewLogEntry {
        NewLogEntry {
            source: "auth".to_string(),
            event: "login_failed".to_string(),
            event_type: Some("FAILED_LOGIN".to_string()),
            ip: ip.to_string(),
            user_name: "x".to_string(),
        }
    }

    fn rule_anomaly(ip: &str, log_id: i64) -> NewAnomaly {
        NewAnomaly {
            ip: ip.to_string(),
            severity: Severity::High,
            reason: "Brute force attempt detected".to_string(),
            detection_source: DetectionSource::Rule,
            ai_explanation: None,
            recommended_action: None,
            confidence_score: Some(80.0),
            log_entry_id: Some(log_id),
        }
    }

    fn candidate_json(ip: &str) -> String {
        format!(
            r#"{{
                "newAnomalies": [{{
                    "ip": "{}",
                    "severity": "CRITICAL",
                    "reason": "Credential stuffing campaign",
                    "aiExplanation": "Coordinated failures across accounts",
                    "recommendedAction": "Block the source network",
                    "confidenceScore": 91
                }}],
                "overallRiskScore": 80,
                "threatSummary": "active attack",
                "attackPatternsDetected": ["Credential Stuffing"]
            }}"#,
            ip
        )
    }

    struct CannedClassifier(String);

    #[async_trait]
    impl Classifier for CannedClassifier {
        async fn complete(&self, _prompt: &str) -> Result<String, ClassifierError> {
            Ok(self.0.clone())
        }
    }

    /// Blocks inside the classifier until released; counts invocations.
    struct GatedClassifier {
        calls: AtomicUsize,
        gate: Notify,
    }

    #[async_trait]
    impl Classifier for GatedClassifier {
        async fn complete(&self, _prompt: &str) -> Result<String, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(r#"{"newAnomalies": []}"#.to_string())
        }
    }

    fn scheduler_with(
        store: Arc<MemoryStorage>,
        analyzer: AiAnalyzer,
    ) -> (Arc<AnalysisScheduler>, AnomalyBroadcaster) {
        let events = AnomalyBroadcaster::new();
        let scheduler = AnalysisScheduler::new(store, analyzer, events.clone(), settings());
        (scheduler, events)
    }

    #[tokio::test]
    async fn rule_anomaly_is_upgraded_to_hybrid() {
        let store = Arc::new(MemoryStorage::new());
        let log = store.create_log(log_for("10.0.0.7")).await.unwrap();
        let existing = store
            .create_anomaly(rule_anomaly("10.0.0.7", log.id))
            .await
            .unwrap();

        let analyzer =
            AiAnalyzer::with_classifier(Arc::new(CannedClassifier(candidate_json("10.0.0.7"))));
        let (scheduler, _events) = scheduler_with(Arc::clone(&store), analyzer);

        let outcome = scheduler.trigger().await;
        assert_eq!(
            outcome,
            CycleOutcome::Completed {
                created: 0,
                upgraded: 1
            }
        );

        let merged = store.find_anomaly(existing.id).await.unwrap().unwrap();
        assert_eq!(merged.detection_source, "HYBRID");
        // Rule verdict is preserved; only AI enrichment is attached.
        assert_eq!(merged.severity, "HIGH");
        assert_eq!(merged.reason, "Brute force attempt detected");
        assert_eq!(merged.confidence_score, Some(91.0));
        assert_eq!(
            merged.recommended_action.as_deref(),
            Some("Block the source network")
        );
    }

    #[tokio::test]
    async fn existing_ai_anomaly_is_not_touched() {
        let store = Arc::new(MemoryStorage::new());
        let log = store.create_log(log_for("10.0.0.7")).await.unwrap();
        let mut existing = rule_anomaly("10.0.0.7", log.id);
        existing.detection_source = DetectionSource::Ai;
        store.create_anomaly(existing).await.unwrap();

        let analyzer =
            AiAnalyzer::with_classifier(Arc::new(CannedClassifier(candidate_json("10.0.0.7"))));
        let (scheduler, _events) = scheduler_with(Arc::clone(&store), analyzer);

        let outcome = scheduler.trigger().await;
        assert_eq!(
            outcome,
            CycleOutcome::Completed {
                created: 0,
                upgraded: 0
            }
        );

        let (_, total) = store.list_anomalies(10, 0).await.unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn unmatched_candidate_creates_unlinked_anomaly() {
        let store = Arc::new(MemoryStorage::new());
        store.create_log(log_for("10.0.0.1")).await.unwrap();

        let analyzer =
            AiAnalyzer::with_classifier(Arc::new(CannedClassifier(candidate_json("172.16.9.9"))));
        let (scheduler, events) = scheduler_with(Arc::clone(&store), analyzer);
        let mut rx = events.subscribe();

        let outcome = scheduler.trigger().await;
        assert_eq!(
            outcome,
            CycleOutcome::Completed {
                created: 1,
                upgraded: 0
            }
        );

        let created = store.anomalies_by_ip("172.16.9.9").await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].detection_source, "AI");
        assert!(created[0].log_entry_id.is_none());

        let payload = rx.recv().await.unwrap();
        assert_eq!(payload.ip, "172.16.9.9");
        assert!(payload.log_entry.is_none());
    }

    #[tokio::test]
    async fn concurrent_cycles_invoke_classifier_once() {
        let store = Arc::new(MemoryStorage::new());
        store.create_log(log_for("10.0.0.1")).await.unwrap();

        let classifier = Arc::new(GatedClassifier {
            calls: AtomicUsize::new(0),
            gate: Notify::new(),
        });
        let analyzer = AiAnalyzer::with_classifier(Arc::clone(&classifier) as Arc<dyn Classifier>);
        let (scheduler, _events) = scheduler_with(Arc::clone(&store), analyzer);

        let slow = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.trigger().await })
        };

        while classifier.calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let second = scheduler.trigger().await;
        assert_eq!(second, CycleOutcome::SkippedBusy);

        classifier.gate.notify_one();
        let first = slow.await.unwrap();
        assert!(matches!(first, CycleOutcome::Completed { .. }));
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cooldown_skips_timer_cycles_but_not_forced_runs() {
        let store = Arc::new(MemoryStorage::new());
        store.create_log(log_for("10.0.0.1")).await.unwrap();

        let analyzer = AiAnalyzer::disabled();
        let (scheduler, _events) = scheduler_with(Arc::clone(&store), analyzer);

        // Forced run completes and stamps the cool-down window.
        assert!(matches!(
            scheduler.trigger().await,
            CycleOutcome::Completed { .. }
        ));

        store.create_log(log_for("10.0.0.2")).await.unwrap();
        assert_eq!(scheduler.run_cycle(false).await, CycleOutcome::SkippedCooldown);

        // The forced path ignores the cool-down.
        assert!(matches!(
            scheduler.trigger().await,
            CycleOutcome::Completed { .. }
        ));
    }

    #[tokio::test]
    async fn processed_ids_form_a_single_cycle_dedup_window() {
        let store = Arc::new(MemoryStorage::new());
        let first = store.create_log(log_for("10.0.0.1")).await.unwrap();

        let analyzer = AiAnalyzer::disabled();
        let (scheduler, _events) = scheduler_with(Arc::clone(&store), analyzer);

        assert!(matches!(
            scheduler.trigger().await,
            CycleOutcome::Completed { .. }
        ));

        // Everything fetched last cycle is excluded from the next one.
        assert_eq!(scheduler.trigger().await, CycleOutcome::Idle);

        // A fresh log re-arms the cycle; the old id stays excluded.
        let second = store.create_log(log_for("10.0.0.2")).await.unwrap();
        assert!(matches!(
            scheduler.trigger().await,
            CycleOutcome::Completed { .. }
        ));

        let cache = scheduler.cache.lock().await;
        assert!(cache.processed_ids.contains(&second.id));
        assert!(!cache.processed_ids.contains(&first.id));
    }

    #[tokio::test]
    async fn idle_cycle_leaves_cache_untouched() {
        let store = Arc::new(MemoryStorage::new());
        let analyzer = AiAnalyzer::disabled();
        let (scheduler, _events) = scheduler_with(store, analyzer);

        let before = scheduler.last_analysis_time().await;
        assert_eq!(scheduler.trigger().await, CycleOutcome::Idle);
        assert_eq!(scheduler.last_analysis_time().await, before);
    }
}
