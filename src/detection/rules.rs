//! Rule-based anomaly detection
//!
//! Each rule is a pure function of the incoming log entry plus store
//! reads. Rules run concurrently; findings are merged in fixed rule order
//! so output is reproducible regardless of scheduling. A failing rule is
//! logged and contributes no finding, never aborting its siblings.

use chrono::{Duration, Utc};

use crate::models::{LogEntry, Severity};
use crate::storage::Storage;

/// Event type that feeds the brute-force counter.
pub const FAILED_LOGIN: &str = "FAILED_LOGIN";

/// Trailing window for brute-force counting, in minutes.
pub const BRUTE_FORCE_WINDOW_MINUTES: i64 = 10;

/// Failed-login count (window-inclusive) that must be exceeded to trigger.
pub const BRUTE_FORCE_THRESHOLD: i64 = 5;

pub const BRUTE_FORCE_REASON: &str = "Brute force attempt detected";
pub const PRIVILEGE_ESCALATION_REASON: &str = "Privilege escalation detected";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFinding {
    pub severity: Severity,
    pub reason: &'static str,
}

/// More than [`BRUTE_FORCE_THRESHOLD`] failed logins from one ip within
/// the trailing window, the current event included.
async fn check_brute_force(store: &dyn Storage, log: &LogEntry) -> Option<RuleFinding> {
    if log.event_type.as_deref() != Some(FAILED_LOGIN) {
        return None;
    }

    let since = Utc::now() - Duration::minutes(BRUTE_FORCE_WINDOW_MINUTES);
    match store
        .count_logs_by_ip_and_type(&log.ip, FAILED_LOGIN, since)
        .await
    {
        Ok(count) if count > BRUTE_FORCE_THRESHOLD => Some(RuleFinding {
            severity: Severity::High,
            reason: BRUTE_FORCE_REASON,
        }),
        Ok(_) => None,
        Err(e) => {
            tracing::error!("brute-force rule failed: {}", e);
            None
        }
    }
}

/// Event type mentioning "sudo" or "root", any case.
fn check_privilege_escalation(log: &LogEntry) -> Option<RuleFinding> {
    let event_type = log.event_type.as_deref()?.to_lowercase();

    if event_type.contains("sudo") || event_type.contains("root") {
        return Some(RuleFinding {
            severity: Severity::Medium,
            reason: PRIVILEGE_ESCALATION_REASON,
        });
    }

    None
}

/// Reserved slot for geographic-reputation checks.
fn check_geo_anomaly(_log: &LogEntry) -> Option<RuleFinding> {
    None
}

/// Run every rule against one log entry and merge findings in rule order.
pub async fn detect_anomalies(store: &dyn Storage, log: &LogEntry) -> Vec<RuleFinding> {
    let (brute_force, privilege, geo) = tokio::join!(
        check_brute_force(store, log),
        async { check_privilege_escalation(log) },
        async { check_geo_anomaly(log) },
    );

    [brute_force, privilege, geo].into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewLogEntry;
    use crate::storage::MemoryStorage;

    fn failed_login(ip: &str) -> NewLogEntry {
        NewLogEntry {
            source: "auth".to_string(),
            event: "login_failed".to_string(),
            event_type: Some(FAILED_LOGIN.to_string()),
            ip: ip.to_string(),
            user_name: "x".to_string(),
        }
    }

    fn log_with_type(event_type: Option<&str>) -> LogEntry {
        LogEntry {
            id: 1,
            source: "auth".to_string(),
            event: "event".to_string(),
            event_type: event_type.map(str::to_string),
            ip: "10.0.0.1".to_string(),
            user_name: "x".to_string(),
            timestamp: Utc::now(),
        }
    }

    async fn seed_failed_logins(store: &MemoryStorage, ip: &str, count: usize) -> LogEntry {
        let mut last = None;
        for _ in 0..count {
            last = Some(store.create_log(failed_login(ip)).await.unwrap());
        }
        last.unwrap()
    }

    #[tokio::test]
    async fn brute_force_fires_on_sixth_event() {
        let store = MemoryStorage::new();

        let fifth = seed_failed_logins(&store, "10.0.0.1", 5).await;
        let findings = detect_anomalies(&store, &fifth).await;
        assert!(findings.is_empty(), "5th failed login must not trigger");

        let sixth = seed_failed_logins(&store, "10.0.0.1", 1).await;
        let findings = detect_anomalies(&store, &sixth).await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].reason, BRUTE_FORCE_REASON);
    }

    #[tokio::test]
    async fn brute_force_window_excludes_old_events() {
        let store = MemoryStorage::new();
        let stale = Utc::now() - Duration::minutes(BRUTE_FORCE_WINDOW_MINUTES + 5);
        for _ in 0..10 {
            store.insert_log_at(failed_login("10.0.0.1"), stale).await;
        }

        let current = seed_failed_logins(&store, "10.0.0.1", 1).await;
        let findings = detect_anomalies(&store, &current).await;
        assert!(findings.is_empty());
    }

    #[tokio::test]
    async fn brute_force_counts_per_ip() {
        let store = MemoryStorage::new();
        seed_failed_logins(&store, "10.0.0.1", 6).await;

        let other = seed_failed_logins(&store, "10.0.0.2", 1).await;
        let findings = detect_anomalies(&store, &other).await;
        assert!(findings.is_empty());
    }

    #[tokio::test]
    async fn privilege_escalation_is_case_insensitive() {
        let store = MemoryStorage::new();

        for event_type in ["sudo_command", "ROOT_LOGIN", "SudoSession", "chroot_exec"] {
            let findings = detect_anomalies(&store, &log_with_type(Some(event_type))).await;
            assert_eq!(findings.len(), 1, "{} should trigger", event_type);
            assert_eq!(findings[0].severity, Severity::Medium);
            assert_eq!(findings[0].reason, PRIVILEGE_ESCALATION_REASON);
        }
    }

    #[tokio::test]
    async fn privilege_escalation_negatives() {
        let store = MemoryStorage::new();

        for event_type in [Some("login"), Some("FILE_ACCESS"), None] {
            let findings = detect_anomalies(&store, &log_with_type(event_type)).await;
            assert!(findings.is_empty(), "{:?} should not trigger", event_type);
        }
    }

    #[tokio::test]
    async fn brute_force_requires_exact_event_type() {
        let store = MemoryStorage::new();
        seed_failed_logins(&store, "10.0.0.1", 6).await;

        // Same ip, but a different event type never reaches the counter.
        let mut log = log_with_type(Some("failed_login"));
        log.ip = "10.0.0.1".to_string();
        let findings = detect_anomalies(&store, &log).await;
        assert!(findings.is_empty());
    }
}
