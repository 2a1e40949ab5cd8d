//! Anomaly fan-out channel
//!
//! A single broadcast channel carrying fully-serialized anomaly payloads
//! to live subscribers. Constructed once at startup and injected into the
//! ingestion pipeline and the analysis scheduler; a slow subscriber lags
//! on its own receiver and never blocks publishers.

use tokio::sync::broadcast;

use crate::models::AnomalyPayload;

/// Channel name, used as the SSE event name on the wire.
pub const ANOMALY_DETECTED: &str = "anomaly-detected";

const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct AnomalyBroadcaster {
    tx: broadcast::Sender<AnomalyPayload>,
}

impl Default for AnomalyBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl AnomalyBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish one anomaly to every current subscriber. Publishing with no
    /// subscribers attached is not an error.
    pub fn publish(&self, payload: AnomalyPayload) {
        match self.tx.send(payload) {
            Ok(receivers) => {
                tracing::debug!(receivers, "anomaly published");
            }
            Err(_) => {
                tracing::debug!("anomaly published with no subscribers");
            }
        }
    }

    /// Attach a new subscriber; it receives every payload published after
    /// this call, in publish order. No history is replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<AnomalyPayload> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Anomaly, AnomalyPayload};
    use chrono::Utc;

    fn payload(id: i64, reason: &str) -> AnomalyPayload {
        AnomalyPayload::from(Anomaly {
            id,
            ip: "10.0.0.1".to_string(),
            severity: "LOW".to_string(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
            detection_source: "RULE".to_string(),
            ai_explanation: None,
            recommended_action: None,
            confidence_score: None,
            log_entry_id: None,
            status: "OPEN".to_string(),
            resolution_notes: None,
            resolved_by: None,
            resolved_at: None,
        })
    }

    #[tokio::test]
    async fn subscribers_receive_in_publish_order() {
        let broadcaster = AnomalyBroadcaster::new();
        let mut rx_a = broadcaster.subscribe();
        let mut rx_b = broadcaster.subscribe();

        broadcaster.publish(payload(1, "first"));
        broadcaster.publish(payload(2, "second"));

        assert_eq!(rx_a.recv().await.unwrap().id, "1");
        assert_eq!(rx_a.recv().await.unwrap().id, "2");
        assert_eq!(rx_b.recv().await.unwrap().id, "1");
        assert_eq!(rx_b.recv().await.unwrap().id, "2");
    }

    #[tokio::test]
    async fn no_replay_for_late_subscribers() {
        let broadcaster = AnomalyBroadcaster::new();
        broadcaster.publish(payload(1, "before attach"));

        let mut rx = broadcaster.subscribe();
        broadcaster.publish(payload(2, "after attach"));

        assert_eq!(rx.recv().await.unwrap().id, "2");
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let broadcaster = AnomalyBroadcaster::new();
        broadcaster.publish(payload(1, "nobody listening"));
    }
}
