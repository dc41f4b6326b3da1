use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

/// Identities tracked individually before further ones share [`OVERFLOW_IDENTITY`].
pub const DEFAULT_MAX_IDENTITIES: usize = 1024;

/// Bucket counting every identity seen after the limit was reached.
pub const OVERFLOW_IDENTITY: &str = "<other>";

/// What happened to one `notify` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Matched an ignore list
    Ignored,
    /// Throttled, still in grace, or the store could not record the attempt
    Suppressed,
    /// Every enabled channel accepted the alert
    Delivered,
    /// A channel failed
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertMetrics {
    pub total: u64,
    pub ignored: u64,
    pub suppressed: u64,
    pub delivered: u64,
    pub failed: u64,
    pub last_reset: u64,
}

impl Default for AlertMetrics {
    fn default() -> Self {
        Self {
            total: 0,
            ignored: 0,
            suppressed: 0,
            delivered: 0,
            failed: 0,
            last_reset: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

impl AlertMetrics {
    fn record(&mut self, outcome: DispatchOutcome) {
        self.total += 1;
        match outcome {
            DispatchOutcome::Ignored => self.ignored += 1,
            DispatchOutcome::Suppressed => self.suppressed += 1,
            DispatchOutcome::Delivered => self.delivered += 1,
            DispatchOutcome::Failed => self.failed += 1,
        }
    }
}

/// In-process counters per error identity.
///
/// Identities usually carry message text, so the number tracked individually
/// is bounded; later identities are folded into [`OVERFLOW_IDENTITY`].
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    per_identity: Arc<RwLock<HashMap<String, AlertMetrics>>>,
    max_identities: usize,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::with_max_identities(DEFAULT_MAX_IDENTITIES)
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_identities(max_identities: usize) -> Self {
        Self {
            per_identity: Arc::new(RwLock::new(HashMap::new())),
            max_identities,
        }
    }

    pub async fn record(&self, identity: &str, outcome: DispatchOutcome) {
        let mut metrics = self.per_identity.write().await;
        if let Some(entry) = metrics.get_mut(identity) {
            entry.record(outcome);
            return;
        }

        let tracked = metrics.len() - usize::from(metrics.contains_key(OVERFLOW_IDENTITY));
        let key = if tracked < self.max_identities {
            identity
        } else {
            OVERFLOW_IDENTITY
        };
        metrics.entry(key.to_string()).or_default().record(outcome);
    }

    pub async fn get(&self, identity: &str) -> Option<AlertMetrics> {
        let metrics = self.per_identity.read().await;
        metrics.get(identity).cloned()
    }

    pub async fn get_all(&self) -> HashMap<String, AlertMetrics> {
        let metrics = self.per_identity.read().await;
        metrics.clone()
    }

    pub async fn reset(&self) {
        let mut metrics = self.per_identity.write().await;
        metrics.clear();
    }

    pub async fn get_global(&self) -> AlertMetrics {
        let metrics = self.per_identity.read().await;
        let mut global = AlertMetrics::default();

        for entry in metrics.values() {
            global.total += entry.total;
            global.ignored += entry.ignored;
            global.suppressed += entry.suppressed;
            global.delivered += entry.delivered;
            global.failed += entry.failed;
        }

        global
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_per_identity() {
        let collector = MetricsCollector::new();
        collector.record("db timeout", DispatchOutcome::Delivered).await;
        collector.record("db timeout", DispatchOutcome::Suppressed).await;
        collector.record("disk full", DispatchOutcome::Failed).await;

        let db = collector.get("db timeout").await.unwrap();
        assert_eq!(db.total, 2);
        assert_eq!(db.delivered, 1);
        assert_eq!(db.suppressed, 1);

        let global = collector.get_global().await;
        assert_eq!(global.total, 3);
        assert_eq!(global.failed, 1);
    }

    #[tokio::test]
    async fn test_identities_beyond_limit_share_overflow_bucket() {
        let collector = MetricsCollector::with_max_identities(2);
        collector.record("db timeout", DispatchOutcome::Delivered).await;
        collector.record("disk full", DispatchOutcome::Delivered).await;
        for request in 0..100 {
            let identity = format!("request {} failed", request);
            collector.record(&identity, DispatchOutcome::Suppressed).await;
        }
        collector.record("db timeout", DispatchOutcome::Suppressed).await;

        let all = collector.get_all().await;
        assert_eq!(all.len(), 3);
        assert_eq!(all[OVERFLOW_IDENTITY].suppressed, 100);
        assert_eq!(all["db timeout"].total, 2);
        assert!(collector.get("request 7 failed").await.is_none());
        assert_eq!(collector.get_global().await.total, 103);
    }

    #[tokio::test]
    async fn test_reset() {
        let collector = MetricsCollector::new();
        collector.record("db timeout", DispatchOutcome::Ignored).await;
        collector.reset().await;
        assert!(collector.get("db timeout").await.is_none());
    }
}
