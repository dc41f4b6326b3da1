//! Per-error throttling with an optional grace window.
//!
//! Two records are kept per [`ErrorIdentity`]: the time of the last allowed
//! alert (throttle record) and the time the error was first seen in the
//! current cycle (grace record). Both are stored as RFC3339 timestamps.

use crate::config::ThrottleConfig;
use crate::error::Result;
use crate::key_generator::ErrorIdentity;
use crate::store::KeyValueStore;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of a throttle decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Suppress,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Decides whether an alert for a given error may go out now.
///
/// The read-decide-write sequence is not synchronised: two processes sharing
/// a store can both observe an expired window and both allow.
#[derive(Clone)]
pub struct ThrottleEngine {
    store: Arc<dyn KeyValueStore>,
    throttle_window: Duration,
    grace_window: Duration,
}

impl ThrottleEngine {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &ThrottleConfig) -> Self {
        Self::with_windows(store, config.window, config.grace)
    }

    pub fn with_windows(
        store: Arc<dyn KeyValueStore>,
        throttle_window: std::time::Duration,
        grace_window: std::time::Duration,
    ) -> Self {
        Self {
            store,
            throttle_window: to_chrono(throttle_window),
            grace_window: to_chrono(grace_window),
        }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Decide for `identity` against the current wall clock.
    pub async fn decide(&self, identity: &ErrorIdentity) -> Result<Decision> {
        self.decide_at(identity, Utc::now()).await
    }

    /// Decide for `identity` as of `now`, updating the stored records.
    ///
    /// Unreadable records count as absent. Failing to write the throttle
    /// record is returned as an error so callers can fail closed.
    pub async fn decide_at(&self, identity: &ErrorIdentity, now: DateTime<Utc>) -> Result<Decision> {
        let throttle_key = identity.throttle_key();
        let grace_key = identity.grace_key();

        let throttled_at = self.read_timestamp(throttle_key).await;
        let mut detected_at = self.read_timestamp(&grace_key).await;

        if let Some(at) = throttled_at {
            if now - at < self.throttle_window {
                debug!(identity = %identity, throttled_at = %at, "Suppressed: inside throttle window");
                return Ok(Decision::Suppress);
            }
        }

        let cycle = self
            .grace_window
            .checked_add(&self.throttle_window)
            .unwrap_or(Duration::MAX);
        let cycle_elapsed = detected_at.map_or(true, |at| now - at >= cycle);
        if cycle_elapsed {
            detected_at = match self.write_timestamp(&grace_key, now).await {
                Ok(()) => Some(now),
                Err(e) => {
                    warn!(identity = %identity, error = %e, "Failed to record detection time, skipping grace check");
                    None
                }
            };
        }

        if let Some(at) = detected_at {
            if now - at < self.grace_window {
                debug!(identity = %identity, detected_at = %at, "Suppressed: inside grace window");
                return Ok(Decision::Suppress);
            }
        }

        self.write_timestamp(throttle_key, now).await?;
        debug!(identity = %identity, "Allowed");
        Ok(Decision::Allow)
    }

    /// Wipe every throttle and grace record in the store.
    pub async fn clear_all(&self) -> Result<()> {
        self.store.clear_all().await
    }

    async fn read_timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read throttle store, treating record as absent");
                return None;
            }
        };

        let parsed = std::str::from_utf8(&raw)
            .ok()
            .and_then(|text| DateTime::parse_from_rfc3339(text.trim()).ok())
            .map(|at| at.with_timezone(&Utc));

        if parsed.is_none() {
            warn!(key = %key, "Ignoring unparseable throttle record");
        }
        parsed
    }

    async fn write_timestamp(&self, key: &str, at: DateTime<Utc>) -> Result<()> {
        let value = format_timestamp(at);
        self.store.set(key, value.as_bytes()).await
    }
}

/// RFC3339 with second precision, the only value shape the engine stores.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn to_chrono(duration: std::time::Duration) -> Duration {
    Duration::from_std(duration).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn engine(store: Arc<MemoryStore>, minutes: u64, grace_secs: u64) -> ThrottleEngine {
        ThrottleEngine::with_windows(
            store,
            std::time::Duration::from_secs(minutes * 60),
            std::time::Duration::from_secs(grace_secs),
        )
    }

    #[tokio::test]
    async fn test_first_occurrence_allows_without_grace() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone(), 5, 0);
        let identity = ErrorIdentity::new("test_throttling");

        assert_eq!(engine.decide_at(&identity, t0()).await.unwrap(), Decision::Allow);
        assert_eq!(
            store.get("test_throttling").await.unwrap().as_deref(),
            Some(format_timestamp(t0()).as_bytes())
        );
    }

    #[tokio::test]
    async fn test_repeated_calls_inside_window_suppress() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store, 5, 0);
        let identity = ErrorIdentity::new("test_throttling");

        assert!(engine.decide_at(&identity, t0()).await.unwrap().is_allowed());
        for secs in [0, 1, 60, 299] {
            let at = t0() + Duration::seconds(secs);
            assert_eq!(engine.decide_at(&identity, at).await.unwrap(), Decision::Suppress);
        }
    }

    #[tokio::test]
    async fn test_window_expiry_is_inclusive() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store, 5, 0);
        let identity = ErrorIdentity::new("test_throttling");

        engine.decide_at(&identity, t0()).await.unwrap();
        let boundary = t0() + Duration::minutes(5);
        assert_eq!(engine.decide_at(&identity, boundary).await.unwrap(), Decision::Allow);
    }

    #[tokio::test]
    async fn test_grace_window_delays_first_alert() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone(), 5, 25);
        let identity = ErrorIdentity::new("test_throttling");

        assert_eq!(engine.decide_at(&identity, t0()).await.unwrap(), Decision::Suppress);
        assert!(store.get("test_throttling").await.unwrap().is_none());

        let before = t0() + Duration::seconds(24);
        assert_eq!(engine.decide_at(&identity, before).await.unwrap(), Decision::Suppress);

        let boundary = t0() + Duration::seconds(25);
        assert_eq!(engine.decide_at(&identity, boundary).await.unwrap(), Decision::Allow);
    }

    #[tokio::test]
    async fn test_grace_clock_not_reset_by_repeats() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone(), 5, 25);
        let identity = ErrorIdentity::new("test_throttling");

        engine.decide_at(&identity, t0()).await.unwrap();
        engine.decide_at(&identity, t0() + Duration::seconds(10)).await.unwrap();

        assert_eq!(
            store.get(&identity.grace_key()).await.unwrap().as_deref(),
            Some(format_timestamp(t0()).as_bytes())
        );
    }

    #[tokio::test]
    async fn test_new_cycle_restarts_grace() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store, 5, 25);
        let identity = ErrorIdentity::new("test_throttling");

        engine.decide_at(&identity, t0()).await.unwrap();
        let allowed_at = t0() + Duration::seconds(30);
        assert!(engine.decide_at(&identity, allowed_at).await.unwrap().is_allowed());

        // Throttle expired and the grace+throttle cycle elapsed: grace starts over.
        let later = allowed_at + Duration::minutes(5);
        assert_eq!(engine.decide_at(&identity, later).await.unwrap(), Decision::Suppress);
        let after_grace = later + Duration::seconds(25);
        assert_eq!(engine.decide_at(&identity, after_grace).await.unwrap(), Decision::Allow);
    }

    #[tokio::test]
    async fn test_unparseable_record_counts_as_absent() {
        let store = Arc::new(MemoryStore::new());
        store.set("test_throttling", b"not a timestamp").await.unwrap();
        let engine = engine(store.clone(), 5, 0);

        let identity = ErrorIdentity::new("test_throttling");
        assert_eq!(engine.decide_at(&identity, t0()).await.unwrap(), Decision::Allow);
        assert_eq!(
            store.get("test_throttling").await.unwrap().as_deref(),
            Some(format_timestamp(t0()).as_bytes())
        );
    }

    #[tokio::test]
    async fn test_zero_windows_always_allow() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store, 0, 0);
        let identity = ErrorIdentity::new("test_throttling");

        for _ in 0..3 {
            assert!(engine.decide_at(&identity, t0()).await.unwrap().is_allowed());
        }
    }

    #[tokio::test]
    async fn test_clear_all_resets_state() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone(), 5, 0);
        let identity = ErrorIdentity::new("test_throttling");

        engine.decide_at(&identity, t0()).await.unwrap();
        engine.clear_all().await.unwrap();

        assert!(store.is_empty());
        assert!(engine.decide_at(&identity, t0()).await.unwrap().is_allowed());
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(t0()), "2024-03-01T12:00:00Z");
    }
}
