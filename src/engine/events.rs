//! Engine Events
//!
//! Observers subscribe to a broadcast channel of [`CacheEvent`]s. Repeated
//! events for the same (kind, key, store) within the throttle window are
//! dropped; error events always go through.

use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::cache::BoundedExpiringMap;

/// Buffered events per subscriber before the slowest one starts lagging.
const CHANNEL_CAPACITY: usize = 256;

/// Distinct (kind, key, store) tuples tracked by the throttle.
const THROTTLE_CAPACITY: usize = 10_000;

// == Event Kind ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Get,
    Set,
    Remove,
    Clear,
    Expired,
    Error,
    /// A store-selection decision
    Strategy,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Get => "get",
            EventKind::Set => "set",
            EventKind::Remove => "remove",
            EventKind::Clear => "clear",
            EventKind::Expired => "expired",
            EventKind::Error => "error",
            EventKind::Strategy => "strategy",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Cache Event ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub key: Option<String>,
    pub store: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CacheEvent {
    pub fn new(kind: EventKind, key: Option<&str>, store: Option<&str>) -> Self {
        Self {
            kind,
            key: key.map(str::to_string),
            store: store.map(str::to_string),
            timestamp: Utc::now(),
            value: None,
            error: None,
        }
    }

    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    fn throttle_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.kind,
            self.key.as_deref().unwrap_or(""),
            self.store.as_deref().unwrap_or("")
        )
    }
}

// == Event Emitter ==
pub struct EventEmitter {
    sender: broadcast::Sender<CacheEvent>,
    throttle: Option<Mutex<BoundedExpiringMap<String, ()>>>,
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("subscribers", &self.sender.receiver_count())
            .field("throttled", &self.throttle.is_some())
            .finish()
    }
}

impl EventEmitter {
    /// A `throttle_ms` of 0 disables throttling.
    pub fn new(throttle_ms: u64) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let throttle = (throttle_ms > 0).then(|| {
            Mutex::new(BoundedExpiringMap::new(THROTTLE_CAPACITY).with_default_ttl(throttle_ms))
        });
        Self { sender, throttle }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.sender.subscribe()
    }

    /// Publishes `event` unless an identical tuple went out within the
    /// window. Returns whether it was published.
    pub fn emit(&self, event: CacheEvent) -> bool {
        if self.sender.receiver_count() == 0 {
            return false;
        }

        if event.kind != EventKind::Error {
            if let Some(throttle) = &self.throttle {
                let key = event.throttle_key();
                let mut window = throttle.lock();
                if window.has(key.as_str()) {
                    return false;
                }
                window.set(key, (), None);
            }
        }

        self.sender.send(event).is_ok()
    }

    /// Drops expired throttle slots.
    pub fn cleanup(&self) -> usize {
        self.throttle
            .as_ref()
            .map(|throttle| throttle.lock().cleanup())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_emit_reaches_subscriber() {
        let emitter = EventEmitter::new(100);
        let mut rx = emitter.subscribe();

        assert!(emitter.emit(CacheEvent::new(EventKind::Set, Some("k"), Some("memory"))));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::Set);
        assert_eq!(event.key.as_deref(), Some("k"));
    }

    #[tokio::test]
    async fn test_repeated_events_are_throttled() {
        let emitter = EventEmitter::new(50);
        let _rx = emitter.subscribe();

        assert!(emitter.emit(CacheEvent::new(EventKind::Get, Some("k"), Some("memory"))));
        assert!(!emitter.emit(CacheEvent::new(EventKind::Get, Some("k"), Some("memory"))));
        // different store, different tuple
        assert!(emitter.emit(CacheEvent::new(EventKind::Get, Some("k"), Some("local"))));

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(emitter.emit(CacheEvent::new(EventKind::Get, Some("k"), Some("memory"))));
    }

    #[tokio::test]
    async fn test_errors_are_never_throttled() {
        let emitter = EventEmitter::new(1_000);
        let _rx = emitter.subscribe();

        for _ in 0..3 {
            let event = CacheEvent::new(EventKind::Error, Some("k"), None).with_error("boom");
            assert!(emitter.emit(event));
        }
    }

    #[test]
    fn test_no_subscribers_is_a_noop() {
        let emitter = EventEmitter::new(100);
        assert!(!emitter.emit(CacheEvent::new(EventKind::Clear, None, None)));
        assert_eq!(emitter.cleanup(), 0);
    }

    #[test]
    fn test_event_serializes_type_field() {
        let event = CacheEvent::new(EventKind::Strategy, Some("k"), Some("local"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "strategy");
        assert!(json.get("error").is_none());
    }
}
