use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use quorum_models::belief::{clamp_unit, Belief, BeliefValue};
use quorum_models::clock::{Clock, SystemClock};

/// Per-agent store of confidence-rated, provenanced facts.
///
/// Readers share the lock; a writer holds it only for the single map insert,
/// never across I/O. Every mutation leaves the map consistent, so a poisoned
/// lock is recovered rather than propagated.
pub struct BeliefStore {
    beliefs: RwLock<HashMap<String, Belief>>,
    clock: Arc<dyn Clock>,
}

impl BeliefStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            beliefs: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Upsert a belief. The previous entry for `key` is replaced entirely.
    ///
    /// Timestamps never move backwards for a key: if the clock reads earlier
    /// than the stored timestamp, the stored timestamp is kept.
    pub fn update(
        &self,
        key: impl Into<String>,
        value: impl Into<BeliefValue>,
        confidence: f64,
        source: impl Into<String>,
    ) {
        let key = key.into();
        let now = self.clock.now();
        let mut beliefs = self.beliefs.write().unwrap_or_else(PoisonError::into_inner);
        let timestamp = match beliefs.get(&key) {
            Some(previous) if previous.timestamp > now => previous.timestamp,
            _ => now,
        };
        beliefs.insert(
            key.clone(),
            Belief {
                key,
                value: value.into(),
                confidence: clamp_unit(confidence),
                timestamp,
                source: source.into(),
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<Belief> {
        self.beliefs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Numeric value of a belief, if present and numeric.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|b| b.value.as_f64())
    }

    /// Independent snapshot of every belief.
    pub fn get_all(&self) -> HashMap<String, Belief> {
        self.beliefs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Mean confidence across all beliefs; 0.0 when empty.
    pub fn overall_confidence(&self) -> f64 {
        let beliefs = self.beliefs.read().unwrap_or_else(PoisonError::into_inner);
        if beliefs.is_empty() {
            return 0.0;
        }
        let total: f64 = beliefs.values().map(|b| b.confidence).sum();
        total / beliefs.len() as f64
    }

    pub fn len(&self) -> usize {
        self.beliefs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BeliefStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use quorum_models::clock::FixedClock;

    #[test]
    fn empty_store_has_zero_confidence() {
        let store = BeliefStore::new();
        assert_eq!(store.overall_confidence(), 0.0);
        assert!(store.is_empty());
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn overall_confidence_is_the_mean() {
        let store = BeliefStore::new();
        store.update("a", 1.0, 0.9, "test");
        store.update("b", true, 0.6, "test");
        store.update("c", "trending", 0.3, "test");
        assert!((store.overall_confidence() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn update_overwrites_in_place() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let store = BeliefStore::with_clock(clock.clone());
        store.update("market.volatility", 0.02, 0.5, "feed_a");
        clock.advance(Duration::seconds(3));
        store.update("market.volatility", 0.05, 0.8, "feed_b");

        let belief = store.get("market.volatility").unwrap();
        assert_eq!(belief.value, BeliefValue::Number(0.05));
        assert_eq!(belief.confidence, 0.8);
        assert_eq!(belief.source, "feed_b");
        assert_eq!(belief.timestamp, clock.now());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn confidence_is_clamped_on_insert() {
        let store = BeliefStore::new();
        store.update("x", 1.0, 1.7, "test");
        store.update("y", 1.0, -0.4, "test");
        assert_eq!(store.get("x").unwrap().confidence, 1.0);
        assert_eq!(store.get("y").unwrap().confidence, 0.0);
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let start = Utc::now();
        let clock = Arc::new(FixedClock::new(start));
        let store = BeliefStore::with_clock(clock.clone());
        store.update("k", 1.0, 0.5, "test");

        clock.set(start - Duration::seconds(30));
        store.update("k", 2.0, 0.5, "test");

        let belief = store.get("k").unwrap();
        assert_eq!(belief.timestamp, start);
        assert_eq!(belief.value.as_f64(), Some(2.0));
    }

    #[test]
    fn get_all_is_an_independent_snapshot() {
        let store = BeliefStore::new();
        store.update("a", 1.0, 0.5, "test");

        let mut snapshot = store.get_all();
        snapshot.clear();
        snapshot.insert(
            "b".to_string(),
            Belief {
                key: "b".to_string(),
                value: BeliefValue::Bool(false),
                confidence: 0.1,
                timestamp: Utc::now(),
                source: "outside".to_string(),
            },
        );

        assert_eq!(store.len(), 1);
        assert!(store.get("a").is_some());
        assert!(store.get("b").is_none());
    }

    #[test]
    fn concurrent_readers_and_writers() {
        let store = Arc::new(BeliefStore::new());
        let mut handles = Vec::new();
        for worker in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    store.update(format!("k{}", i % 10), i as f64, 0.5, format!("w{worker}"));
                    let _ = store.overall_confidence();
                    let _ = store.get_all();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 10);
        assert!((store.overall_confidence() - 0.5).abs() < 1e-12);
    }
}
