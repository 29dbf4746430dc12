use std::time::Duration;

use moka::future::Cache;
use quorum_models::signal::Signal;

/// Per-cycle buffer of published signals, backed by moka.
///
/// Holds the latest signal per (origin, symbol). Entries evict after the
/// cycle window, and draining removes them so each signal is consumed at
/// most once.
pub struct SignalInbox {
    inner: Cache<String, Signal>,
}

impl SignalInbox {
    pub fn new(max_capacity: u64, window: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(window)
                .build(),
        }
    }

    fn key(signal: &Signal) -> String {
        format!("{}|{}", signal.origin, signal.symbol)
    }

    /// Buffer a signal, replacing an older one from the same origin and symbol.
    pub async fn push(&self, signal: Signal) {
        let key = Self::key(&signal);
        if let Some(existing) = self.inner.get(&key).await {
            if existing.timestamp > signal.timestamp {
                return;
            }
        }
        self.inner.insert(key, signal).await;
    }

    /// Remove and return every buffered signal for `symbol`, oldest first.
    pub async fn drain_symbol(&self, symbol: &str) -> Vec<Signal> {
        let keys: Vec<String> = self
            .inner
            .iter()
            .filter(|(_, signal)| signal.symbol == symbol)
            .map(|(key, _)| key.as_ref().clone())
            .collect();
        self.take(keys).await
    }

    /// Remove and return every buffered signal, oldest first.
    pub async fn drain_all(&self) -> Vec<Signal> {
        let keys: Vec<String> = self
            .inner
            .iter()
            .map(|(key, _)| key.as_ref().clone())
            .collect();
        self.take(keys).await
    }

    async fn take(&self, keys: Vec<String>) -> Vec<Signal> {
        let mut taken = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(signal) = self.inner.remove(&key).await {
                taken.push(signal);
            }
        }
        taken.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.origin.cmp(&b.origin))
        });
        taken
    }

    /// Symbols that currently have buffered signals.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .inner
            .iter()
            .map(|(_, signal)| signal.symbol)
            .collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    pub async fn pending(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }
}
