//! Per-route request statistics.
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug, Default, Clone, Copy)]
struct Timer {
    total_us: u64,
    count: u64,
}

/// Accumulator shared by all connections hitting one route. Counters are
/// atomics, labeled timers sit behind a mutex that is only held for the
/// update itself.
#[derive(Debug, Default)]
pub struct Statistics {
    requests: AtomicU64,
    rx_bytes: AtomicU64,
    tx_bytes: AtomicU64,
    timers: Mutex<BTreeMap<String, Timer>>,
}

/// Point-in-time view of a [`Statistics`] accumulator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub requests: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub avg_rx_bytes: u64,
    pub avg_tx_bytes: u64,
    /// Average microseconds per labeled phase.
    pub timers_us: BTreeMap<String, u64>,
}

/// Statistics of one route, as exported by
/// [`Routes::statistics`](crate::router::Routes::statistics).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteStatistics {
    pub method: String,
    pub route: String,
    #[serde(flatten)]
    pub stats: Snapshot,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    fn timers(&self) -> MutexGuard<'_, BTreeMap<String, Timer>> {
        match self.timers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Count one request with its transferred bytes.
    pub fn record(&self, rx_bytes: u64, tx_bytes: u64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.rx_bytes.fetch_add(rx_bytes, Ordering::Relaxed);
        self.tx_bytes.fetch_add(tx_bytes, Ordering::Relaxed);
    }

    pub fn record_timer(&self, label: &str, elapsed: Duration) {
        let mut timers = self.timers();
        let timer = timers.entry(label.to_string()).or_default();
        timer.total_us += elapsed.as_micros() as u64;
        timer.count += 1;
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> Snapshot {
        let requests = self.requests();
        let rx_bytes = self.rx_bytes.load(Ordering::Relaxed);
        let tx_bytes = self.tx_bytes.load(Ordering::Relaxed);
        let avg = |total: u64, count: u64| if count == 0 { 0 } else { total / count };
        let timers_us = self
            .timers()
            .iter()
            .map(|(label, t)| (label.clone(), avg(t.total_us, t.count)))
            .collect();
        Snapshot {
            requests,
            rx_bytes,
            tx_bytes,
            avg_rx_bytes: avg(rx_bytes, requests),
            avg_tx_bytes: avg(tx_bytes, requests),
            timers_us,
        }
    }
}

/// Splits the time spent on one request into labeled laps.
#[derive(Debug)]
pub struct Stopwatch {
    start: Instant,
    last: Instant,
    laps: Vec<(&'static str, Duration)>,
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Stopwatch {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
            laps: vec![],
        }
    }
    /// Close the current lap under `label`.
    pub fn lap(&mut self, label: &'static str) -> Duration {
        let now = Instant::now();
        let elapsed = now - self.last;
        self.last = now;
        self.laps.push((label, elapsed));
        elapsed
    }
    pub fn laps(&self) -> &[(&'static str, Duration)] {
        &self.laps
    }
    pub fn lap_time(&self, label: &str) -> Option<Duration> {
        self.laps.iter().find(|(l, _)| *l == label).map(|(_, d)| *d)
    }
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
    pub fn record_into(&self, stats: &Statistics) {
        for (label, elapsed) in &self.laps {
            stats.record_timer(label, *elapsed);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_concurrent_updates() {
        let stats = Arc::new(Statistics::new());
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..250 {
                        stats.record(10, 100);
                        stats.record_timer("handle", Duration::from_micros(8));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.requests, 1000);
        assert_eq!(snapshot.rx_bytes, 10_000);
        assert_eq!(snapshot.avg_tx_bytes, 100);
        assert_eq!(snapshot.timers_us.get("handle"), Some(&8));
    }

    #[test]
    fn test_export_json() {
        let stats = Statistics::new();
        stats.record(5, 7);
        let exported = serde_json::to_value(RouteStatistics {
            method: "GET".to_string(),
            route: "/user/:id".to_string(),
            stats: stats.snapshot(),
        })
        .unwrap();
        assert_eq!(exported["method"], "GET");
        assert_eq!(exported["requests"], 1);
        assert_eq!(exported["avg_tx_bytes"], 7);
        assert!(exported["timers_us"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_stopwatch_laps() {
        let mut watch = Stopwatch::new();
        watch.lap("parse");
        watch.lap("handle");
        assert_eq!(watch.laps().len(), 2);
        assert!(watch.lap_time("handle").is_some());
        let stats = Statistics::new();
        watch.record_into(&stats);
        assert_eq!(stats.snapshot().timers_us.len(), 2);
    }
}
