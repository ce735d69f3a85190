// ═══════════════════════════════════════════════════════════════
// METRICS COLLECTOR - process-wide totals across ingestion runs
// ═══════════════════════════════════════════════════════════════
//
// Each run owns its own `IngestionStats`. This collector only adds them up
// once a run is over, so nothing here can influence a run in progress.
// Atomic counters, read into a serializable snapshot on demand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::filters::IngestionStats;
use crate::models::Source;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_truncated: u64,
    pub api_records_accepted: u64,
    pub portal_records_accepted: u64,
    pub records_seen: u64,
    pub pages_fetched: u64,
    pub probes_attempted: u64,
    pub probes_not_found: u64,
    pub fetch_failures: u64,
    pub low_confidence_records: u64,
    pub uptime_seconds: u64,
}

impl MetricsSnapshot {
    pub fn records_accepted(&self) -> u64 {
        self.api_records_accepted + self.portal_records_accepted
    }
}

pub struct MetricsCollector {
    runs_started: AtomicU64,
    runs_completed: AtomicU64,
    runs_truncated: AtomicU64,
    api_records_accepted: AtomicU64,
    portal_records_accepted: AtomicU64,
    records_seen: AtomicU64,
    pages_fetched: AtomicU64,
    probes_attempted: AtomicU64,
    probes_not_found: AtomicU64,
    fetch_failures: AtomicU64,
    low_confidence_records: AtomicU64,
    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            runs_started: AtomicU64::new(0),
            runs_completed: AtomicU64::new(0),
            runs_truncated: AtomicU64::new(0),
            api_records_accepted: AtomicU64::new(0),
            portal_records_accepted: AtomicU64::new(0),
            records_seen: AtomicU64::new(0),
            pages_fetched: AtomicU64::new(0),
            probes_attempted: AtomicU64::new(0),
            probes_not_found: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
            low_confidence_records: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn increment_runs_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold a finished run's stats into the totals.
    pub fn record_run(&self, source: Source, stats: &IngestionStats) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
        if stats.truncated() {
            self.runs_truncated.fetch_add(1, Ordering::Relaxed);
        }
        let accepted = match source {
            Source::OfficialApi => &self.api_records_accepted,
            Source::PortalScraper => &self.portal_records_accepted,
        };
        accepted.fetch_add(stats.accepted, Ordering::Relaxed);
        self.records_seen.fetch_add(stats.total_seen, Ordering::Relaxed);
        self.pages_fetched.fetch_add(stats.pages_fetched, Ordering::Relaxed);
        self.probes_attempted.fetch_add(stats.probes_attempted, Ordering::Relaxed);
        self.probes_not_found.fetch_add(stats.probes_not_found, Ordering::Relaxed);
        self.fetch_failures.fetch_add(stats.fetch_failures, Ordering::Relaxed);
        self.low_confidence_records.fetch_add(stats.low_confidence, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_truncated: self.runs_truncated.load(Ordering::Relaxed),
            api_records_accepted: self.api_records_accepted.load(Ordering::Relaxed),
            portal_records_accepted: self.portal_records_accepted.load(Ordering::Relaxed),
            records_seen: self.records_seen.load(Ordering::Relaxed),
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            probes_attempted: self.probes_attempted.load(Ordering::Relaxed),
            probes_not_found: self.probes_not_found.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            low_confidence_records: self.low_confidence_records.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}
