// =============================================================================
// pipeline.rs - DECODE, FILTER, NORMALIZE, KEEP
// =============================================================================
//
// Each adapter owns one `RunContext` per search. The adapter's job is to
// find raw records; the context's job is everything after that. It decodes
// the tribunal, runs the funnel, normalizes survivors, appends them in
// discovery order and enforces the accepted-record cap and the run deadline.
// =============================================================================

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::filters::{FilterPipeline, IngestionStats, StopReason};
use crate::models::{RawProcess, SearchCriteria, SearchOutcome, Source};
use crate::normalize::Normalizer;
use crate::tribunal::IdentifierDecoder;

/// What happened to a raw record offered to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    Rejected,
    /// The cap was already reached; the record was not looked at.
    Full,
}

/// Caps shared by both adapters.
#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    pub max_accepted: usize,
    pub deadline: Option<Duration>,
    pub reference_year: i32,
}

pub struct RunContext<'a> {
    source: Source,
    decoder: &'a IdentifierDecoder,
    filters: FilterPipeline<'a>,
    normalizer: Normalizer,
    max_accepted: usize,
    started: Instant,
    deadline: Option<Instant>,
    records: Vec<crate::models::ProcessRecord>,
    pub stats: IngestionStats,
}

impl<'a> RunContext<'a> {
    pub fn new(
        source: Source,
        criteria: &'a SearchCriteria,
        decoder: &'a IdentifierDecoder,
        limits: RunLimits,
    ) -> Self {
        let started = Instant::now();
        Self {
            source,
            decoder,
            filters: FilterPipeline::new(criteria, limits.reference_year),
            normalizer: Normalizer::new(limits.reference_year),
            max_accepted: limits.max_accepted,
            started,
            deadline: limits.deadline.map(|d| started + d),
            records: Vec::new(),
            stats: IngestionStats::new(criteria),
        }
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.max_accepted
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline, if there is one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn offer(&mut self, raw: RawProcess) -> Offer {
        if self.is_full() {
            return Offer::Full;
        }

        let tribunal = self.decoder.resolve(raw.number());
        let view = raw.view();
        if !self.filters.apply(&view, &tribunal, &mut self.stats) {
            debug!(
                source = %self.source,
                number = view.number,
                tribunal = %tribunal,
                "Record dropped by filters"
            );
            return Offer::Rejected;
        }

        let record = self.normalizer.normalize(&raw, &tribunal, self.source);
        if record.low_confidence {
            self.stats.low_confidence += 1;
        }
        debug!(
            source = %self.source,
            number = record.number.as_str(),
            tribunal = record.tribunal_code.as_str(),
            amount = %record.amount,
            low_confidence = record.low_confidence,
            "Record accepted"
        );
        self.records.push(record);
        self.stats.accepted += 1;
        Offer::Accepted
    }

    pub fn finish(mut self, stop_reason: StopReason) -> SearchOutcome {
        self.stats.stop_reason = stop_reason;
        self.stats.elapsed_ms = self.started.elapsed().as_millis() as u64;
        SearchOutcome {
            records: self.records,
            stats: self.stats,
        }
    }
}
