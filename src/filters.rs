// =============================================================================
// filters.rs - THE FUNNEL
// =============================================================================
//
// Four stages, always in this order:
//
//     tribunal -> value range -> nature substring -> fiscal year
//
// A record that fails a stage stops there and never touches a later
// counter. A stage with nothing to check (no tribunal asked for, no bounds,
// ...) lets everything through and still counts it, so the counters always
// read as a funnel:
//
//     seen >= after_tribunal >= after_value >= after_nature >= after_fiscal_year
//
// The stats are owned by one run. No atomics, no sharing.
// =============================================================================

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{RawView, SearchCriteria, TribunalCode};
use crate::normalize::{fiscal_year_for, parse_filing_date};

/// Why a run stopped. Lets the caller tell "nothing matched" apart from
/// "we gave up early".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum StopReason {
    /// Still running, or never started.
    #[default]
    NotStopped,
    /// API returned an empty page.
    Exhausted,
    /// API returned fewer entries than the page size.
    ShortPage,
    /// Accepted-record cap reached.
    AcceptedCap,
    /// API page cap reached.
    PageCap,
    /// A page fetch failed after retries; partial results kept.
    FetchFailed,
    /// The API path needs a date range and none was given.
    MissingDateRange,
    /// Portal target count reached.
    TargetReached,
    /// Portal probe cap reached.
    ProbeCap,
    /// Portal candidate pool ran dry.
    CandidatesExhausted,
    /// Run deadline passed.
    Deadline,
}

/// Counters for one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestionStats {
    /// Raw records observed, including entries too broken to filter.
    pub total_seen: u64,
    /// Observed entries that weren't records at all (null, scalars).
    pub skipped_entries: u64,
    pub after_tribunal: u64,
    pub after_value: u64,
    pub after_nature: u64,
    pub after_fiscal_year: u64,
    /// Records normalized and appended to the result list.
    pub accepted: u64,
    pub active_filters: Vec<String>,

    pub pages_fetched: u64,
    pub probes_attempted: u64,
    pub probes_not_found: u64,
    pub fetch_failures: u64,
    /// Accepted records carrying at least one synthesized field.
    pub low_confidence: u64,
    pub stop_reason: StopReason,
    pub elapsed_ms: u64,
}

impl IngestionStats {
    pub fn new(criteria: &SearchCriteria) -> Self {
        Self {
            active_filters: criteria.active_filters(),
            ..Default::default()
        }
    }

    /// True when the run ended because of a cap, deadline or failure rather
    /// than running out of upstream data.
    pub fn truncated(&self) -> bool {
        matches!(
            self.stop_reason,
            StopReason::AcceptedCap
                | StopReason::PageCap
                | StopReason::FetchFailed
                | StopReason::TargetReached
                | StopReason::ProbeCap
                | StopReason::Deadline
        )
    }
}

/// The ordered predicate stages, bound to one run's criteria.
#[derive(Debug, Clone)]
pub struct FilterPipeline<'a> {
    criteria: &'a SearchCriteria,
    nature_needle: Option<String>,
    reference_year: i32,
}

impl<'a> FilterPipeline<'a> {
    /// `reference_year` feeds the fiscal-year fallback for undated records,
    /// the same one the normalizer uses.
    pub fn new(criteria: &'a SearchCriteria, reference_year: i32) -> Self {
        Self {
            criteria,
            nature_needle: criteria
                .nature
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_lowercase),
            reference_year,
        }
    }

    /// Run a record through every stage, bumping the counters it reaches.
    pub fn apply(&self, raw: &RawView<'_>, tribunal: &TribunalCode, stats: &mut IngestionStats) -> bool {
        stats.total_seen += 1;

        if !self.tribunal_passes(tribunal) {
            return false;
        }
        stats.after_tribunal += 1;

        if !self.value_passes(raw.amount.unwrap_or(Decimal::ZERO)) {
            return false;
        }
        stats.after_value += 1;

        if !self.nature_passes(raw.class_name, raw.subject) {
            return false;
        }
        stats.after_nature += 1;

        if !self.fiscal_year_passes(raw.filing_date) {
            return false;
        }
        stats.after_fiscal_year += 1;

        true
    }

    fn tribunal_passes(&self, tribunal: &TribunalCode) -> bool {
        match &self.criteria.tribunal {
            Some(wanted) => tribunal.matches(wanted),
            None => true,
        }
    }

    fn value_passes(&self, amount: Decimal) -> bool {
        let above_min = self.criteria.value_min.map_or(true, |min| amount >= min);
        let below_max = self.criteria.value_max.map_or(true, |max| amount <= max);
        above_min && below_max
    }

    fn nature_passes(&self, class_name: Option<&str>, subject: Option<&str>) -> bool {
        let Some(needle) = &self.nature_needle else {
            return true;
        };
        [class_name, subject]
            .into_iter()
            .flatten()
            .any(|text| text.to_lowercase().contains(needle.as_str()))
    }

    fn fiscal_year_passes(&self, filing_date: Option<&str>) -> bool {
        let Some(wanted) = self.criteria.fiscal_year else {
            return true;
        };
        let filed = filing_date.and_then(parse_filing_date);
        fiscal_year_for(filed, self.reference_year) == wanted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApiEntry, RawProcess};

    fn raw(amount: i64, class_name: &str, subject: &str, filed: &str) -> RawProcess {
        RawProcess::Api(ApiEntry {
            number: Some("0001234-56.2020.8.26.0100".into()),
            class_name: Some(class_name.into()),
            subject: Some(subject.into()),
            amount: Some(Decimal::new(amount, 0)),
            filing_date: Some(filed.into()),
            ..Default::default()
        })
    }

    fn sp() -> TribunalCode {
        TribunalCode::Resolved("TJ-SP".into())
    }

    fn assert_funnel(stats: &IngestionStats) {
        assert!(stats.total_seen >= stats.after_tribunal);
        assert!(stats.after_tribunal >= stats.after_value);
        assert!(stats.after_value >= stats.after_nature);
        assert!(stats.after_nature >= stats.after_fiscal_year);
    }

    #[test]
    fn test_no_criteria_passes_everything_through_every_stage() {
        let criteria = SearchCriteria::default();
        let pipeline = FilterPipeline::new(&criteria, 2025);
        let mut stats = IngestionStats::new(&criteria);

        for _ in 0..3 {
            assert!(pipeline.apply(&raw(10, "Precatório", "ICMS", "2021-01-10").view(), &TribunalCode::Unresolved, &mut stats));
        }

        assert_eq!(stats.total_seen, 3);
        assert_eq!(stats.after_fiscal_year, 3);
        assert!(stats.active_filters.is_empty());
    }

    #[test]
    fn test_failed_stage_stops_counting() {
        let criteria = SearchCriteria {
            tribunal: Some("TJ-SP".into()),
            value_min: Some(Decimal::new(50_000, 0)),
            ..Default::default()
        };
        let pipeline = FilterPipeline::new(&criteria, 2025);
        let mut stats = IngestionStats::new(&criteria);

        assert!(!pipeline.apply(&raw(90_000, "x", "y", "").view(), &TribunalCode::Unresolved, &mut stats));
        assert!(!pipeline.apply(&raw(10_000, "x", "y", "").view(), &sp(), &mut stats));
        assert!(pipeline.apply(&raw(50_000, "x", "y", "").view(), &sp(), &mut stats));

        assert_eq!(stats.total_seen, 3);
        assert_eq!(stats.after_tribunal, 2);
        assert_eq!(stats.after_value, 1);
        assert_eq!(stats.after_fiscal_year, 1);
        assert_funnel(&stats);
    }

    #[test]
    fn test_value_bounds_are_independent_and_inclusive() {
        let criteria = SearchCriteria {
            value_max: Some(Decimal::new(100, 0)),
            ..Default::default()
        };
        let pipeline = FilterPipeline::new(&criteria, 2025);
        let mut stats = IngestionStats::new(&criteria);

        assert!(pipeline.apply(&raw(100, "x", "y", "").view(), &sp(), &mut stats));
        assert!(!pipeline.apply(&raw(101, "x", "y", "").view(), &sp(), &mut stats));
        // Missing amount counts as zero
        let missing = RawProcess::Api(ApiEntry::default());
        assert!(pipeline.apply(&missing.view(), &sp(), &mut stats));
    }

    #[test]
    fn test_nature_matches_class_or_subject_case_insensitively() {
        let criteria = SearchCriteria {
            nature: Some("ALIMENTAR".into()),
            ..Default::default()
        };
        let pipeline = FilterPipeline::new(&criteria, 2025);
        let mut stats = IngestionStats::new(&criteria);

        assert!(pipeline.apply(&raw(1, "Precatório Alimentar", "x", "").view(), &sp(), &mut stats));
        assert!(pipeline.apply(&raw(1, "Precatório", "Crédito alimentar", "").view(), &sp(), &mut stats));
        assert!(!pipeline.apply(&raw(1, "Precatório", "Tributário", "").view(), &sp(), &mut stats));
        assert_eq!(stats.after_nature, 2);
        assert_funnel(&stats);
    }

    #[test]
    fn test_fiscal_year_is_filing_year_plus_two() {
        let criteria = SearchCriteria {
            fiscal_year: Some(2023),
            ..Default::default()
        };
        let pipeline = FilterPipeline::new(&criteria, 2025);
        let mut stats = IngestionStats::new(&criteria);

        assert!(pipeline.apply(&raw(1, "x", "y", "2021-05-03").view(), &sp(), &mut stats));
        assert!(pipeline.apply(&raw(1, "x", "y", "03/05/2021").view(), &sp(), &mut stats));
        assert!(!pipeline.apply(&raw(1, "x", "y", "2022-05-03").view(), &sp(), &mut stats));
        // Undated: falls back to reference year + 2 = 2027
        assert!(!pipeline.apply(&raw(1, "x", "y", "").view(), &sp(), &mut stats));
        assert_eq!(stats.after_fiscal_year, 2);
    }

    #[test]
    fn test_truncated_reasons() {
        let mut stats = IngestionStats::default();
        stats.stop_reason = StopReason::ShortPage;
        assert!(!stats.truncated());
        stats.stop_reason = StopReason::PageCap;
        assert!(stats.truncated());
    }
}
