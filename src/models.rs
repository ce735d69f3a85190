// =============================================================================
// models.rs - THE SHAPES THAT FLOW THROUGH THE PIPELINE
// =============================================================================
//
// Two upstreams, two raw shapes, one canonical record.
//
// The official API speaks JSON with a rotating cast of key names. The portal
// speaks HTML that was last redesigned by someone who hated stable ids. Both
// get pinned down here into `ApiEntry` and `PortalEntry`, and both end up as
// a `ProcessRecord` once the normalizer is done with them.
//
// Search criteria, the per-run result bundle and the tribunal code also live
// here, because everything else imports them.
// =============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::filters::IngestionStats;

/// Sentinel written into `ProcessRecord::tribunal_code` when the identifier
/// could not be decoded.
pub const UNRESOLVED_TRIBUNAL: &str = "UNRESOLVED";

/// Where a record came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Source {
    /// The official paginated JSON search API.
    OfficialApi,
    /// The court portal, probed one process page at a time.
    PortalScraper,
}

impl Source {
    /// Provenance label stamped on every canonical record.
    pub fn label(&self) -> &'static str {
        match self {
            Source::OfficialApi => "OFFICIAL_API",
            Source::PortalScraper => "PORTAL_SCRAPER",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of decoding a CNJ process number.
///
/// `Unresolved` is a perfectly valid outcome. It means "we don't know which
/// court this is", and the record keeps moving through the pipeline. Only an
/// explicit tribunal filter will drop it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TribunalCode {
    Resolved(String),
    Unresolved,
}

impl TribunalCode {
    pub fn as_str(&self) -> &str {
        match self {
            TribunalCode::Resolved(code) => code,
            TribunalCode::Unresolved => UNRESOLVED_TRIBUNAL,
        }
    }

    /// Equality against a requested tribunal. `Unresolved` never matches,
    /// not even a request for the sentinel string itself.
    pub fn matches(&self, wanted: &str) -> bool {
        match self {
            TribunalCode::Resolved(code) => code.eq_ignore_ascii_case(wanted.trim()),
            TribunalCode::Unresolved => false,
        }
    }
}

impl fmt::Display for TribunalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status, derived from the latest movement text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ProcessStatus {
    /// Nothing in the movements told us otherwise.
    #[default]
    EarlyReview,
    Pending,
    Approved,
    Archived,
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStatus::EarlyReview => write!(f, "Early Review"),
            ProcessStatus::Pending => write!(f, "Pending"),
            ProcessStatus::Approved => write!(f, "Approved"),
            ProcessStatus::Archived => write!(f, "Archived"),
        }
    }
}

/// Nature of the credit, derived from class/subject text.
///
/// Alimentary credits (salaries, pensions, benefits) jump the payment queue,
/// which is why anyone buying these cares so much about the distinction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum NatureCategory {
    Alimentary,
    Tax,
    SocialSecurity,
    Labor,
    #[default]
    General,
}

impl fmt::Display for NatureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NatureCategory::Alimentary => write!(f, "Alimentary"),
            NatureCategory::Tax => write!(f, "Tax"),
            NatureCategory::SocialSecurity => write!(f, "Social Security"),
            NatureCategory::Labor => write!(f, "Labor"),
            NatureCategory::General => write!(f, "General"),
        }
    }
}

/// The canonical output unit. Created once per surviving raw entry and never
/// touched again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    /// Process number exactly as the source gave it. Opaque key.
    pub number: String,
    /// Resolved court code, or `UNRESOLVED`.
    pub tribunal_code: String,
    /// Best-effort claimant name.
    pub claimant: String,
    /// Non-negative amount. Zero when the source had nothing.
    pub amount: Decimal,
    pub status: ProcessStatus,
    pub nature_category: NatureCategory,
    /// Budget year in which payment is expected (filing year + 2).
    pub fiscal_year: i32,
    /// Filing date in the source's display form.
    pub filing_date: Option<String>,
    pub source_label: String,
    pub class_name: Option<String>,
    pub subject: Option<String>,
    pub last_movement: Option<String>,
    /// True when at least one field was synthesized instead of extracted.
    pub low_confidence: bool,
    /// Which fields were synthesized. Empty for genuine extractions.
    pub synthesized_fields: Vec<String>,
}

/// One entry from the official API, after key-fallback extraction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiEntry {
    pub number: Option<String>,
    pub class_name: Option<String>,
    pub subject: Option<String>,
    pub claimant: Option<String>,
    pub amount: Option<Decimal>,
    pub filing_date: Option<String>,
    pub last_movement: Option<String>,
}

/// One process page scraped from the portal.
///
/// Unlike `ApiEntry`, the number is always known (we probed it) and the
/// amount is always present, possibly synthesized. `synthesized` names every
/// field that came from a fallback default rather than the page.
#[derive(Debug, Clone, PartialEq)]
pub struct PortalEntry {
    pub number: String,
    pub class_name: String,
    pub subject: String,
    pub claimant: Option<String>,
    pub amount: Decimal,
    pub filing_date: Option<String>,
    pub last_movement: Option<String>,
    pub synthesized: Vec<&'static str>,
}

/// A raw record from either adapter, before filtering and normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawProcess {
    Api(ApiEntry),
    Portal(PortalEntry),
}

/// Borrowed, source-independent view over a raw record. Filters and the
/// normalizer read through this so they never care which adapter produced it.
#[derive(Debug, Clone, Copy)]
pub struct RawView<'a> {
    pub number: &'a str,
    pub class_name: Option<&'a str>,
    pub subject: Option<&'a str>,
    pub claimant: Option<&'a str>,
    pub amount: Option<Decimal>,
    pub filing_date: Option<&'a str>,
    pub last_movement: Option<&'a str>,
    pub synthesized: &'a [&'static str],
}

impl RawProcess {
    pub fn view(&self) -> RawView<'_> {
        match self {
            RawProcess::Api(entry) => RawView {
                number: entry.number.as_deref().unwrap_or(""),
                class_name: entry.class_name.as_deref(),
                subject: entry.subject.as_deref(),
                claimant: entry.claimant.as_deref(),
                amount: entry.amount,
                filing_date: entry.filing_date.as_deref(),
                last_movement: entry.last_movement.as_deref(),
                synthesized: &[],
            },
            RawProcess::Portal(entry) => RawView {
                number: &entry.number,
                class_name: Some(&entry.class_name),
                subject: Some(&entry.subject),
                claimant: entry.claimant.as_deref(),
                amount: Some(entry.amount),
                filing_date: entry.filing_date.as_deref(),
                last_movement: entry.last_movement.as_deref(),
                synthesized: &entry.synthesized,
            },
        }
    }

    pub fn number(&self) -> &str {
        self.view().number
    }
}

/// Inclusive date window for the upstream API query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Everything one ingestion run filters on. Immutable for the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub tribunal: Option<String>,
    pub value_min: Option<Decimal>,
    pub value_max: Option<Decimal>,
    /// Case-insensitive substring matched against class and subject.
    pub nature: Option<String>,
    pub fiscal_year: Option<i32>,
    /// Required by the official API adapter; ignored by the portal.
    pub date_range: Option<DateRange>,
}

impl SearchCriteria {
    /// Human-readable list of the filters this criteria activates, in
    /// pipeline order.
    pub fn active_filters(&self) -> Vec<String> {
        let mut active = Vec::new();
        if let Some(tribunal) = &self.tribunal {
            active.push(format!("tribunal={}", tribunal));
        }
        if let Some(min) = self.value_min {
            active.push(format!("valor>={}", min));
        }
        if let Some(max) = self.value_max {
            active.push(format!("valor<={}", max));
        }
        if let Some(nature) = &self.nature {
            active.push(format!("natureza~{}", nature));
        }
        if let Some(year) = self.fiscal_year {
            active.push(format!("anoLoa={}", year));
        }
        active
    }
}

/// What a source adapter hands back: accumulated records plus the stats that
/// explain how they got there.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub records: Vec<ProcessRecord>,
    pub stats: IngestionStats,
}

/// What the orchestrator hands downstream. Persistence, dedup against storage
/// and notifications are the receiver's problem.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionBundle {
    pub run_id: Uuid,
    pub source: Source,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub records: Vec<ProcessRecord>,
    pub stats: IngestionStats,
}
