// =============================================================================
// config.rs - EVERY KNOB IN ONE PLACE
// =============================================================================
//
// Everything has a default and everything can be overridden with a
// PRECATORIO_-prefixed environment variable (or a .env file). A value that
// doesn't parse falls back to its default instead of stopping the run.
//
// The flat `Config` is projected into what each part actually needs:
// `api_settings()`, `portal_settings()` and `search_criteria()`.
// =============================================================================

use std::env;
use std::str::FromStr;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::warn;

use crate::circuit_breaker::BreakerSettings;
use crate::models::{DateRange, SearchCriteria, Source};
use crate::normalize::parse_amount;
use crate::pipeline::RunLimits;
use crate::retry::BackoffPolicy;
use crate::scanners::{ApiSettings, CandidateSettings, PortalSettings};

/// Default date window for the API query when none is configured.
const DEFAULT_WINDOW_DAYS: i64 = 365;

#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // UPSTREAMS
    // =========================================================================
    /// Official search endpoint. Takes dataInicio/dataFim/pagina/tamanhoPagina.
    pub api_search_url: String,

    /// Public API key, sent as `Authorization: APIKey <key>`.
    pub api_key: Option<String>,

    /// Portal process page, with `{numero}` where the CNJ number goes.
    pub portal_detail_url: String,

    pub user_agent: String,
    pub http_timeout: Duration,

    // =========================================================================
    // OFFICIAL API
    // =========================================================================
    pub api_page_size: u32,
    pub api_max_pages: u32,
    pub api_retry_attempts: u32,
    pub api_retry_base_delay: Duration,

    // =========================================================================
    // PORTAL
    // The portal blocks aggressive clients. Pacing is not optional.
    // =========================================================================
    pub portal_retry_attempts: u32,
    pub portal_retry_base_delay: Duration,
    pub portal_pacing_delay: Duration,
    pub portal_probe_cap: usize,
    pub portal_target_accepted: usize,
    pub portal_min_body_len: usize,

    /// Segment and tribunal every candidate is built for ("8.26" is TJ-SP).
    pub candidate_segment: u8,
    pub candidate_tribunal: u8,
    pub candidate_origins: Vec<u16>,
    pub candidate_sequence_min: u32,
    pub candidate_sequence_max: u32,
    pub candidate_seed: u64,

    // =========================================================================
    // CIRCUIT BREAKER (portal)
    // =========================================================================
    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_reset_timeout: Duration,
    pub circuit_breaker_success_threshold: u32,

    // =========================================================================
    // RUN CAPS
    // =========================================================================
    pub max_accepted: usize,
    /// Whole-run time budget. None means no deadline.
    pub run_deadline: Option<Duration>,
    /// Pins the year used for undated fiscal years and candidate synthesis.
    pub reference_year: Option<i32>,

    // =========================================================================
    // SEARCH CRITERIA
    // =========================================================================
    pub criteria_tribunal: Option<String>,
    pub criteria_value_min: Option<Decimal>,
    pub criteria_value_max: Option<Decimal>,
    pub criteria_nature: Option<String>,
    pub criteria_fiscal_year: Option<i32>,
    pub criteria_date_start: Option<NaiveDate>,
    pub criteria_date_end: Option<NaiveDate>,

    /// Which upstreams the binary runs.
    pub sources: Vec<Source>,
}

impl Config {
    /// Load from the process environment, after a `.env` file if one exists.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from any key lookup. `from_env` uses the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let secs = |key: &str, default| Duration::from_secs(setting(&get, key, default));
        let date = |key: &str| {
            get(key).and_then(|value| match NaiveDate::parse_from_str(&value, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    warn!(key = key, value = value.as_str(), "Ignoring unparseable date");
                    None
                }
            })
        };

        Config {
            api_search_url: get("PRECATORIO_API_URL").unwrap_or_else(|| {
                "https://api-publica.datajud.cnj.jus.br/api_publica_tjsp/_search".to_string()
            }),
            api_key: get("PRECATORIO_API_KEY"),
            portal_detail_url: get("PRECATORIO_PORTAL_URL").unwrap_or_else(|| {
                "https://esaj.tjsp.jus.br/cpopg/search.do?cbPesquisa=NUMPROC\
                 &dadosConsulta.tipoNuProcesso=UNIFICADO&processo.numero={numero}"
                    .to_string()
            }),
            user_agent: get("PRECATORIO_USER_AGENT")
                .unwrap_or_else(|| format!("precatorio-ingest/{}", env!("CARGO_PKG_VERSION"))),
            http_timeout: secs("PRECATORIO_HTTP_TIMEOUT_SECS", 20),

            api_page_size: setting(&get, "PRECATORIO_API_PAGE_SIZE", 100),
            api_max_pages: setting(&get, "PRECATORIO_API_MAX_PAGES", 20),
            api_retry_attempts: setting(&get, "PRECATORIO_API_RETRY_ATTEMPTS", 3),
            api_retry_base_delay: secs("PRECATORIO_API_RETRY_BASE_SECS", 1),

            portal_retry_attempts: setting(&get, "PRECATORIO_PORTAL_RETRY_ATTEMPTS", 2),
            portal_retry_base_delay: secs("PRECATORIO_PORTAL_RETRY_BASE_SECS", 5),
            portal_pacing_delay: secs("PRECATORIO_PORTAL_PACING_SECS", 3),
            portal_probe_cap: setting(&get, "PRECATORIO_PORTAL_PROBE_CAP", 60),
            portal_target_accepted: setting(&get, "PRECATORIO_PORTAL_TARGET", 25),
            portal_min_body_len: setting(&get, "PRECATORIO_PORTAL_MIN_BODY_BYTES", 400),

            candidate_segment: setting(&get, "PRECATORIO_CANDIDATE_SEGMENT", 8),
            candidate_tribunal: setting(&get, "PRECATORIO_CANDIDATE_TRIBUNAL", 26),
            candidate_origins: get("PRECATORIO_CANDIDATE_ORIGINS")
                .map(|list| parse_list(&list))
                .filter(|origins: &Vec<u16>| !origins.is_empty())
                .unwrap_or_else(|| vec![53, 100, 114, 224, 405, 506, 562, 577]),
            candidate_sequence_min: setting(&get, "PRECATORIO_CANDIDATE_SEQ_MIN", 1),
            candidate_sequence_max: setting(&get, "PRECATORIO_CANDIDATE_SEQ_MAX", 3_000_000),
            candidate_seed: setting(&get, "PRECATORIO_CANDIDATE_SEED", 0x5EED),

            circuit_breaker_failure_threshold: setting(&get, "PRECATORIO_CB_FAILURE_THRESHOLD", 5),
            circuit_breaker_reset_timeout: secs("PRECATORIO_CB_RESET_TIMEOUT_SECS", 60),
            circuit_breaker_success_threshold: setting(&get, "PRECATORIO_CB_SUCCESS_THRESHOLD", 1),

            max_accepted: setting(&get, "PRECATORIO_MAX_ACCEPTED", 200),
            run_deadline: get("PRECATORIO_RUN_DEADLINE_SECS")
                .and_then(|value| value.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            reference_year: get("PRECATORIO_REFERENCE_YEAR").and_then(|value| value.parse().ok()),

            criteria_tribunal: get("PRECATORIO_TRIBUNAL"),
            criteria_value_min: get("PRECATORIO_VALOR_MIN").and_then(|value| parse_amount(&value)),
            criteria_value_max: get("PRECATORIO_VALOR_MAX").and_then(|value| parse_amount(&value)),
            criteria_nature: get("PRECATORIO_NATUREZA"),
            criteria_fiscal_year: get("PRECATORIO_ANO_LOA").and_then(|value| value.parse().ok()),
            criteria_date_start: date("PRECATORIO_DATA_INICIO"),
            criteria_date_end: date("PRECATORIO_DATA_FIM"),

            sources: get("PRECATORIO_SOURCES")
                .map(|list| parse_sources(&list))
                .filter(|sources| !sources.is_empty())
                .unwrap_or_else(|| vec![Source::OfficialApi, Source::PortalScraper]),
        }
    }

    /// The configured reference year, or the current calendar year.
    pub fn reference_year(&self) -> i32 {
        self.reference_year.unwrap_or_else(|| Utc::now().year())
    }

    pub fn run_limits(&self) -> RunLimits {
        RunLimits {
            max_accepted: self.max_accepted,
            deadline: self.run_deadline,
            reference_year: self.reference_year(),
        }
    }

    pub fn api_settings(&self) -> ApiSettings {
        ApiSettings {
            search_url: self.api_search_url.clone(),
            api_key: self.api_key.clone(),
            page_size: self.api_page_size,
            max_pages: self.api_max_pages,
            limits: self.run_limits(),
            policy: BackoffPolicy::linear(self.api_retry_base_delay, self.api_retry_attempts),
        }
    }

    pub fn portal_settings(&self) -> PortalSettings {
        PortalSettings {
            detail_url_template: self.portal_detail_url.clone(),
            candidates: CandidateSettings {
                segment: self.candidate_segment,
                tribunal: self.candidate_tribunal,
                origins: self.candidate_origins.clone(),
                sequence_min: self.candidate_sequence_min,
                sequence_max: self.candidate_sequence_max,
                seed: self.candidate_seed,
            },
            target_accepted: self.portal_target_accepted,
            probe_cap: self.portal_probe_cap,
            pacing_delay: self.portal_pacing_delay,
            min_body_len: self.portal_min_body_len,
            limits: self.run_limits(),
            policy: BackoffPolicy::linear(self.portal_retry_base_delay, self.portal_retry_attempts),
            breaker: BreakerSettings {
                failure_threshold: self.circuit_breaker_failure_threshold,
                reset_timeout: self.circuit_breaker_reset_timeout,
                success_threshold: self.circuit_breaker_success_threshold,
            },
        }
    }

    /// Criteria for a run starting `today`. A missing bound of the date
    /// window is filled in from the default window ending today.
    pub fn search_criteria_for(&self, today: NaiveDate) -> SearchCriteria {
        let end = self.criteria_date_end.unwrap_or(today);
        let start = self
            .criteria_date_start
            .unwrap_or_else(|| end - chrono::Duration::days(DEFAULT_WINDOW_DAYS));

        if let (Some(min), Some(max)) = (self.criteria_value_min, self.criteria_value_max) {
            if min > max {
                warn!(min = %min, max = %max, "Value range is empty, every record will be rejected");
            }
        }

        SearchCriteria {
            tribunal: self.criteria_tribunal.clone(),
            value_min: self.criteria_value_min,
            value_max: self.criteria_value_max,
            nature: self.criteria_nature.clone(),
            fiscal_year: self.criteria_fiscal_year,
            date_range: Some(DateRange { start, end }),
        }
    }

    pub fn search_criteria(&self) -> SearchCriteria {
        self.search_criteria_for(Utc::now().date_naive())
    }
}

fn setting<T, G>(get: &G, key: &str, default: T) -> T
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key = key, value = raw.as_str(), "Ignoring unparseable setting, using default");
            default
        }),
        None => default,
    }
}

fn parse_list<T: FromStr>(list: &str) -> Vec<T> {
    list.split(',')
        .filter_map(|item| item.trim().parse().ok())
        .collect()
}

fn parse_sources(list: &str) -> Vec<Source> {
    let mut sources = Vec::new();
    for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let source = match name.to_ascii_lowercase().as_str() {
            "api" | "official_api" => Source::OfficialApi,
            "portal" | "scraper" | "portal_scraper" => Source::PortalScraper,
            other => {
                warn!(source = other, "Unknown source, skipping");
                continue;
            }
        };
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
    sources
}
