// =============================================================================
// official_api_scanner.rs - THE PAGINATED JSON FIREHOSE
// =============================================================================
//
// The official search API takes a date window and a page cursor and hands
// back up to `tamanhoPagina` processes per page. It is the good upstream:
// real JSON, real pagination. It is also the upstream that has renamed its
// keys at least three times, so every field is looked up through a list of
// candidate keys and every entry array through a list of candidate roots.
//
// Pagination stops on the first of:
//   - an empty page
//   - a short page (fewer entries than the page size, i.e. the last one)
//   - the accepted-record cap
//   - the page cap
//   - a page that still fails after retries (partial results are kept)
//   - the run deadline
// =============================================================================

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::fetch::{FetchClient, FetchError, FetchRequest, Transport};
use crate::filters::StopReason;
use crate::models::{ApiEntry, DateRange, RawProcess, SearchCriteria, SearchOutcome, Source};
use crate::normalize::parse_amount;
use crate::pipeline::{RunContext, RunLimits};
use crate::retry::BackoffPolicy;
use crate::tribunal::IdentifierDecoder;

/// Top-level keys the entry array has been seen under.
const ENTRY_ROOTS: &[&str] = &["processos", "resultados", "content", "items", "data"];

const NUMBER_KEYS: &[&str] = &["numeroProcesso", "numero", "numeroUnico"];
const CLASS_KEYS: &[&str] = &["classe", "classeProcessual"];
const SUBJECT_KEYS: &[&str] = &["assuntos", "assunto"];
const CLAIMANT_KEYS: &[&str] = &["poloAtivo", "requerente", "credor"];
const AMOUNT_KEYS: &[&str] = &["valorCausa", "valor", "valorAcao"];
const FILED_KEYS: &[&str] = &["dataAjuizamento", "dataDistribuicao", "dataAutuacao"];
const MOVEMENT_LIST_KEYS: &[&str] = &["movimentos", "movimentacoes"];
const LAST_MOVEMENT_KEYS: &[&str] = &["ultimaMovimentacao", "ultimoMovimento"];

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub search_url: String,
    /// Sent as `Authorization: APIKey <key>` when present.
    pub api_key: Option<String>,
    pub page_size: u32,
    pub max_pages: u32,
    pub limits: RunLimits,
    pub policy: BackoffPolicy,
}

pub struct OfficialApiScanner<T> {
    client: FetchClient<T>,
    decoder: Arc<IdentifierDecoder>,
    settings: ApiSettings,
}

impl<T: Transport> OfficialApiScanner<T> {
    pub fn new(transport: Arc<T>, decoder: Arc<IdentifierDecoder>, settings: ApiSettings) -> Self {
        Self {
            client: FetchClient::new(transport, settings.policy),
            decoder,
            settings,
        }
    }

    /// Page through the API for `criteria.date_range`, filtering and
    /// normalizing as we go. Never fails; problems show up in the stats.
    pub async fn search(&self, criteria: &SearchCriteria) -> SearchOutcome {
        let mut run = RunContext::new(Source::OfficialApi, criteria, &self.decoder, self.settings.limits);

        let Some(range) = criteria.date_range else {
            warn!("Official API search needs a date range, none given");
            return run.finish(StopReason::MissingDateRange);
        };

        info!(
            start = %range.start,
            end = %range.end,
            filters = ?run.stats.active_filters,
            "Official API search starting"
        );

        let stop_reason = self.paginate(&mut run, range).await;
        let outcome = run.finish(stop_reason);

        info!(
            pages = outcome.stats.pages_fetched,
            seen = outcome.stats.total_seen,
            accepted = outcome.stats.accepted,
            stop_reason = ?outcome.stats.stop_reason,
            elapsed_ms = outcome.stats.elapsed_ms,
            "Official API search finished"
        );
        outcome
    }

    async fn paginate(&self, run: &mut RunContext<'_>, range: DateRange) -> StopReason {
        let page_size = self.settings.page_size.max(1) as usize;

        for page in 0..self.settings.max_pages {
            if run.is_full() {
                return StopReason::AcceptedCap;
            }
            if run.deadline_passed() {
                return StopReason::Deadline;
            }

            let request = self.page_request(range, page);
            let ApiPage { entries, received } = match self.fetch_page(&request).await {
                Ok(parsed) => parsed,
                Err(error) => {
                    run.stats.fetch_failures += 1;
                    warn!(page = page, error = %error, "Page fetch failed, stopping with partial results");
                    return StopReason::FetchFailed;
                }
            };
            run.stats.pages_fetched += 1;
            let skipped = (received - entries.len()) as u64;
            run.stats.total_seen += skipped;
            run.stats.skipped_entries += skipped;
            debug!(page = page, received = received, skipped = skipped, "Page received");

            if received == 0 {
                return StopReason::Exhausted;
            }

            for entry in entries {
                run.offer(RawProcess::Api(entry));
                if run.is_full() {
                    return StopReason::AcceptedCap;
                }
            }

            if received < page_size {
                return StopReason::ShortPage;
            }
        }

        StopReason::PageCap
    }

    fn page_request(&self, range: DateRange, page: u32) -> FetchRequest {
        let request = FetchRequest::get(&self.settings.search_url)
            .query("dataInicio", range.start.format("%Y-%m-%d"))
            .query("dataFim", range.end.format("%Y-%m-%d"))
            .query("pagina", page)
            .query("tamanhoPagina", self.settings.page_size)
            .header("Accept", "application/json");

        match &self.settings.api_key {
            Some(key) => request.header("Authorization", format!("APIKey {}", key)),
            None => request,
        }
    }

    async fn fetch_page(&self, request: &FetchRequest) -> Result<ApiPage, FetchError> {
        let response = self.client.fetch(request).await?;
        parse_page(&response.body)
    }
}

/// One page as the upstream sent it. `received` counts every array item,
/// including the ones that weren't objects and never became entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiPage {
    pub entries: Vec<ApiEntry>,
    pub received: usize,
}

/// Pull the entry array out of a page body, wherever it lives.
pub fn parse_page(body: &str) -> Result<ApiPage, FetchError> {
    let root: Value =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;

    let items = entry_array(&root)
        .ok_or_else(|| FetchError::Malformed("no entry array in page".to_string()))?;

    let entries = items
        .iter()
        .filter_map(|item| match item {
            Value::Object(_) => Some(api_entry(item)),
            other => {
                debug!(kind = json_kind(other), "Skipping non-object entry");
                None
            }
        })
        .collect();

    Ok(ApiPage {
        entries,
        received: items.len(),
    })
}

fn entry_array(root: &Value) -> Option<Vec<Value>> {
    if let Value::Array(items) = root {
        return Some(items.clone());
    }

    if let Some(items) = ENTRY_ROOTS
        .iter()
        .find_map(|key| root.get(key).and_then(Value::as_array))
    {
        return Some(items.clone());
    }

    // Search-engine style: hits.hits[]._source
    root.get("hits")
        .and_then(|hits| hits.get("hits"))
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .map(|hit| hit.get("_source").unwrap_or(hit).clone())
                .collect()
        })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn first_present<'v>(entry: &'v Value, keys: &[&str]) -> Option<&'v Value> {
    keys.iter()
        .filter_map(|key| entry.get(key))
        .find(|value| !value.is_null())
}

/// Display text for a value: strings as-is, numbers printed, `{nome: ..}`
/// objects by name, arrays joined with "; ".
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(_) => value.get("nome").and_then(text_of),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(text_of).collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        Value::Null | Value::Bool(_) => None,
    }
}

fn amount_of(value: &Value) -> Option<Decimal> {
    let amount = match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        Value::String(s) => parse_amount(s),
        _ => None,
    };
    amount.filter(|a| !a.is_sign_negative())
}

/// Most recent movement: the one with the greatest `dataHora`, or the last
/// one listed when no dates are given.
fn last_movement_of(entry: &Value) -> Option<String> {
    let from_list = first_present(entry, MOVEMENT_LIST_KEYS)
        .and_then(Value::as_array)
        .and_then(|movements| {
            movements
                .iter()
                .enumerate()
                .max_by_key(|&(index, movement)| {
                    let when = movement
                        .get("dataHora")
                        .and_then(Value::as_str)
                        .unwrap_or("");
                    (when, index)
                })
                .and_then(|(_, movement)| text_of(movement))
        });

    from_list.or_else(|| first_present(entry, LAST_MOVEMENT_KEYS).and_then(text_of))
}

fn api_entry(entry: &Value) -> ApiEntry {
    ApiEntry {
        number: first_present(entry, NUMBER_KEYS).and_then(text_of),
        class_name: first_present(entry, CLASS_KEYS).and_then(text_of),
        subject: first_present(entry, SUBJECT_KEYS).and_then(text_of),
        claimant: first_present(entry, CLAIMANT_KEYS).and_then(text_of),
        amount: first_present(entry, AMOUNT_KEYS).and_then(amount_of),
        filing_date: first_present(entry, FILED_KEYS).and_then(text_of),
        last_movement: last_movement_of(entry),
    }
}
