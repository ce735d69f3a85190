// =============================================================================
// portal_scanner.rs - KNOCKING ON ONE DOOR AT A TIME
// =============================================================================
//
// The court portal has no search we can use. It will show any single process
// if you already know its number, so we make up numbers. Candidates are
// built from a pool of busy originating courts, a sequence range and the
// last five years, with a real CNJ check value so the portal doesn't reject
// them on syntax alone. Most of them don't exist. That's fine: a missing
// process is just absent, not a failure.
//
// The portal blocks anything that looks automated, so every probe is
// followed by a fixed pacing delay, whatever happened. Probes are strictly
// sequential. When the portal starts failing anyway, a per-run circuit
// breaker makes us sit out a cooldown before trying again.
//
// Page fields are read through ordered extraction strategies. When every
// strategy misses we fall back to a default, and the record says so in
// `synthesized_fields`.
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::circuit_breaker::{BreakerSettings, CircuitBreaker};
use crate::cnj::{format_number, CnjParts};
use crate::fetch::{FetchClient, FetchError, FetchRequest, Transport};
use crate::filters::StopReason;
use crate::html::{first_non_empty, Document, Strategy};
use crate::keywords::{contains_any, fold};
use crate::models::{PortalEntry, RawProcess, SearchCriteria, SearchOutcome, Source};
use crate::normalize::parse_amount;
use crate::pipeline::{RunContext, RunLimits};
use crate::retry::BackoffPolicy;
use crate::tribunal::IdentifierDecoder;

/// Class used when the page doesn't show one. Everything we probe is a
/// precatório request, so this is rarely wrong.
pub const DEFAULT_CLASS: &str = "Precatório";
pub const DEFAULT_SUBJECT: &str = "Não informado";

/// Synthesized amounts fall in this range, in centavos.
const SYNTH_AMOUNT_MIN_CENTS: u64 = 1_500_000;
const SYNTH_AMOUNT_MAX_CENTS: u64 = 50_000_000;

/// Candidate years go back this many years from the reference year.
const CANDIDATE_YEARS: u64 = 5;

/// Accent-folded phrases the portal shows instead of a process.
const NOT_FOUND_MARKERS: &[&str] = &[
    "nao existem informacoes disponiveis",
    "processo nao encontrado",
    "nenhum processo encontrado",
    "nao foi possivel localizar",
    "dados nao encontrados",
];

const CLASS_STRATEGIES: &[Strategy] = &[
    Strategy::ById("classeProcesso"),
    Strategy::AfterLabel("Classe"),
    Strategy::TableCell("Classe"),
];

const SUBJECT_STRATEGIES: &[Strategy] = &[
    Strategy::ById("assuntoProcesso"),
    Strategy::AfterLabel("Assunto"),
    Strategy::TableCell("Assunto"),
];

const CLAIMANT_STRATEGIES: &[Strategy] = &[
    Strategy::FirstRowCell { table_id: "tablePartesPrincipais", column: 1 },
    Strategy::AfterLabel("Reqte"),
    Strategy::AfterLabel("Requerente"),
    Strategy::AfterLabel("Credor"),
];

const AMOUNT_STRATEGIES: &[Strategy] = &[
    Strategy::ById("valorAcaoProcesso"),
    Strategy::AfterLabel("Valor da ação"),
    Strategy::TableCell("Valor da ação"),
    Strategy::AfterLabel("Valor"),
];

const FILED_STRATEGIES: &[Strategy] = &[
    Strategy::ById("dataHoraDistribuicaoProcesso"),
    Strategy::AfterLabel("Distribuição"),
    Strategy::TableCell("Distribuição"),
];

const MOVEMENT_STRATEGIES: &[Strategy] = &[
    Strategy::FirstRowCell { table_id: "tabelaUltimasMovimentacoes", column: 1 },
    Strategy::FirstRowCell { table_id: "tabelaTodasMovimentacoes", column: 1 },
    Strategy::AfterLabel("Última movimentação"),
];

/// How candidate numbers are put together.
#[derive(Debug, Clone)]
pub struct CandidateSettings {
    pub segment: u8,
    pub tribunal: u8,
    /// Originating courts to draw from. Busy ones have more processes.
    pub origins: Vec<u16>,
    pub sequence_min: u32,
    pub sequence_max: u32,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct PortalSettings {
    /// Detail page URL with a `{numero}` placeholder.
    pub detail_url_template: String,
    pub candidates: CandidateSettings,
    pub target_accepted: usize,
    pub probe_cap: usize,
    pub pacing_delay: Duration,
    /// Bodies shorter than this are error stubs, not process pages.
    pub min_body_len: usize,
    pub limits: RunLimits,
    pub policy: BackoffPolicy,
    pub breaker: BreakerSettings,
}

/// Seeded SplitMix64. Same seed, same candidates.
struct SplitMix64(u64);

impl SplitMix64 {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    fn below(&mut self, bound: u64) -> u64 {
        self.next_u64() % bound.max(1)
    }
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, &byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Placeholder amount for a page that showed none. Derived from the number,
/// so the same page always gets the same value.
pub fn synthesized_amount(number: &str) -> Decimal {
    let span = SYNTH_AMOUNT_MAX_CENTS - SYNTH_AMOUNT_MIN_CENTS + 1;
    let cents = SYNTH_AMOUNT_MIN_CENTS + fnv1a64(number.as_bytes()) % span;
    Decimal::new(cents as i64, 2)
}

/// Up to `size` distinct candidate numbers, in probe order.
pub fn candidate_pool(settings: &CandidateSettings, reference_year: i32, size: usize) -> Vec<String> {
    if settings.origins.is_empty() || size == 0 {
        return Vec::new();
    }

    let low = settings.sequence_min.min(settings.sequence_max);
    let high = settings.sequence_max.max(settings.sequence_min).min(9_999_999);
    let sequences = u64::from(high.saturating_sub(low)) + 1;

    let mut rng = SplitMix64(settings.seed ^ reference_year as u64);
    let mut seen = HashSet::with_capacity(size);
    let mut pool = Vec::with_capacity(size);

    // The space can be smaller than `size`; stop drawing eventually.
    let max_draws = size.saturating_mul(20).max(64);
    for _ in 0..max_draws {
        if pool.len() >= size {
            break;
        }
        let parts = CnjParts {
            sequence: low + rng.below(sequences) as u32,
            year: (reference_year - rng.below(CANDIDATE_YEARS) as i32) as u16,
            segment: settings.segment,
            tribunal: settings.tribunal,
            origin: settings.origins[rng.below(settings.origins.len() as u64) as usize],
        };
        let number = format_number(&parts);
        if seen.insert(number.clone()) {
            pool.push(number);
        }
    }
    pool
}

/// Party names come with their lawyers attached: "Maria Advogado: Fulano".
fn claimant_name(text: String) -> String {
    match text.to_ascii_lowercase().find("advogad") {
        Some(cut) => Some(text[..cut].trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or(text),
        None => text,
    }
}

/// Read a process page. `None` when the page says there's no such process.
pub fn extract_entry(number: &str, body: &str, min_body_len: usize) -> Option<PortalEntry> {
    if body.len() < min_body_len {
        return None;
    }
    if contains_any(&fold(body), NOT_FOUND_MARKERS) {
        return None;
    }

    let doc = Document::parse(body);
    let mut synthesized = Vec::new();

    let class_name = first_non_empty(&doc, CLASS_STRATEGIES).unwrap_or_else(|| {
        synthesized.push("class_name");
        DEFAULT_CLASS.to_string()
    });
    let subject = first_non_empty(&doc, SUBJECT_STRATEGIES).unwrap_or_else(|| {
        synthesized.push("subject");
        DEFAULT_SUBJECT.to_string()
    });
    let amount = first_non_empty(&doc, AMOUNT_STRATEGIES)
        .and_then(|text| parse_amount(&text))
        .unwrap_or_else(|| {
            synthesized.push("amount");
            synthesized_amount(number)
        });

    Some(PortalEntry {
        number: number.to_string(),
        class_name,
        subject,
        claimant: first_non_empty(&doc, CLAIMANT_STRATEGIES).map(claimant_name),
        amount,
        filing_date: first_non_empty(&doc, FILED_STRATEGIES),
        last_movement: first_non_empty(&doc, MOVEMENT_STRATEGIES),
        synthesized,
    })
}

enum Probe {
    Found(PortalEntry),
    NotFound,
}

pub struct PortalScanner<T> {
    client: FetchClient<T>,
    decoder: Arc<IdentifierDecoder>,
    settings: PortalSettings,
}

impl<T: Transport> PortalScanner<T> {
    pub fn new(transport: Arc<T>, decoder: Arc<IdentifierDecoder>, settings: PortalSettings) -> Self {
        // Retries are requests too, so they wait at least the pacing delay.
        Self {
            client: FetchClient::new(transport, settings.policy.with_min_delay(settings.pacing_delay)),
            decoder,
            settings,
        }
    }

    /// Probe candidates until the target is met, the probe cap is hit, the
    /// pool runs dry or the deadline passes. Date range is ignored; the
    /// portal can't be searched by date.
    pub async fn search(&self, criteria: &SearchCriteria) -> SearchOutcome {
        let limits = RunLimits {
            max_accepted: self.settings.target_accepted.min(self.settings.limits.max_accepted),
            ..self.settings.limits
        };
        let mut run = RunContext::new(Source::PortalScraper, criteria, &self.decoder, limits);
        let candidates = candidate_pool(
            &self.settings.candidates,
            limits.reference_year,
            self.settings.probe_cap,
        );
        let breaker = CircuitBreaker::new("portal", self.settings.breaker);

        info!(
            candidates = candidates.len(),
            target = limits.max_accepted,
            pacing_ms = self.settings.pacing_delay.as_millis() as u64,
            filters = ?run.stats.active_filters,
            "Portal scrape starting"
        );

        let stop_reason = self.probe_all(&mut run, &breaker, &candidates).await;
        let outcome = run.finish(stop_reason);

        info!(
            probes = outcome.stats.probes_attempted,
            not_found = outcome.stats.probes_not_found,
            failures = outcome.stats.fetch_failures,
            accepted = outcome.stats.accepted,
            low_confidence = outcome.stats.low_confidence,
            breaker_trips = breaker.total_trips(),
            stop_reason = ?outcome.stats.stop_reason,
            elapsed_ms = outcome.stats.elapsed_ms,
            "Portal scrape finished"
        );
        outcome
    }

    async fn probe_all(
        &self,
        run: &mut RunContext<'_>,
        breaker: &CircuitBreaker,
        candidates: &[String],
    ) -> StopReason {
        for candidate in candidates {
            if run.is_full() {
                return StopReason::TargetReached;
            }
            if run.stats.probes_attempted >= self.settings.probe_cap as u64 {
                return StopReason::ProbeCap;
            }
            if run.deadline_passed() {
                return StopReason::Deadline;
            }

            while !breaker.allow_request() {
                let mut wait = breaker.cooldown_remaining().unwrap_or(self.settings.pacing_delay);
                if let Some(left) = run.remaining() {
                    if left.is_zero() {
                        return StopReason::Deadline;
                    }
                    wait = wait.min(left);
                }
                warn!(wait_ms = wait.as_millis() as u64, "Portal breaker open, cooling down");
                tokio::time::sleep(wait).await;
            }

            run.stats.probes_attempted += 1;
            match self.probe(candidate).await {
                Ok(Probe::Found(entry)) => {
                    breaker.record_success();
                    debug!(candidate = candidate.as_str(), "Candidate found");
                    run.offer(RawProcess::Portal(entry));
                }
                Ok(Probe::NotFound) => {
                    breaker.record_success();
                    run.stats.probes_not_found += 1;
                    debug!(candidate = candidate.as_str(), "Candidate not found");
                }
                Err(error) => {
                    breaker.record_failure();
                    run.stats.fetch_failures += 1;
                    warn!(candidate = candidate.as_str(), error = %error, "Probe failed, skipping candidate");
                }
            }

            tokio::time::sleep(self.settings.pacing_delay).await;
        }

        if run.is_full() {
            StopReason::TargetReached
        } else if run.stats.probes_attempted >= self.settings.probe_cap as u64 {
            StopReason::ProbeCap
        } else {
            StopReason::CandidatesExhausted
        }
    }

    async fn probe(&self, number: &str) -> Result<Probe, FetchError> {
        let url = self
            .settings
            .detail_url_template
            .replace("{numero}", &urlencoding::encode(number));
        let request = FetchRequest::get(url).header("Accept", "text/html");

        match self.client.fetch(&request).await {
            Ok(response) => Ok(
                match extract_entry(number, &response.body, self.settings.min_body_len) {
                    Some(entry) => Probe::Found(entry),
                    None => Probe::NotFound,
                },
            ),
            Err(error) if error.status() == Some(404) => Ok(Probe::NotFound),
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cnj::has_valid_check_digits;
    use crate::fetch::testing::ScriptedTransport;
    use crate::fetch::HttpResponse;
    use crate::models::ProcessStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    const FULL_PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>Consulta de Processos de 1o Grau</title>
<script>var contexto = "/cpopg"; var habilitaRecaptcha = false;</script></head>
<body>
<div class="unj-entity-header">
  <span id="numeroProcesso">0001234-56.2021.8.26.0053</span>
  <span id="classeProcesso">Precatório</span>
  <span id="assuntoProcesso">Aposentadoria</span>
  <div id="valorAcaoProcesso">R$ 1.234.567,89</div>
  <div id="dataHoraDistribuicaoProcesso">10/02/2021 às 14:03 - Livre</div>
</div>
<table id="tablePartesPrincipais">
  <tr><td><span class="tipoDeParticipacao">Reqte</span></td>
      <td class="nomeParteEAdvogado">Maria da Silva <br/> Advogado: João Souza</td></tr>
</table>
<table id="tabelaUltimasMovimentacoes">
  <tr><td>15/03/2024</td><td>Expedição de Precatório</td></tr>
  <tr><td>01/03/2024</td><td>Conclusos</td></tr>
</table>
</body></html>"#;

    const SPARSE_PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>Consulta de Processos de 1o Grau</title>
<script>var contexto = "/cpopg"; var habilitaRecaptcha = false; var x = 1;</script></head>
<body>
<div class="unj-entity-header">
  <span id="numeroProcesso">0001234-56.2021.8.26.0053</span>
  <table><tr><td><label>Assunto:</label></td><td>Indenização por morte</td></tr></table>
  <p>Distribuição: 05/07/2020</p>
</div>
<div class="rodape">Tribunal de Justiça do Estado de São Paulo. Todos os direitos reservados.</div>
</body></html>"#;

    const NOT_FOUND_PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>Consulta de Processos de 1o Grau</title>
<script>var contexto = "/cpopg"; var habilitaRecaptcha = false; var x = 1;</script></head>
<body><div class="unj-entity-header"></div>
<div id="mensagemRetorno"><li>Não existem informações disponíveis para os parâmetros informados.</li></div>
<div class="rodape">Tribunal de Justiça do Estado de São Paulo. Todos os direitos reservados.</div>
</body></html>"#;

    fn candidates() -> CandidateSettings {
        CandidateSettings {
            segment: 8,
            tribunal: 26,
            origins: vec![53, 100, 114, 224, 577],
            sequence_min: 1,
            sequence_max: 2_000_000,
            seed: 42,
        }
    }

    fn settings(probe_cap: usize, target: usize) -> PortalSettings {
        PortalSettings {
            detail_url_template: "https://portal.test/show.do?processo.numero={numero}".into(),
            candidates: candidates(),
            target_accepted: target,
            probe_cap,
            pacing_delay: Duration::from_secs(3),
            min_body_len: 400,
            limits: RunLimits {
                max_accepted: 200,
                deadline: None,
                reference_year: 2025,
            },
            policy: BackoffPolicy::linear(Duration::from_secs(5), 2),
            breaker: BreakerSettings {
                failure_threshold: 5,
                reset_timeout: Duration::from_secs(60),
                success_threshold: 1,
            },
        }
    }

    fn scanner(transport: &Arc<ScriptedTransport>, settings: PortalSettings) -> PortalScanner<ScriptedTransport> {
        PortalScanner::new(transport.clone(), Arc::new(IdentifierDecoder::default()), settings)
    }

    #[test]
    fn test_fixture_pages_clear_min_length() {
        assert!(FULL_PAGE.len() >= 400);
        assert!(SPARSE_PAGE.len() >= 400);
        assert!(NOT_FOUND_PAGE.len() >= 400);
    }

    #[test]
    fn test_candidate_pool_is_deterministic_and_valid() {
        let first = candidate_pool(&candidates(), 2025, 50);
        let second = candidate_pool(&candidates(), 2025, 50);
        assert_eq!(first, second);
        assert_eq!(first.len(), 50);
        assert_eq!(first.iter().collect::<HashSet<_>>().len(), 50);

        let decoder = IdentifierDecoder::default();
        for number in &first {
            assert!(has_valid_check_digits(number), "{}", number);
            assert_eq!(decoder.resolve(number).as_str(), "TJ-SP");
            let year: i32 = number[11..15].parse().unwrap();
            assert!((2021..=2025).contains(&year));
        }

        let other_seed = CandidateSettings { seed: 7, ..candidates() };
        assert_ne!(candidate_pool(&other_seed, 2025, 50), first);
    }

    #[test]
    fn test_candidate_pool_stops_when_space_is_small() {
        let tiny = CandidateSettings {
            origins: vec![53],
            sequence_min: 10,
            sequence_max: 10,
            ..candidates()
        };
        // One sequence, one origin, five years
        let pool = candidate_pool(&tiny, 2025, 60);
        assert_eq!(pool.len(), 5);
        assert!(candidate_pool(&CandidateSettings { origins: vec![], ..candidates() }, 2025, 10).is_empty());
    }

    #[test]
    fn test_extract_full_page() {
        let entry = extract_entry("0001234-56.2021.8.26.0053", FULL_PAGE, 400).unwrap();
        assert_eq!(entry.class_name, "Precatório");
        assert_eq!(entry.subject, "Aposentadoria");
        assert_eq!(entry.claimant.as_deref(), Some("Maria da Silva"));
        assert_eq!(entry.amount, Decimal::new(123_456_789, 2));
        assert_eq!(entry.filing_date.as_deref(), Some("10/02/2021 às 14:03 - Livre"));
        assert_eq!(entry.last_movement.as_deref(), Some("Expedição de Precatório"));
        assert!(entry.synthesized.is_empty());
    }

    #[test]
    fn test_extract_sparse_page_uses_fallbacks_and_tags_them() {
        let entry = extract_entry("0001234-56.2021.8.26.0053", SPARSE_PAGE, 400).unwrap();
        assert_eq!(entry.subject, "Indenização por morte");
        assert_eq!(entry.filing_date.as_deref(), Some("05/07/2020"));
        assert_eq!(entry.class_name, DEFAULT_CLASS);
        assert_eq!(entry.claimant, None);
        assert_eq!(entry.last_movement, None);
        assert_eq!(entry.synthesized, vec!["class_name", "amount"]);

        let amount = synthesized_amount("0001234-56.2021.8.26.0053");
        assert_eq!(entry.amount, amount);
        assert!(amount >= Decimal::new(15_000, 0) && amount <= Decimal::new(500_000, 0));
        // Same page, same placeholder
        assert_eq!(extract_entry("0001234-56.2021.8.26.0053", SPARSE_PAGE, 400).unwrap(), entry);
    }

    #[test]
    fn test_not_found_pages() {
        assert_eq!(extract_entry("x", NOT_FOUND_PAGE, 400), None);
        assert_eq!(extract_entry("x", "<html>erro</html>", 400), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_applies_after_every_probe() {
        let calls = AtomicUsize::new(0);
        let transport = Arc::new(ScriptedTransport::answering(move |_| {
            match calls.fetch_add(1, Ordering::SeqCst) % 4 {
                0 => Ok(HttpResponse::ok(FULL_PAGE)),
                1 => Ok(HttpResponse::ok(NOT_FOUND_PAGE)),
                2 => Ok(HttpResponse { status: 404, body: String::new() }),
                _ => Ok(HttpResponse { status: 500, body: String::new() }),
            }
        }));

        let started = Instant::now();
        let outcome = scanner(&transport, settings(8, 25)).search(&SearchCriteria::default()).await;

        assert_eq!(outcome.stats.probes_attempted, 8);
        assert!(started.elapsed() >= Duration::from_secs(8 * 3));
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.stats.probes_not_found, 4);
        assert_eq!(outcome.stats.fetch_failures, 2);
        assert_eq!(outcome.stats.stop_reason, StopReason::ProbeCap);
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_are_normalized_with_provenance() {
        let transport = Arc::new(ScriptedTransport::answering(|_| Ok(HttpResponse::ok(SPARSE_PAGE))));
        let outcome = scanner(&transport, settings(3, 25)).search(&SearchCriteria::default()).await;

        assert_eq!(outcome.records.len(), 3);
        let record = &outcome.records[0];
        assert_eq!(record.source_label, "PORTAL_SCRAPER");
        assert_eq!(record.tribunal_code, "TJ-SP");
        assert_eq!(record.fiscal_year, 2022);
        assert_eq!(record.status, ProcessStatus::EarlyReview);
        assert!(record.low_confidence);
        assert_eq!(outcome.stats.low_confidence, 3);
        // Different numbers, different placeholders
        assert_ne!(outcome.records[0].amount, outcome.records[1].amount);
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_reached() {
        let transport = Arc::new(ScriptedTransport::answering(|_| Ok(HttpResponse::ok(FULL_PAGE))));
        let outcome = scanner(&transport, settings(60, 2)).search(&SearchCriteria::default()).await;

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(transport.request_count(), 2);
        assert_eq!(outcome.stats.stop_reason, StopReason::TargetReached);
    }

    #[tokio::test(start_paused = true)]
    async fn test_filters_apply_to_portal_records() {
        let transport = Arc::new(ScriptedTransport::answering(|_| Ok(HttpResponse::ok(FULL_PAGE))));
        let criteria = SearchCriteria {
            tribunal: Some("TJ-RJ".into()),
            ..Default::default()
        };
        let outcome = scanner(&transport, settings(4, 25)).search(&criteria).await;

        assert_eq!(outcome.stats.total_seen, 4);
        assert_eq!(outcome.stats.after_tribunal, 0);
        assert!(outcome.records.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_probing() {
        let transport = Arc::new(ScriptedTransport::answering(|_| Ok(HttpResponse::ok(NOT_FOUND_PAGE))));
        let mut settings = settings(60, 25);
        settings.limits.deadline = Some(Duration::from_secs(10));

        let outcome = scanner(&transport, settings).search(&SearchCriteria::default()).await;

        // Probes at t = 0, 3, 6, 9
        assert_eq!(outcome.stats.probes_attempted, 4);
        assert_eq!(outcome.stats.stop_reason, StopReason::Deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_paced_like_probes() {
        let sent_at = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = sent_at.clone();
        let transport = Arc::new(ScriptedTransport::answering(move |_| {
            log.lock().push(Instant::now());
            Ok(HttpResponse { status: 503, body: String::new() })
        }));
        let mut settings = settings(1, 25);
        settings.policy = BackoffPolicy::linear(Duration::from_secs(1), 3);

        let outcome = scanner(&transport, settings).search(&SearchCriteria::default()).await;

        assert_eq!(outcome.stats.fetch_failures, 1);
        let sent_at = sent_at.lock();
        assert_eq!(sent_at.len(), 3);
        for pair in sent_at.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(3));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_cools_down_after_consecutive_failures() {
        let transport = Arc::new(ScriptedTransport::answering(|_| {
            Ok(HttpResponse { status: 503, body: String::new() })
        }));
        let mut settings = settings(3, 25);
        settings.breaker.failure_threshold = 2;

        let started = Instant::now();
        let outcome = scanner(&transport, settings).search(&SearchCriteria::default()).await;

        assert_eq!(outcome.stats.fetch_failures, 3);
        // Two attempts per probe
        assert_eq!(transport.request_count(), 6);
        assert!(started.elapsed() >= Duration::from_secs(60));
        assert_eq!(outcome.stats.stop_reason, StopReason::ProbeCap);
    }
}
