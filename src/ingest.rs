// =============================================================================
// ingest.rs - THE ORCHESTRATOR
// =============================================================================
//
// Picks the adapter for a source, runs it, and wraps whatever comes back in
// an `IngestionBundle` with a run id and wall-clock timestamps. A run never
// fails as a whole: upstream trouble ends up in `stats.stop_reason` and
// `stats.fetch_failures`, and the bundle carries whatever was accepted
// before things went wrong.
// =============================================================================

use std::future::Future;
use std::io;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::fetch::Transport;
use crate::metrics::MetricsCollector;
use crate::models::{IngestionBundle, SearchCriteria, Source};
use crate::scanners::{OfficialApiScanner, PortalScanner};
use crate::tribunal::IdentifierDecoder;

pub struct Ingestor<T> {
    api: OfficialApiScanner<T>,
    portal: PortalScanner<T>,
    metrics: Arc<MetricsCollector>,
}

impl<T: Transport> Ingestor<T> {
    pub fn new(config: &Config, transport: Arc<T>, metrics: Arc<MetricsCollector>) -> Self {
        let decoder = Arc::new(IdentifierDecoder::default());
        Self {
            api: OfficialApiScanner::new(transport.clone(), decoder.clone(), config.api_settings()),
            portal: PortalScanner::new(transport, decoder, config.portal_settings()),
            metrics,
        }
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// One ingestion run against one upstream.
    pub async fn run(&self, source: Source, criteria: &SearchCriteria) -> IngestionBundle {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        self.metrics.increment_runs_started();
        info!(run_id = %run_id, source = %source, "Ingestion run started");

        let outcome = match source {
            Source::OfficialApi => self.api.search(criteria).await,
            Source::PortalScraper => self.portal.search(criteria).await,
        };

        let finished_at = Utc::now();
        self.metrics.record_run(source, &outcome.stats);
        info!(
            run_id = %run_id,
            source = %source,
            accepted = outcome.stats.accepted,
            seen = outcome.stats.total_seen,
            stop_reason = ?outcome.stats.stop_reason,
            truncated = outcome.stats.truncated(),
            "Ingestion run finished"
        );

        IngestionBundle {
            run_id,
            source,
            started_at,
            finished_at,
            records: outcome.records,
            stats: outcome.stats,
        }
    }

    /// Run every source concurrently. Bundles come back in `sources` order.
    pub async fn run_all(&self, sources: &[Source], criteria: &SearchCriteria) -> Vec<IngestionBundle> {
        join_all(sources.iter().map(|&source| self.run(source, criteria))).await
    }
}

/// Drive `work` to completion unless `interrupt` fires first, in which case
/// the partial work is dropped and `None` comes back. An interrupt source
/// that fails to register is logged and ignored.
pub async fn until_interrupted<W, I>(work: W, interrupt: I) -> Option<W::Output>
where
    W: Future,
    I: Future<Output = io::Result<()>>,
{
    tokio::pin!(work);
    tokio::select! {
        output = &mut work => Some(output),
        signal = interrupt => match signal {
            Ok(()) => {
                warn!("Interrupted, discarding partial runs");
                None
            }
            Err(err) => {
                error!(error = %err, "Signal listener failed, running without interrupt handling");
                Some(work.await)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::ScriptedTransport;
    use crate::fetch::{FetchError, HttpResponse};
    use crate::filters::StopReason;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::collections::HashMap;

    fn config(extra: &[(&str, &str)]) -> Config {
        let mut vars: HashMap<String, String> = [
            ("PRECATORIO_API_URL", "https://api.test/processos"),
            ("PRECATORIO_PORTAL_URL", "https://portal.test/show.do?numero={numero}"),
            ("PRECATORIO_REFERENCE_YEAR", "2025"),
            ("PRECATORIO_PORTAL_PROBE_CAP", "3"),
            ("PRECATORIO_PORTAL_PACING_SECS", "1"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in extra {
            vars.insert(k.to_string(), v.to_string());
        }
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    fn criteria() -> SearchCriteria {
        config(&[]).search_criteria_for(NaiveDate::from_ymd_opt(2025, 6, 30).unwrap())
    }

    /// API answers with two entries, the portal has nothing.
    fn upstreams() -> Arc<ScriptedTransport> {
        Arc::new(ScriptedTransport::answering(|request| {
            if request.url.starts_with("https://api.test") {
                let body = json!({
                    "processos": [
                        {
                            "numeroProcesso": "0001234-56.2023.8.26.0100",
                            "classe": "Precatório",
                            "assunto": "Benefício previdenciário",
                            "valorCausa": 120000,
                            "dataAjuizamento": "2023-03-10"
                        },
                        {
                            "numeroProcesso": "0009999-11.2022.8.19.0001",
                            "valorCausa": 75000
                        }
                    ]
                });
                Ok(HttpResponse::ok(body.to_string()))
            } else {
                Err(FetchError::Status { status: 404 })
            }
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_api_run_produces_bundle() {
        let metrics = Arc::new(MetricsCollector::new());
        let ingestor = Ingestor::new(&config(&[]), upstreams(), metrics.clone());

        let bundle = ingestor.run(Source::OfficialApi, &criteria()).await;

        assert_eq!(bundle.source, Source::OfficialApi);
        assert!(bundle.finished_at >= bundle.started_at);
        assert_eq!(bundle.records.len(), 2);
        assert_eq!(bundle.stats.stop_reason, StopReason::ShortPage);
        assert!(bundle.records.iter().all(|r| r.source_label == "OFFICIAL_API"));
        assert_eq!(bundle.records[0].tribunal_code, "TJ-SP");
        assert_eq!(bundle.records[0].amount, Decimal::new(120_000, 0));

        let snap = metrics.snapshot();
        assert_eq!(snap.runs_started, 1);
        assert_eq!(snap.runs_completed, 1);
        assert_eq!(snap.api_records_accepted, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_criteria_flow_through_to_the_adapter() {
        let cfg = config(&[("PRECATORIO_TRIBUNAL", "TJ-SP")]);
        let criteria = cfg.search_criteria_for(NaiveDate::from_ymd_opt(2025, 6, 30).unwrap());
        let ingestor = Ingestor::new(&cfg, upstreams(), Arc::new(MetricsCollector::new()));

        let bundle = ingestor.run(Source::OfficialApi, &criteria).await;

        assert_eq!(bundle.stats.total_seen, 2);
        assert_eq!(bundle.stats.after_tribunal, 1);
        assert_eq!(bundle.records.len(), 1);
        assert_eq!(bundle.stats.active_filters, vec!["tribunal=TJ-SP".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_all_keeps_source_order() {
        let metrics = Arc::new(MetricsCollector::new());
        let ingestor = Ingestor::new(&config(&[]), upstreams(), metrics.clone());

        let bundles = ingestor
            .run_all(&[Source::PortalScraper, Source::OfficialApi], &criteria())
            .await;

        assert_eq!(bundles.len(), 2);
        assert_eq!(bundles[0].source, Source::PortalScraper);
        assert_eq!(bundles[1].source, Source::OfficialApi);
        assert_ne!(bundles[0].run_id, bundles[1].run_id);

        let portal = &bundles[0];
        assert!(portal.records.is_empty());
        assert_eq!(portal.stats.probes_attempted, 3);
        assert_eq!(portal.stats.probes_not_found, 3);
        assert_eq!(portal.stats.stop_reason, StopReason::ProbeCap);

        let snap = metrics.snapshot();
        assert_eq!(snap.runs_completed, 2);
        assert_eq!(snap.records_accepted(), 2);
        assert_eq!(snap.probes_not_found, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_discards_work() {
        let work = async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            7
        };
        assert_eq!(until_interrupted(work, async { Ok(()) }).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_broken_signal_listener_still_runs_work() {
        let work = async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            7
        };
        let broken = async { Err(io::Error::new(io::ErrorKind::Other, "no signal handler")) };
        assert_eq!(until_interrupted(work, broken).await, Some(7));
    }
}
