// =============================================================================
// PRECATORIO INGEST - one-shot ingestion run
// =============================================================================
//
// Loads config from the environment, runs every configured source
// concurrently and writes the resulting bundles to stdout as JSON.
// Logs and the banner go to stderr so stdout stays machine-readable.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use precatorio_ingest::config::Config;
use precatorio_ingest::fetch::ReqwestTransport;
use precatorio_ingest::ingest::{until_interrupted, Ingestor};
use precatorio_ingest::metrics::MetricsCollector;

fn print_banner(config: &Config) {
    let sources: Vec<&str> = config.sources.iter().map(|s| s.label()).collect();
    eprintln!(
        r#"
    ╔══════════════════════════════════════════════════════════╗
    ║              PRECATORIO INGEST v{:<24} ║
    ║   CNJ decoding | counted filter funnel | canonical form  ║
    ╚══════════════════════════════════════════════════════════╝
      sources: {}
"#,
        env!("CARGO_PKG_VERSION"),
        sources.join(", ")
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .init();

    let config = Config::from_env();
    print_banner(&config);

    let criteria = config.search_criteria();
    info!(
        filters = ?criteria.active_filters(),
        date_range = ?criteria.date_range,
        reference_year = config.reference_year(),
        "Configuration loaded"
    );

    let transport = ReqwestTransport::new(config.http_timeout, &config.user_agent)
        .context("failed to build HTTP client")?;
    let metrics = Arc::new(MetricsCollector::new());
    let ingestor = Ingestor::new(&config, Arc::new(transport), metrics);

    let run = ingestor.run_all(&config.sources, &criteria);
    let Some(bundles) = until_interrupted(run, signal::ctrl_c()).await else {
        return Ok(());
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for bundle in &bundles {
        serde_json::to_writer(&mut out, bundle).context("failed to serialize bundle")?;
        writeln!(out).context("failed to write bundle")?;
    }
    out.flush().context("failed to flush stdout")?;

    let snapshot = ingestor.metrics().snapshot();
    info!(
        runs = snapshot.runs_completed,
        truncated = snapshot.runs_truncated,
        accepted = snapshot.records_accepted(),
        seen = snapshot.records_seen,
        fetch_failures = snapshot.fetch_failures,
        low_confidence = snapshot.low_confidence_records,
        "Ingestion complete"
    );
    Ok(())
}
