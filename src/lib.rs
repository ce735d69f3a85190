// =============================================================================
// PRECATORIO INGEST
// =============================================================================
//
// Pulls Brazilian judicial credit processes (precatórios) from two upstreams,
// the official paginated search API and the court portal, and turns them
// into one canonical record shape with a funnel of stats explaining what
// was kept and why.
//
//   cnj / tribunal      CNJ number validation and tribunal decoding
//   fetch / retry       GET transport, retry and backoff
//   circuit_breaker     keeps the portal from being hammered while it's down
//   html / keywords     portal page extraction, status and nature keywords
//   filters / normalize the counted filter funnel and the canonical record
//   pipeline            per-run accept/reject bookkeeping shared by adapters
//   scanners            one adapter per upstream
//   ingest              the orchestrator
//   config / metrics    env-driven settings and process-wide totals

pub mod circuit_breaker;
pub mod cnj;
pub mod config;
pub mod fetch;
pub mod filters;
pub mod html;
pub mod ingest;
pub mod keywords;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod retry;
pub mod scanners;
pub mod tribunal;
