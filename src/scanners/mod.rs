// =============================================================================
// scanners/mod.rs - ONE MODULE PER UPSTREAM
// =============================================================================
//
// Two upstreams, nothing in common but the output. The official API pages
// through JSON by date window; the portal has to be probed one made-up
// process number at a time. Both hand their raw entries to a `RunContext`
// and return a `SearchOutcome`, so the orchestrator doesn't care which one
// it's talking to.
// =============================================================================

pub mod official_api_scanner;
pub mod portal_scanner;

pub use official_api_scanner::{ApiSettings, OfficialApiScanner};
pub use portal_scanner::{CandidateSettings, PortalScanner, PortalSettings};
