//! Diagnostic tracing.
//!
//! - **Tracing (this module)**: diagnostics filtered by `RECAST_LOG`,
//!   written to stderr. Not part of command output.
//! - **Run journal (`state::eventlog`)**: per-run JSONL records, written
//!   whenever `journal_dir` is configured and unaffected by `RECAST_LOG`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the filter directive.
pub const LOG_ENV: &str = "RECAST_LOG";

/// Default directive for a `-v` count.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "recast=info",
        _ => "recast=debug",
    }
}

/// Install the global subscriber.
///
/// `RECAST_LOG` wins over `verbosity` when set. Output: stderr, compact.
///
/// ```bash
/// RECAST_LOG=recast::core::pool=debug recast run -f codemod.yaml --target .
/// ```
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
