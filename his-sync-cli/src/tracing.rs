//! Installs a plain `fmt` subscriber seeded from `HIS_SYNC_LOG`, falling
//! back to the configured log level (SPEC_FULL.md §4.9). No OTLP export —
//! this process has no metrics backend to talk to.

use tracing_subscriber::EnvFilter;

pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_env("HIS_SYNC_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}
