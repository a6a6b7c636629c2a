use anyhow::anyhow;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

const DEFAULT_LEVEL: &str = "info";

/// Connection pool chatter from the HTTP stack stays at `warn` unless
/// `RUST_LOG` asks for it.
const QUIET_DEPENDENCIES: &[&str] = &["hyper_util=warn", "reqwest=warn", "rustls=warn"];

/// Filter used when `RUST_LOG` is unset: the configured level for this
/// binary and the client library, dependencies held at `warn`.
fn default_directives(level: Option<&str>) -> String {
    let level = level.filter(|l| !l.is_empty()).unwrap_or(DEFAULT_LEVEL);
    let mut directives = vec![level.to_string()];
    directives.extend(QUIET_DEPENDENCIES.iter().map(|d| d.to_string()));
    directives.join(",")
}

/// Installs the `tracing` subscriber. Output goes to stderr so that
/// `challenge` can print the nonce alone on stdout.
pub fn setup_logging(cfg: &Config) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directives(cfg.log_level.as_deref()))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| anyhow!(e))?;

    tracing::debug!(log_level = ?cfg.log_level, "logging initialized");
    Ok(())
}
