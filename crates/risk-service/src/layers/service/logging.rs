use anyhow::Context;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub(crate) const LOG_FILE_PREFIX: &str = "risk-service.log";
const DEFAULT_DIRECTIVES: &str = "info";

/// Installs the global subscriber: JSON lines into a daily file under `log_dir`,
/// and a compact stderr copy when `log_to_stderr` is set. Keep the guard alive
/// for as long as the process logs, or buffered lines are lost.
pub(crate) fn init_tracing(log_dir: &Path, log_to_stderr: bool) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log dir {}", log_dir.display()))?;
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX));

    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_target(false)
        .with_writer(file_writer);
    let stderr_layer = log_to_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    let filter = log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref());
    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .context("tracing subscriber already installed")?;
    tracing::debug!(event = "logging.ready", dir = %log_dir.display(), stderr = log_to_stderr);
    Ok(guard)
}

/// Directives from the environment, or `info` when they are absent or unparseable.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|raw| !raw.trim().is_empty())
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_defaults_to_info() {
        assert_eq!(log_filter(None).to_string(), "info");
        assert_eq!(log_filter(Some("  ")).to_string(), "info");
    }

    #[test]
    fn filter_keeps_valid_directives() {
        let filter = log_filter(Some("risk_service=debug"));
        assert!(filter.to_string().contains("risk_service=debug"), "{filter}");
    }

    #[test]
    fn filter_ignores_invalid_directives() {
        assert_eq!(log_filter(Some("risk_service=loud")).to_string(), "info");
    }
}
