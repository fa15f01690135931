use std::path::Path;

use once_cell::sync::OnceCell;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::config::ObservabilityConfig;

const DEFAULT_LOG_FILE: &str = "chatrelay.logs.jsonl";

static INIT: OnceCell<()> = OnceCell::new();

/// Initialize logging once per process from `CHATRELAY_*` variables.
///
/// An invalid configuration falls back to the defaults and is reported once
/// the subscriber is up.
pub fn init_observability() {
    match ObservabilityConfig::from_env() {
        Ok(config) => init_observability_with(&config),
        Err(err) => {
            init_observability_with(&ObservabilityConfig::default());
            tracing::warn!(error = %err, "invalid logging configuration, using defaults");
        }
    }
}

/// Initialize logging once per process. Later calls are no-ops, whatever
/// config they pass.
pub fn init_observability_with(config: &ObservabilityConfig) {
    INIT.get_or_init(|| {
        if !config.enabled {
            return;
        }
        let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"));
        let registry = tracing_subscriber::registry().with(filter);

        let file = config.json_log_path.as_deref().map(log_file_appender);
        match file {
            Some(Ok(writer)) => {
                let _ = registry
                    .with(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .with_current_span(true)
                            .with_target(false)
                            .with_writer(writer),
                    )
                    .try_init();
            }
            other => {
                let _ = registry
                    .with(
                        tracing_subscriber::fmt::layer()
                            .compact()
                            .with_target(false)
                            .with_writer(std::io::stdout),
                    )
                    .try_init();
                if let Some(Err(err)) = other {
                    tracing::warn!(error = %err, "cannot open JSON log file, logging to stdout");
                }
            }
        }
    });
}

/// Append-only JSON lines file at `path`, creating its directory.
fn log_file_appender(path: &Path) -> Result<RollingFileAppender, InitError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE);
    let _ = std::fs::create_dir_all(dir);
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)
}
