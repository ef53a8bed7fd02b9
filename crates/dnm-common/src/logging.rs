//! ---
//! dnm_section: "01-core-functionality"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Tracing subscriber and per-run span shared by the CLI and the generator."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
//! Every generation run executes inside a `dnm_run` span carrying the seed,
//! so interleaved runs in one log file can be told apart. The JSON layers
//! flatten that span onto each event.

use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, Span};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "DNM_LOG";
const RUST_LOG_ENV: &str = "RUST_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

static GUARDS: OnceCell<[WorkerGuard; 2]> = OnceCell::new();

/// Output format of the stdout layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Where the active filter directive came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterSource {
    DnmLog,
    RustLog,
    Config,
    Default,
}

/// Pick the first usable directive: `DNM_LOG`, then `RUST_LOG`, then the
/// configured level, then `info`. Unparseable directives are skipped.
pub fn select_filter(
    dnm_log: Option<&str>,
    rust_log: Option<&str>,
    configured: Option<&str>,
) -> (EnvFilter, FilterSource) {
    let candidates = [
        (dnm_log, FilterSource::DnmLog),
        (rust_log, FilterSource::RustLog),
        (configured, FilterSource::Config),
    ];
    for (directive, source) in candidates {
        let Some(directive) = directive.filter(|d| !d.trim().is_empty()) else {
            continue;
        };
        match EnvFilter::try_new(directive) {
            Ok(filter) => return (filter, source),
            Err(err) => eprintln!("ignoring invalid log directive {directive:?}: {err}"),
        }
    }
    (EnvFilter::new(DEFAULT_DIRECTIVE), FilterSource::Default)
}

/// Span wrapping one generation run. Enter it around the pipeline so every
/// stage event carries the seed.
pub fn run_span(seed: u64) -> Span {
    info_span!("dnm_run", seed)
}

/// Install the global subscriber: stdout in the configured format plus a
/// daily rolling JSON file under `config.directory`. Only the first call
/// installs anything; later calls still create the directory.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory)?;
    let prefix = config.file_prefix.as_deref().unwrap_or(service_name);

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(daily(&config.directory, format!("{prefix}.log")));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    if GUARDS.set([file_guard, stdout_guard]).is_err() {
        return Ok(());
    }

    let stdout_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .compact()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
    };
    let file_layer = fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(file_writer)
        .boxed();

    let dnm_log = std::env::var(LOG_ENV).ok();
    let rust_log = std::env::var(RUST_LOG_ENV).ok();
    let (filter, source) = select_filter(
        dnm_log.as_deref(),
        rust_log.as_deref(),
        config.level.as_deref(),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .ok();

    info!(
        service = %service_name,
        log_dir = %config.directory.display(),
        format = ?config.format,
        filter_source = ?source,
        "tracing initialised"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_log_directory_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            directory: dir.path().join("logs"),
            format: LogFormat::Pretty,
            file_prefix: Some("dnm-test".into()),
            level: Some("debug".into()),
        };
        init_tracing("dnm-test", &config).unwrap();
        assert!(config.directory.is_dir());
        init_tracing("dnm-test", &config).unwrap();
    }

    #[test]
    fn filter_precedence_prefers_dnm_log() {
        let (_, source) = select_filter(Some("debug"), Some("warn"), Some("error"));
        assert_eq!(source, FilterSource::DnmLog);
        let (_, source) = select_filter(None, Some("warn"), Some("error"));
        assert_eq!(source, FilterSource::RustLog);
        let (_, source) = select_filter(None, None, Some("dnm_generator=debug"));
        assert_eq!(source, FilterSource::Config);
        let (_, source) = select_filter(None, Some("  "), None);
        assert_eq!(source, FilterSource::Default);
    }

    #[test]
    fn invalid_directive_falls_through() {
        let (_, source) = select_filter(Some("dnm_generator=notalevel"), None, Some("info"));
        assert_eq!(source, FilterSource::Config);
    }

    #[test]
    fn run_span_is_named_after_the_run() {
        let span = run_span(42);
        if let Some(meta) = span.metadata() {
            assert_eq!(meta.name(), "dnm_run");
        }
    }

    #[test]
    fn log_format_uses_kebab_case() {
        let rendered = serde_json::to_string(&LogFormat::StructuredJson);
        assert_eq!(rendered.ok().as_deref(), Some("\"structured-json\""));
    }
}
