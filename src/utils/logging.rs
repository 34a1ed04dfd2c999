use std::fs;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::config::Config;

pub const TIMING_TARGET: &str = "server.timing";

const SQLX_TARGET: &str = "sqlx";
const HTTP_TARGETS: [&str; 3] = ["hyper", "hyper_util", "reqwest"];

/// Flushes the non-blocking writers when dropped; hold it for the life of `main`.
pub struct LoggingGuards {
    _guards: Vec<WorkerGuard>,
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    pub level: LevelFilter,
    pub sqlx_level: LevelFilter,
    pub http_level: LevelFilter,
    pub dir: PathBuf,
}

impl LogSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            level: parse_log_level(&config.log_level),
            sqlx_level: parse_log_level(&config.sqlx_log_level),
            http_level: parse_log_level(&config.http_log_level),
            dir: config.log_dir.clone(),
        }
    }
}

pub(crate) fn parse_log_level(value: &str) -> LevelFilter {
    match value.trim().to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" | "warning" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        "off" => LevelFilter::OFF,
        _ => LevelFilter::INFO,
    }
}

/// Everything except the timing stream, with library targets held to their own levels.
fn server_filter(settings: &LogSettings) -> Targets {
    HTTP_TARGETS.iter().fold(
        Targets::new()
            .with_default(settings.level)
            .with_target(TIMING_TARGET, LevelFilter::OFF)
            .with_target(SQLX_TARGET, settings.sqlx_level),
        |filter, target| filter.with_target(*target, settings.http_level),
    )
}

fn timing_filter() -> Targets {
    Targets::new()
        .with_default(LevelFilter::OFF)
        .with_target(TIMING_TARGET, LevelFilter::INFO)
}

fn daily_writer(dir: &Path, file_name: &str, guards: &mut Vec<WorkerGuard>) -> NonBlocking {
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name));
    guards.push(guard);
    writer
}

pub fn init_logging(settings: &LogSettings) -> LoggingGuards {
    if let Err(err) = fs::create_dir_all(&settings.dir) {
        eprintln!("Failed to create logs directory: {err}");
    }

    let mut guards = Vec::with_capacity(4);
    let server_writer = daily_writer(&settings.dir, "server.log", &mut guards);
    let server_json_writer = daily_writer(&settings.dir, "server.jsonl", &mut guards);
    let timing_writer = daily_writer(&settings.dir, "timing.log", &mut guards);
    let timing_json_writer = daily_writer(&settings.dir, "timing.jsonl", &mut guards);

    let server = server_filter(settings);
    let timing = timing_filter();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(server.clone()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(server_writer)
                .with_ansi(false)
                .with_filter(server.clone()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(server_json_writer)
                .with_filter(server),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(timing_writer)
                .with_ansi(false)
                .with_filter(timing.clone()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(timing_json_writer)
                .with_filter(timing),
        )
        .init();

    LoggingGuards { _guards: guards }
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    fn settings(level: &str, sqlx: &str, http: &str) -> LogSettings {
        LogSettings {
            level: parse_log_level(level),
            sqlx_level: parse_log_level(sqlx),
            http_level: parse_log_level(http),
            dir: PathBuf::from("logs"),
        }
    }

    #[test]
    fn unknown_levels_default_to_info() {
        assert_eq!(parse_log_level("WARNING"), LevelFilter::WARN);
        assert_eq!(parse_log_level("verbose"), LevelFilter::INFO);
        assert_eq!(parse_log_level(" off "), LevelFilter::OFF);
    }

    #[test]
    fn sqlx_queries_follow_their_own_level() {
        let quiet = server_filter(&settings("debug", "warn", "warn"));
        assert!(quiet.would_enable("style_synth::db::database", &Level::DEBUG));
        assert!(!quiet.would_enable("sqlx::query", &Level::INFO));
        assert!(quiet.would_enable("sqlx::query", &Level::WARN));

        let chatty = server_filter(&settings("warn", "debug", "warn"));
        assert!(chatty.would_enable("sqlx::query", &Level::DEBUG));
        assert!(!chatty.would_enable("style_synth::handlers::chat", &Level::INFO));
    }

    #[test]
    fn http_internals_are_capped_separately() {
        let filter = server_filter(&settings("trace", "warn", "error"));
        for target in ["hyper::proto", "hyper_util::client::legacy::pool", "reqwest::connect"] {
            assert!(!filter.would_enable(target, &Level::WARN), "{target}");
            assert!(filter.would_enable(target, &Level::ERROR), "{target}");
        }
        assert!(filter.would_enable("style_synth::llm::gemini", &Level::TRACE));
    }

    #[test]
    fn timing_records_only_reach_the_timing_stream() {
        let server = server_filter(&settings("trace", "trace", "trace"));
        assert!(!server.would_enable(TIMING_TARGET, &Level::INFO));

        let timing = timing_filter();
        assert!(timing.would_enable(TIMING_TARGET, &Level::INFO));
        assert!(!timing.would_enable("style_synth::router", &Level::ERROR));
    }
}
