//! Process-wide `tracing` setup for the `talk-stream` binary.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const FILTER_ENV: &str = "TALK_STREAM_LOG_FILTER";
const TRACE_DEPS_ENV: &str = "TALK_STREAM_TRACE_DEPS";

/// Targets that flood the output at `trace` while a peer connection is up.
const NOISY_TARGETS: &[&str] = &[
    "webrtc",
    "webrtc_ice",
    "webrtc_dtls",
    "webrtc_sctp",
    "webrtc_srtp",
    "webrtc_mdns",
    "interceptor",
    "hyper",
    "hyper_util",
    "reqwest",
    "rustls",
    "h2",
    "mio",
];

#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LogConfig {
    pub level: LogLevel,
    /// Append to this file instead of stderr.
    pub file: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("logging already initialized")]
    AlreadyInitialized,
    #[error("failed to open log file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to configure logger: {0}")]
    Configure(String),
}

static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Installs the global subscriber. Later calls are no-ops.
pub fn init(config: &LogConfig) -> Result<(), InitError> {
    if GUARD.get().is_some() {
        return Ok(());
    }

    let directives = match std::env::var(FILTER_ENV) {
        Ok(custom) => Directives {
            filter: custom,
            capped: false,
        },
        Err(_) => Directives::for_level(config.level.into(), trace_deps_allowed()),
    };

    let (writer, guard) = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| InitError::Io {
                    path: path.clone(),
                    source,
                })?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&directives.filter))
        .with_target(config.level >= LogLevel::Debug)
        .with_ansi(config.file.is_none())
        .with_writer(writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| InitError::Configure(err.to_string()))?;
    GUARD.set(guard).map_err(|_| InitError::AlreadyInitialized)?;

    if directives.capped {
        tracing::debug!(
            "dependency traces capped at info; set {TRACE_DEPS_ENV}=1 or {FILTER_ENV} to override"
        );
    }
    Ok(())
}

fn trace_deps_allowed() -> bool {
    std::env::var(TRACE_DEPS_ENV)
        .map(|value| matches!(value.trim(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

#[derive(Debug, PartialEq, Eq)]
struct Directives {
    filter: String,
    /// Whether [`NOISY_TARGETS`] were held back to `info`.
    capped: bool,
}

impl Directives {
    fn for_level(level: LevelFilter, allow_deps: bool) -> Self {
        let own = |level: &str| format!("info,talk_stream={level},talks_client={level}");
        let filter = match level {
            LevelFilter::TRACE => own("trace"),
            LevelFilter::DEBUG => own("debug"),
            other => other.to_string().to_lowercase(),
        };
        if level < LevelFilter::TRACE || allow_deps {
            return Self {
                filter,
                capped: false,
            };
        }

        let caps = NOISY_TARGETS.iter().map(|target| format!("{target}=info"));
        Self {
            filter: std::iter::once(filter)
                .chain(caps)
                .collect::<Vec<_>>()
                .join(","),
            capped: true,
        }
    }
}
