//! Logging bootstrap
//!
//! Events go to stderr and, when file logging is on, to `parley.log` plus one
//! file per crate under `~/parley/logs` (`PARLEY_LOG_DIR`, `logging.dir`).

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Per-crate log files as (file name, event target)
const COMPONENT_LOGS: &[(&str, &str)] = &[
    ("lock.log", "parley_lock"),
    ("persistence.log", "parley_persistence"),
    ("migration.log", "parley_admin::migrate"),
];

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub console_output: bool,
    pub file_logging: bool,
    pub level: Level,
    pub rotation: Rotation,
}

fn default_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(format!("{}/parley/logs", home))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            console_output: true,
            file_logging: false,
            level: Level::INFO,
            rotation: Rotation::DAILY,
        }
    }
}

impl LoggingConfig {
    /// Create from `PARLEY_LOG_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            log_dir: lookup("PARLEY_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
            console_output: lookup("PARLEY_LOG_CONSOLE")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.console_output),
            file_logging: lookup("PARLEY_LOG_FILE")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.file_logging),
            level: lookup("PARLEY_LOG_LEVEL")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.level),
            rotation: defaults.rotation,
        }
    }

    /// Apply values from the configuration file over `self`.
    pub fn with_overrides(
        mut self,
        log_dir: Option<String>,
        console_output: Option<bool>,
        file_logging: Option<bool>,
        level: Option<String>,
    ) -> Self {
        if let Some(dir) = log_dir {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(console) = console_output {
            self.console_output = console;
        }
        if let Some(file) = file_logging {
            self.file_logging = file;
        }
        if let Some(level) = level.and_then(|v| v.parse().ok()) {
            self.level = level;
        }
        self
    }
}

/// Keeps the file writers alive; buffered output is flushed on drop.
pub struct LoggingGuard {
    _file_guards: Vec<WorkerGuard>,
}

/// Install the global subscriber.
///
/// `RUST_LOG`, when set, takes precedence over the configured level for the
/// console and the root log file.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    if config.file_logging {
        std::fs::create_dir_all(&config.log_dir)?;
    }

    let mut guards: Vec<WorkerGuard> = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console_output {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));
        let console_layer = fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(filter);
        layers.push(Box::new(console_layer));
    }

    if config.file_logging {
        let mut file_writer = |file_name: &str| {
            let appender =
                RollingFileAppender::new(config.rotation.clone(), &config.log_dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);
            fmt::layer::<Registry>()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
        };

        let everything = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));
        layers.push(Box::new(file_writer("parley.log").with_filter(everything)));

        for (file_name, target) in COMPONENT_LOGS {
            let only_target = Targets::new().with_target(*target, LevelFilter::TRACE);
            layers.push(Box::new(file_writer(*file_name).with_filter(only_target)));
        }
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    if config.file_logging {
        tracing::debug!(
            log_dir = %config.log_dir.display(),
            component_files = COMPONENT_LOGS.len(),
            "File logging initialized"
        );
    }

    Ok(LoggingGuard {
        _file_guards: guards,
    })
}
