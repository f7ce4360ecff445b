//! Logging setup for the wayfinder server.
//!
//! `RUST_LOG` wins when set. Otherwise the filter is assembled from
//! [`LogSettings`]: one base level for everything, a separate level for the
//! scan worker (which logs once per cycle) and `warn` for HTTP plumbing.
//!
//! Production writes JSON to `<dir>/wayfinder-server.<date>.log`, keeping two
//! weeks of files, and compact lines to stdout. Development writes pretty
//! lines to stdout and reports the duration of every closed span, which
//! includes each `scan_cycle` when the worker runs at `debug`.

use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const ENV_VAR: &str = "WAYFINDER_ENV";
const LEVEL_VAR: &str = "WAYFINDER_LOG_LEVEL";
const SCAN_LEVEL_VAR: &str = "WAYFINDER_SCAN_LOG_LEVEL";
const DIR_VAR: &str = "WAYFINDER_LOG_DIR";

const LOG_FILE_PREFIX: &str = "wayfinder-server";
const MAX_LOG_FILES: usize = 14;

/// Target of the per-cycle scan worker logs.
pub const SCAN_TARGET: &str = "wayfinder_core::worker";

/// Targets capped at `warn`.
const QUIET_TARGETS: &[&str] = &["hyper", "h2", "tower_http", "bluer"];

/// Non-blocking writer guards, held for the life of the process.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static STDOUT_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Resolved logging options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// JSON file output when set.
    pub production: bool,
    /// Base level.
    pub level: LevelFilter,
    /// Level of [`SCAN_TARGET`]; the base level when unset.
    pub scan_level: Option<LevelFilter>,
    /// Where production log files go.
    pub directory: PathBuf,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            production: false,
            level: LevelFilter::INFO,
            scan_level: None,
            directory: default_log_directory(),
        }
    }
}

impl LogSettings {
    /// Reads `WAYFINDER_ENV`, `WAYFINDER_LOG_LEVEL`,
    /// `WAYFINDER_SCAN_LOG_LEVEL` and `WAYFINDER_LOG_DIR`.
    ///
    /// # Errors
    ///
    /// Returns an error if a level variable is not a valid level.
    pub fn from_env() -> anyhow::Result<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        let mut settings = Self {
            production: var(ENV_VAR).is_some_and(|env| env.eq_ignore_ascii_case("production")),
            ..Self::default()
        };
        if let Some(level) = var(LEVEL_VAR) {
            settings.level = parse_level(LEVEL_VAR, &level)?;
        }
        if let Some(level) = var(SCAN_LEVEL_VAR) {
            settings.scan_level = Some(parse_level(SCAN_LEVEL_VAR, &level)?);
        }
        if let Some(dir) = var(DIR_VAR) {
            settings.directory = PathBuf::from(dir);
        }
        Ok(settings)
    }

    /// Filter directives in the order they are applied.
    #[must_use]
    pub fn directives(&self) -> Vec<String> {
        let quiet = self.level.min(LevelFilter::WARN);
        let mut directives = vec![
            self.level.to_string(),
            format!("{SCAN_TARGET}={}", self.scan_level.unwrap_or(self.level)),
        ];
        directives.extend(QUIET_TARGETS.iter().map(|target| format!("{target}={quiet}")));
        directives
    }

    /// Builds the filter from [`LogSettings::directives`], ignoring `RUST_LOG`.
    ///
    /// # Errors
    ///
    /// Returns an error if a directive does not parse.
    pub fn filter(&self) -> anyhow::Result<EnvFilter> {
        self.directives()
            .iter()
            .try_fold(EnvFilter::default(), |filter, directive| {
                let directive: Directive = directive
                    .parse()
                    .with_context(|| format!("Invalid log directive '{directive}'"))?;
                Ok(filter.add_directive(directive))
            })
    }
}

fn parse_level(var: &str, value: &str) -> anyhow::Result<LevelFilter> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{var}='{value}' is not a log level"))
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error if the filter cannot be built or, in production, the log
/// directory cannot be created.
pub fn init(settings: &LogSettings) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => settings.filter()?,
    };

    if settings.production {
        init_production(env_filter, settings)
    } else {
        init_development(env_filter);
        Ok(())
    }
}

fn init_production(env_filter: EnvFilter, settings: &LogSettings) -> anyhow::Result<()> {
    let log_dir = &settings.directory;
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Cannot create log directory {}", log_dir.display()))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(log_dir)
        .with_context(|| format!("Cannot open log file in {}", log_dir.display()))?;

    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
    let (non_blocking_stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking_file)
        .with_target(true)
        .with_current_span(true)
        .with_file(true)
        .with_line_number(true);

    // journald adds its own timestamps
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(non_blocking_stdout)
        .with_target(true)
        .without_time()
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    let _ = FILE_GUARD.set(file_guard);
    let _ = STDOUT_GUARD.set(stdout_guard);

    Ok(())
}

fn init_development(env_filter: EnvFilter) {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .init();
}

fn default_log_directory() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/wayfinder")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "wayfinder")
            .map(|dirs| dirs.data_local_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from("./logs"))
    }
}
