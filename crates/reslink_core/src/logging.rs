//! Process-wide diagnostic logging.
//!
//! # Responsibility
//! - Start the rolling file logger once per process.
//! - Capture panics as sanitized log events.
//!
//! # Invariants
//! - Repeating `init_logging` with the same settings is a no-op.
//! - A second call with a different level or directory is rejected.
//! - Initialization never panics.
//! - Events carry ids, kinds and counts only; resource content is never logged.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "reslink";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const KEEP_LOG_FILES: usize = 5;
const PANIC_PAYLOAD_LIMIT: usize = 160;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Eq)]
struct LogSettings {
    level: &'static str,
    dir: PathBuf,
}

impl LogSettings {
    fn parse(level: &str, log_dir: &str) -> Result<Self, String> {
        Ok(Self {
            level: parse_level(level)?,
            dir: parse_log_dir(log_dir)?,
        })
    }

    /// Rejects any attempt to reconfigure a running logger.
    fn ensure_same_as(&self, active: &LogSettings) -> Result<(), String> {
        if active.dir != self.dir {
            return Err(format!(
                "logging already initialized at `{}`; refusing to switch to `{}`",
                active.dir.display(),
                self.dir.display()
            ));
        }
        if active.level != self.level {
            return Err(format!(
                "logging already initialized with level `{}`; refusing to switch to `{}`",
                active.level, self.level
            ));
        }
        Ok(())
    }
}

struct ActiveLogger {
    settings: LogSettings,
    _handle: LoggerHandle,
}

/// Starts file logging at `level` under the absolute directory `log_dir`.
///
/// # Errors
/// - Unknown level, blank or relative directory.
/// - Directory cannot be created or the backend fails to start.
/// - Logging is already running with different settings.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), String> {
    let requested = LogSettings::parse(level, log_dir)?;

    if let Some(active) = ACTIVE.get() {
        return requested.ensure_same_as(&active.settings);
    }

    let active = ACTIVE.get_or_try_init(|| start_logger(requested.clone()))?;
    requested.ensure_same_as(&active.settings)
}

/// Active `(level, log_dir)`, or `None` before `init_logging` succeeds.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    ACTIVE
        .get()
        .map(|active| (active.settings.level, active.settings.dir.clone()))
}

/// `debug` for debug builds, `info` for release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start_logger(settings: LogSettings) -> Result<ActiveLogger, String> {
    std::fs::create_dir_all(&settings.dir).map_err(|err| {
        format!(
            "failed to create log directory `{}`: {err}",
            settings.dir.display()
        )
    })?;

    let handle = Logger::try_with_str(settings.level)
        .map_err(|err| format!("invalid log level `{}`: {err}", settings.level))?
        .log_to_file(
            FileSpec::default()
                .directory(settings.dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(ROTATE_AT_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEEP_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))?;

    install_panic_hook();

    info!(
        "event=core_init module=logging status=ok version={} build={} level={}",
        env!("CARGO_PKG_VERSION"),
        if cfg!(debug_assertions) { "debug" } else { "release" },
        settings.level
    );

    Ok(ActiveLogger {
        settings,
        _handle: handle,
    })
}

fn parse_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error"
        )),
    }
}

fn parse_log_dir(log_dir: &str) -> Result<PathBuf, String> {
    let trimmed = log_dir.trim();
    if trimmed.is_empty() {
        return Err("log_dir cannot be empty".to_string());
    }
    let path = Path::new(trimmed);
    if !path.is_absolute() {
        return Err(format!("log_dir must be an absolute path, got `{trimmed}`"));
    }
    Ok(path.to_path_buf())
}

fn install_panic_hook() {
    if PANIC_HOOK.set(()).is_err() {
        return;
    }

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        error!(
            "event=panic_captured module=logging status=error location={} payload={}",
            location,
            panic_summary(panic_info.payload())
        );
        previous(panic_info);
    }));
}

fn panic_summary(payload: &(dyn std::any::Any + Send)) -> String {
    let text = payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    single_line(&text, PANIC_PAYLOAD_LIMIT)
}

/// Flattens newlines and caps the length at `limit` characters.
fn single_line(value: &str, limit: usize) -> String {
    let flat = value.replace(['\n', '\r'], " ");
    let mut capped = flat.chars().take(limit).collect::<String>();
    if flat.chars().count() > limit {
        capped.push_str("...");
    }
    capped
}
