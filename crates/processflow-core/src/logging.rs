use crate::config::LoggingConfig;
use crate::errors::ConfigError;
use chrono::{Local, NaiveDate};
use std::env;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tracing::Level;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const LOG_PREFIX: &str = "processflow_";
const LEVEL_ENV: &str = "PROCESSFLOW_LOG_LEVEL";

static DEFAULT_LOG_LEVEL: Mutex<Level> = Mutex::new(Level::INFO);

pub fn set_log_level(level: Level) {
    if let Ok(mut default_level) = DEFAULT_LOG_LEVEL.lock() {
        *default_level = level;
    }
}

/// Maps repeated `-v` flags onto a level: none is INFO, one DEBUG, more TRACE.
pub fn set_verbosity(verbose: u8) {
    let level = match verbose {
        0 => return,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    set_log_level(level);
}

pub fn set_log_level_from_env() {
    if let Ok(level) = env::var(LEVEL_ENV) {
        match level.parse::<Level>() {
            Ok(level) => set_log_level(level),
            Err(_) => eprintln!("Ignoring invalid {}='{}'", LEVEL_ENV, level),
        }
    }
}

fn default_log_level() -> Level {
    DEFAULT_LOG_LEVEL
        .lock()
        .map(|level| *level)
        .unwrap_or(Level::INFO)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_log_level().to_string().to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

fn log_file_date(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let date = name.strip_prefix(LOG_PREFIX)?.split('_').next()?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn rotate_logs(log_dir: &Path, config: &LoggingConfig) -> Result<(), ConfigError> {
    fs_err::create_dir_all(log_dir)?;

    let mut entries: Vec<PathBuf> = fs_err::read_dir(log_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(LOG_PREFIX) && n.ends_with(".log"))
        })
        .collect();

    entries.sort();

    if config.max_files > 0 && entries.len() > config.max_files {
        let to_delete = entries.len() - config.max_files;
        for path in entries.drain(0..to_delete) {
            let _ = fs_err::remove_file(path);
        }
    }

    if config.max_age_days > 0 {
        let now = SystemTime::now();
        let max_age = Duration::from_secs(config.max_age_days * 24 * 60 * 60);

        for path in entries {
            let Some(created) = log_file_date(&path)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .and_then(|dt| dt.and_local_timezone(Local).single())
            else {
                continue;
            };
            let age = now.duration_since(SystemTime::from(created));
            if age.is_ok_and(|age| age > max_age) {
                let _ = fs_err::remove_file(&path);
            }
        }
    }

    Ok(())
}

struct SessionFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for SessionFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();

        write!(writer, "[")?;
        LocalTimeFormatter.format_time(&mut writer)?;
        write!(writer, "] [{:5}] ", metadata.level())?;

        if let Some(module) = metadata.module_path() {
            write!(writer, "{}:{} ", module, metadata.line().unwrap_or(0))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn init_tracing_subscriber(log_path: &Path) -> Result<(), ConfigError> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|source| ConfigError::PathIo {
            path: log_path.to_path_buf(),
            source,
        })?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .event_format(SessionFormatter);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(LocalTimeFormatter)
        .with_ansi(true)
        .with_target(false)
        .with_filter(EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter())
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| ConfigError::General(format!("Logger already initialized: {}", e)))?;

    tracing::info!("--- Logger Initialized ---");
    Ok(())
}

pub fn logs_dir() -> Result<PathBuf, ConfigError> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("processflow");
    let cache_home = xdg_dirs.get_cache_home().ok_or_else(|| {
        ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not find cache home directory",
        ))
    })?;
    Ok(cache_home.join("logs"))
}

/// Opens a per-session log file and points `processflow.log` at it.
pub fn init_session_logger(config: &LoggingConfig) -> Result<PathBuf, ConfigError> {
    let logs_dir = logs_dir()?;
    rotate_logs(&logs_dir, config)?;

    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
    let filename = format!("{}{}_{}.log", LOG_PREFIX, timestamp, std::process::id());
    let log_path = logs_dir.join(&filename);

    init_tracing_subscriber(&log_path)?;

    if let Some(cache_home) = logs_dir.parent() {
        let symlink_path = cache_home.join("processflow.log");
        let _ = fs_err::remove_file(&symlink_path);
        #[cfg(unix)]
        {
            let target = Path::new("logs").join(&filename);
            let _ = std::os::unix::fs::symlink(&target, &symlink_path);
        }
    }

    Ok(log_path)
}

pub fn init_stderr_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_timer(LocalTimeFormatter)
        .with_ansi(true)
        .with_target(false)
        .with_level(true)
        .try_init();
}

fn format_command_for_display(command: &Command) -> String {
    let program = command.get_program().to_string_lossy();
    let args = command
        .get_args()
        .map(|arg| {
            let s = arg.to_string_lossy();
            if s.contains(char::is_whitespace) || s.is_empty() {
                format!("'{}'", s)
            } else {
                s.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    format!("{} {}", program, args)
}

pub fn log_and_print_command(command: &Command) {
    tracing::debug!("[CMD] {}", format_command_for_display(command));
}
