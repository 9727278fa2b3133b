//! Tracing subscriber setup
//!
//! Text mode writes to the rolling file and to stdout; JSON mode writes only
//! the file, for log shippers.

use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Directives appended to the configured level. sqlx logs every statement
/// at info.
const QUIET_DEPENDENCIES: &str = "sqlx=warn,hyper=warn,reqwest=warn";

/// Unknown values fall back to a single never-rotated file.
fn rotation(name: &str) -> Rotation {
    match name.to_ascii_lowercase().as_str() {
        "minutely" => Rotation::MINUTELY,
        "hourly" => Rotation::HOURLY,
        "daily" => Rotation::DAILY,
        _ => Rotation::NEVER,
    }
}

fn filter_directives(config: &AppConfig) -> String {
    format!("{},{}", config.log_level, QUIET_DEPENDENCIES)
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process or buffered file output is lost.
pub fn try_init_logging(config: &AppConfig) -> Result<WorkerGuard, TryInitError> {
    let file_appender = RollingFileAppender::new(
        rotation(&config.rotation),
        &config.log_dir,
        &config.log_file,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // RUST_LOG wins over the config file
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));
    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).try_init()?;
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).try_init()?;
    }

    Ok(guard)
}

/// Like [`try_init_logging`], but a second installation only prints a
/// warning to stderr and keeps the existing subscriber.
pub fn init_logging(config: &AppConfig) -> Option<WorkerGuard> {
    match try_init_logging(config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("logging already initialized: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_names() {
        assert_eq!(rotation("hourly"), Rotation::HOURLY);
        assert_eq!(rotation("DAILY"), Rotation::DAILY);
        assert_eq!(rotation("minutely"), Rotation::MINUTELY);
        assert_eq!(rotation("weekly"), Rotation::NEVER);
        assert_eq!(rotation(""), Rotation::NEVER);
    }

    #[test]
    fn test_filter_keeps_configured_level_first() {
        let config = AppConfig::from_yaml(
            "log_level: debug\nlog_dir: logs\nlog_file: t.log\nuse_json: false\nrotation: never\n",
        )
        .unwrap();
        let directives = filter_directives(&config);
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains("sqlx=warn"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }
}
