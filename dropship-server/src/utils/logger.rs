//! Logging Infrastructure
//!
//! Console output plus, when a log directory is configured, three daily
//! rotated files:
//!
//! - `app/`      everything except the two targets below (pruned after 14 days)
//! - `audit/`    `target: "audit"` (price holds, approvals, significant changes)
//! - `security/` `target: "security"` (signature rejections, unknown suppliers)

use std::fs;
use std::path::{Path, PathBuf};
use tracing::Subscriber;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

const APP_LOG_RETENTION_DAYS: i64 = 14;

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Delete `app-YYYY-MM-DD*` files older than the retention window
pub fn cleanup_old_logs(log_dir: &Path) -> anyhow::Result<()> {
    let cutoff = chrono::Local::now().date_naive() - chrono::Duration::days(APP_LOG_RETENTION_DAYS);
    let app_dir = log_dir.join("app");
    if !app_dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(app_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        // rolling appender names files app.YYYY-MM-DD
        let Some(date) = name
            .strip_prefix("app.")
            .and_then(|d| chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        else {
            continue;
        };
        if date < cutoff {
            fs::remove_file(&path)?;
            tracing::info!(file = %name, "Deleted old log file");
        }
    }
    Ok(())
}

fn file_layer<S>(
    dir: PathBuf,
    prefix: &'static str,
    json: bool,
    keep: fn(&str) -> bool,
) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let appender = RollingFileAppender::new(Rotation::DAILY, dir, prefix);
    let filter = tracing_subscriber::filter::filter_fn(move |meta| keep(meta.target()));
    let layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(appender));
    if json {
        layer.json().with_current_span(true).with_filter(filter).boxed()
    } else {
        layer.with_filter(filter).boxed()
    }
}

/// Initialize the logging system
///
/// # Arguments
/// * `level` - default filter when `RUST_LOG` is unset (e.g. "info", "dropship_server=debug")
/// * `json_format` - JSON lines instead of the pretty format
/// * `log_dir` - optional directory for the rotated log files
pub fn init_logger_with_file(
    level: &str,
    json_format: bool,
    log_dir: Option<&str>,
) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let mut layers: Vec<BoxedLayer<_>> = Vec::new();
    layers.push(if json_format {
        fmt::layer().json().with_target(true).with_current_span(true).boxed()
    } else {
        fmt::layer().with_target(true).with_line_number(true).boxed()
    });

    if let Some(dir) = log_dir {
        let log_dir = Path::new(dir);
        let app_dir = log_dir.join("app");
        let audit_dir = log_dir.join("audit");
        let security_dir = log_dir.join("security");
        for d in [&app_dir, &audit_dir, &security_dir] {
            fs::create_dir_all(d)?;
        }

        layers.push(file_layer(app_dir, "app", json_format, |t| {
            t != "audit" && t != "security"
        }));
        layers.push(file_layer(audit_dir, "audit", json_format, |t| t == "audit"));
        layers.push(file_layer(security_dir, "security", json_format, |t| {
            t == "security"
        }));

        tokio::spawn(periodic_cleanup(log_dir.to_path_buf()));
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()?;
    Ok(())
}

/// Console only
pub fn init_logger(level: &str, json_format: bool) -> anyhow::Result<()> {
    init_logger_with_file(level, json_format, None)
}

/// Runs hourly
async fn periodic_cleanup(log_dir: PathBuf) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(3600));
    loop {
        ticker.tick().await;
        if let Err(e) = cleanup_old_logs(&log_dir) {
            tracing::error!(error = %e, "Failed to cleanup old logs");
        }
    }
}

/// Security log helper. Records land in the `security/` files.
///
/// ```ignore
/// security_log!(WARN, "webhook_signature_rejected", supplier_id = 7);
/// ```
#[macro_export]
macro_rules! security_log {
    (WARN, $event:expr, $($arg:tt)*) => {
        tracing::warn!(
            target: "security",
            event = $event,
            level = "WARN",
            $($arg)*
        );
    };
    (ERROR, $event:expr, $($arg:tt)*) => {
        tracing::error!(
            target: "security",
            event = $event,
            level = "ERROR",
            $($arg)*
        );
    };
    (INFO, $event:expr, $($arg:tt)*) => {
        tracing::info!(
            target: "security",
            event = $event,
            level = "INFO",
            $($arg)*
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_removes_only_expired_app_logs() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("app");
        fs::create_dir_all(&app).unwrap();
        let old = (chrono::Local::now().date_naive() - chrono::Duration::days(30)).format("%Y-%m-%d");
        let today = chrono::Local::now().date_naive().format("%Y-%m-%d");
        fs::write(app.join(format!("app.{old}")), "x").unwrap();
        fs::write(app.join(format!("app.{today}")), "x").unwrap();
        fs::write(app.join("notes.txt"), "x").unwrap();

        cleanup_old_logs(dir.path()).unwrap();

        assert!(!app.join(format!("app.{old}")).exists());
        assert!(app.join(format!("app.{today}")).exists());
        assert!(app.join("notes.txt").exists());
    }
}
