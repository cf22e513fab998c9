// SPDX-License-Identifier: GPL-3.0-only

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const DEFAULT_DIRECTIVE: &str = "warn";

/// Filter directives: `-v` and `-vv` win over `RUST_LOG`, which wins over the
/// configuration file
fn directives(verbose: u8, configured: Option<&str>) -> String {
    match verbose {
        0 => std::env::var("RUST_LOG")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| configured.map(str::to_string))
            .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string()),
        1 => "info".to_string(),
        _ => "debug".to_string(),
    }
}

pub(crate) fn init(verbose: u8, config: Option<&LoggingConfig>) {
    let configured = config.and_then(|config| config.filter.as_deref());
    let env_filter = EnvFilter::try_new(directives(verbose, configured)).unwrap_or_else(|e| {
        eprintln!("ubackup: invalid log filter, using {DEFAULT_DIRECTIVE}: {e}");
        EnvFilter::new(DEFAULT_DIRECTIVE)
    });

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::SystemTime);

    let file_layer = match config.and_then(|config| config.file.as_deref()).map(file_writer) {
        Some(Ok((writer, guard))) => {
            // Keep the background logging worker alive for the duration of the process.
            let _ = LOG_GUARD.set(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_ansi(false)
                    .with_timer(tracing_subscriber::fmt::time::SystemTime),
            )
        }
        Some(Err(e)) => {
            eprintln!("ubackup: failed to initialize file logging: {e:#}");
            None
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
}

fn file_writer(path: &Path) -> anyhow::Result<(NonBlocking, WorkerGuard)> {
    let (dir, file_name) = split_log_path(path)?;
    if let Err(e) = fs::create_dir_all(&dir) {
        return Err(anyhow::anyhow!(
            "create log directory failed: {} ({})",
            dir.display(),
            e
        ));
    }

    let appender = tracing_appender::rolling::never(&dir, &file_name);
    Ok(tracing_appender::non_blocking(appender))
}

fn split_log_path(path: &Path) -> anyhow::Result<(PathBuf, OsString)> {
    let file_name = path
        .file_name()
        .map(OsString::from)
        .ok_or_else(|| anyhow::anyhow!("log file {} has no file name", path.display()))?;
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((dir, file_name))
}
