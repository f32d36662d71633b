// SPDX-License-Identifier: GPL-3.0-only

use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_LOG_PREFIX: &str = "firmwaregen.log";
const KEEP_DAYS: u64 = 14;

/// Level directive for a `-v` count
pub fn level_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

fn env_filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level_directive(verbosity);
        EnvFilter::try_new(format!(
            "warn,firmwaregen={level},ffu_gen={level},ffu_sys={level},ffu_types={level}"
        ))
        .unwrap_or_else(|_| EnvFilter::new(level))
    })
}

/// Install the global subscriber
///
/// Logs go to stderr, keeping stdout for the produced FFU path. With a log
/// directory, a daily-rolling file copy is written too; the returned guard
/// must be held until the process exits so buffered lines are flushed.
pub fn init(verbosity: u8, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let Some(dir) = log_dir else {
        tracing_subscriber::registry()
            .with(env_filter(verbosity))
            .with(stderr_layer)
            .init();
        return None;
    };

    match file_writer(dir) {
        Ok((writer, guard)) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false);

            tracing_subscriber::registry()
                .with(env_filter(verbosity))
                .with(stderr_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        Err(e) => {
            eprintln!("firmwaregen: failed to initialize file logging: {e:#}");
            tracing_subscriber::registry()
                .with(env_filter(verbosity))
                .with(stderr_layer)
                .init();
            None
        }
    }
}

fn file_writer(
    dir: &Path,
) -> anyhow::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    if let Err(e) = fs::create_dir_all(dir) {
        return Err(anyhow::anyhow!(
            "create log directory failed: {} ({})",
            dir.display(),
            e
        ));
    }

    let prefix = OsString::from(DEFAULT_LOG_PREFIX);
    cleanup_old_logs(dir, &prefix);

    let appender = tracing_appender::rolling::daily(dir, &prefix);
    Ok(tracing_appender::non_blocking(appender))
}

fn cleanup_old_logs(dir: &Path, prefix: &OsString) {
    let cutoff = SystemTime::now().checked_sub(Duration::from_secs(KEEP_DAYS * 24 * 60 * 60));
    let Some(cutoff) = cutoff else { return };

    let prefix = prefix.to_string_lossy();

    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }

        let file_name = entry.file_name();
        // Only touch files created by our rolling appender.
        if !file_name.to_string_lossy().starts_with(prefix.as_ref()) {
            continue;
        }

        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        if modified >= cutoff {
            continue;
        }

        let _ = fs::remove_file(entry.path());
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{cleanup_old_logs, level_directive};

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_directive(0), "info");
        assert_eq!(level_directive(1), "debug");
        assert_eq!(level_directive(7), "trace");
    }

    #[test]
    fn cleanup_keeps_recent_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("firmwaregen.log.2026-10-18"), "recent").unwrap();
        fs::write(dir.path().join("other.txt"), "foreign").unwrap();

        cleanup_old_logs(dir.path(), &"firmwaregen.log".into());

        assert!(dir.path().join("firmwaregen.log.2026-10-18").exists());
        assert!(dir.path().join("other.txt").exists());
    }
}
