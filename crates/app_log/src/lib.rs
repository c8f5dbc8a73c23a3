//! NestFiler Logging & Observability Module
//!
//! Provides structured logging, panic handling, crash reports, and deadlock detection.

mod logging;
mod panic_hook;

pub use logging::{cleanup_old_logs, init_logging, LOG_FILE_PREFIX};
pub use panic_hook::init_panic_hook;
pub use tracing_appender::non_blocking::WorkerGuard;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[log]` configuration section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Days to keep rolled log files
    pub retention_days: u32,
    /// Overrides the per-user log directory
    pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            retention_days: 7,
            dir: None,
        }
    }
}

impl LogConfig {
    /// Effective log directory
    pub fn directory(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(log_dir)
    }
}

/// Get the application log directory
pub fn log_dir() -> PathBuf {
    ProjectDirs::from("com", "NestFiler", "NestFiler")
        .map(|dirs| dirs.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("./logs"))
}

/// Initialize all observability features
pub fn init(config: &LogConfig) -> anyhow::Result<WorkerGuard> {
    let guard = init_logging(config)?;
    init_panic_hook(config.directory());

    if let Err(e) = cleanup_old_logs(&config.directory(), config.retention_days) {
        tracing::warn!("Log cleanup failed: {}", e);
    }

    #[cfg(debug_assertions)]
    init_deadlock_detector();

    Ok(guard)
}

#[cfg(debug_assertions)]
fn init_deadlock_detector() {
    use std::thread;
    use std::time::Duration;

    let spawned = thread::Builder::new()
        .name("deadlock-detector".into())
        .spawn(|| loop {
            thread::sleep(Duration::from_secs(10));
            let deadlocks = parking_lot::deadlock::check_deadlock();
            if deadlocks.is_empty() {
                continue;
            }
            tracing::error!("{} deadlock(s) detected", deadlocks.len());
            for (i, threads) in deadlocks.iter().enumerate() {
                tracing::error!("Deadlock #{}", i);
                for t in threads {
                    tracing::error!("Thread Id {:#?}", t.thread_id());
                    tracing::error!("{:#?}", t.backtrace());
                }
            }
        });

    if let Err(e) = spawned {
        tracing::warn!("Deadlock detector not started: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_from_toml() {
        let config: LogConfig = toml::from_str("level = \"debug\"\n").unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.directory(), log_dir());

        let config: LogConfig = toml::from_str("dir = \"/var/log/nf\"\n").unwrap();
        assert_eq!(config.directory(), PathBuf::from("/var/log/nf"));
    }
}
