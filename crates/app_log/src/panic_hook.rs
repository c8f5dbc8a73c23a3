//! Crash reporting

use backtrace::Backtrace;
use chrono::{DateTime, Local};
use std::fmt;
use std::panic::PanicHookInfo;
use std::path::{Path, PathBuf};

/// Install a hook that reports panics to stderr, the log and a dump file in
/// `dump_dir`
pub fn init_panic_hook(dump_dir: PathBuf) {
    std::panic::set_hook(Box::new(move |info| {
        let report = CrashReport::capture(info);
        eprintln!("{}", report);
        // the file writer may already be gone
        tracing::error!("{}", report);

        match report.write_dump(&dump_dir) {
            Ok(path) => eprintln!("Crash dump written to {}", path.display()),
            Err(e) => eprintln!("Failed to write crash dump: {}", e),
        }
    }));
    tracing::debug!("Panic hook installed");
}

struct CrashReport {
    time: DateTime<Local>,
    thread: String,
    location: String,
    message: String,
    backtrace: Backtrace,
}

impl CrashReport {
    fn capture(info: &PanicHookInfo) -> Self {
        Self {
            time: Local::now(),
            thread: std::thread::current()
                .name()
                .unwrap_or("<unnamed>")
                .to_string(),
            location: info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_else(|| "<unknown>".to_string()),
            message: payload_message(info.payload()).to_string(),
            backtrace: Backtrace::new(),
        }
    }

    fn write_dump(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "nestfiler_crash_{}.txt",
            self.time.format("%Y%m%d_%H%M%S")
        ));
        std::fs::write(&path, self.to_string())?;
        Ok(path)
    }
}

impl fmt::Display for CrashReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== NestFiler {} crashed ===", env!("CARGO_PKG_VERSION"))?;
        writeln!(f, "Time:     {}", self.time.to_rfc3339())?;
        writeln!(f, "Thread:   {}", self.thread)?;
        writeln!(f, "Location: {}", self.location)?;
        writeln!(f, "Message:  {}", self.message)?;
        write!(f, "\n{:?}", self.backtrace)
    }
}

fn payload_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string payload>")
}
