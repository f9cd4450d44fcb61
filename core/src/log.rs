use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::io::{self, Write};

/// Minimal process-wide console sink. Mirrors what an ops-facing daemon
/// needs (timestamped lines to stderr) without pulling in a logging
/// ecosystem crate.
struct Console {
    err: io::Stderr,
}

impl Console {
    fn new() -> Self {
        Self { err: io::stderr() }
    }

    fn line(&mut self, level: &str, message: &str) {
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let _ = writeln!(self.err, "{now} {level:<5} {message}");
    }
}

static CONSOLE: Lazy<Mutex<Console>> = Lazy::new(|| Mutex::new(Console::new()));

pub fn emit(level: &str, message: std::fmt::Arguments<'_>) {
    CONSOLE.lock().line(level, &message.to_string());
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::log::emit("INFO", format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! warn_log {
    ($($arg:tt)*) => {
        $crate::log::emit("WARN", format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        $crate::log::emit("DEBUG", format_args!($($arg)*))
    };
}
