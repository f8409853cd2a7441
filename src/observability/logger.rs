//! Structured JSON-lines logger
//!
//! - One line per event, written to stderr in a single write
//! - `event` first, then `severity`, then fields sorted by key
//! - Lines below the process-wide threshold are dropped; the threshold
//!   starts at `GPKGDB_LOG` (trace/info/warn/error/off) or INFO

use std::env;
use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Once;

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Scope begin markers
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Degraded but continuing (lenient-mode substitutions, rejected queries)
    Warn = 2,
    /// Operation failures
    Error = 3,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }

    /// Case-insensitive level name
    pub fn parse(s: &str) -> Option<Severity> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(Severity::Trace),
            "info" => Some(Severity::Info),
            "warn" | "warning" => Some(Severity::Warn),
            "error" => Some(Severity::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sentinel above every severity: logging off
const OFF: u8 = u8::MAX;

static THRESHOLD: AtomicU8 = AtomicU8::new(Severity::Info as u8);
static THRESHOLD_FROM_ENV: Once = Once::new();

/// Process-wide structured logger
pub struct Logger;

impl Logger {
    /// Drops lines below `severity`; `None` silences the logger
    pub fn set_threshold(severity: Option<Severity>) {
        THRESHOLD_FROM_ENV.call_once(|| {});
        THRESHOLD.store(severity.map_or(OFF, |s| s as u8), Ordering::Relaxed);
    }

    pub fn enabled(severity: Severity) -> bool {
        THRESHOLD_FROM_ENV.call_once(|| {
            if let Ok(level) = env::var("GPKGDB_LOG") {
                let threshold = if level.eq_ignore_ascii_case("off") {
                    OFF
                } else {
                    Severity::parse(&level).unwrap_or(Severity::Info) as u8
                };
                THRESHOLD.store(threshold, Ordering::Relaxed);
            }
        });
        severity as u8 >= THRESHOLD.load(Ordering::Relaxed)
    }

    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if !Self::enabled(severity) {
            return;
        }
        let line = Self::format_line(severity, event, fields);
        let mut stderr = io::stderr().lock();
        // Logging never fails an operation
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }

    pub fn trace(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Trace, event, fields);
    }

    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Error, event, fields);
    }

    /// One newline-terminated JSON object
    fn format_line(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
        let mut line = String::with_capacity(64 + fields.len() * 32);
        line.push_str("{\"event\":");
        push_json_string(&mut line, event);
        line.push_str(",\"severity\":\"");
        line.push_str(severity.as_str());
        line.push('"');

        let mut sorted: Vec<&(&str, &str)> = fields.iter().collect();
        sorted.sort_by_key(|(k, _)| *k);
        for (key, value) in sorted {
            line.push(',');
            push_json_string(&mut line, key);
            line.push(':');
            push_json_string(&mut line, value);
        }
        line.push_str("}\n");
        line
    }
}

fn push_json_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}
