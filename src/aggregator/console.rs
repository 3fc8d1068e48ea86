//! Human-readable side stream for recorded log entries
//!
//! Every entry written to the `EventStore` is mirrored through the `log`
//! facade under the `labwatch::events` target. This output is purely
//! observational; nothing reads it back.

use crate::events::{LogEntry, LogLevel};
use log::Level;

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

/// Console mirroring settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsoleOutput {
    pub enabled: bool,
    pub color: bool,
}

impl Default for ConsoleOutput {
    fn default() -> Self {
        Self {
            enabled: true,
            color: true,
        }
    }
}

impl ConsoleOutput {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            color: false,
        }
    }

    /// Mirror an entry to the log facade
    pub fn emit(&self, entry: &LogEntry) {
        if !self.enabled {
            return;
        }
        let line = render_line(entry, self.color);
        log::log!(target: "labwatch::events", facade_level(entry.level), "{}", line);
    }
}

fn facade_level(level: LogLevel) -> Level {
    match level {
        LogLevel::Debug => Level::Debug,
        LogLevel::Info => Level::Info,
        LogLevel::Warn => Level::Warn,
        LogLevel::Error | LogLevel::Critical => Level::Error,
    }
}

fn level_color(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "\x1b[90m",
        LogLevel::Info => "\x1b[32m",
        LogLevel::Warn => "\x1b[33m",
        LogLevel::Error => "\x1b[31m",
        LogLevel::Critical => "\x1b[1;35m",
    }
}

/// Render one entry as `[HH:MM:SS.mmm] LEVEL [component] message (extras)`
pub fn render_line(entry: &LogEntry, color: bool) -> String {
    let time = entry.timestamp.format("%H:%M:%S%.3f");
    let level = format!("{:<8}", entry.level.as_str());

    let mut extras = Vec::new();
    if let (Some(method), Some(path)) = (&entry.context.method, &entry.context.path) {
        extras.push(format!("{} {}", method, path));
    }
    if let Some(status) = entry.context.status_code {
        extras.push(status.to_string());
    }
    if let Some(duration) = entry.context.duration_ms {
        extras.push(format!("{:.0}ms", duration));
    }
    if let Some(request_id) = &entry.context.request_id {
        extras.push(format!("req={}", request_id));
    }
    let extras = if extras.is_empty() {
        String::new()
    } else {
        format!(" ({})", extras.join(", "))
    };

    if color {
        format!(
            "{DIM}[{time}]{RESET} {}{level}{RESET} [{}] {}{DIM}{extras}{RESET}",
            level_color(entry.level),
            entry.component,
            entry.message,
        )
    } else {
        format!("[{time}] {level} [{}] {}{extras}", entry.component, entry.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RequestContext;

    fn http_entry() -> LogEntry {
        LogEntry::new(
            LogLevel::Warn,
            "Slow response",
            "HTTP",
            RequestContext {
                method: Some("GET".to_string()),
                path: Some("/projects".to_string()),
                status_code: Some(200),
                duration_ms: Some(2450.0),
                request_id: Some("req-9".to_string()),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_plain_rendering() {
        let line = render_line(&http_entry(), false);
        assert!(line.contains("WARN"));
        assert!(line.contains("[HTTP] Slow response"));
        assert!(line.contains("GET /projects, 200, 2450ms, req=req-9"));
        assert!(!line.contains('\x1b'));
    }

    #[test]
    fn test_colored_rendering_wraps_level() {
        let line = render_line(&http_entry(), true);
        assert!(line.contains("\x1b[33mWARN"));
        assert!(line.ends_with(RESET));
    }

    #[test]
    fn test_rendering_without_extras() {
        let entry = LogEntry::new(LogLevel::Info, "boot", "Core", RequestContext::default());
        let line = render_line(&entry, false);
        assert!(line.ends_with("[Core] boot"));
    }

    #[test]
    fn test_disabled_output_does_not_panic() {
        ConsoleOutput::disabled().emit(&http_entry());
        ConsoleOutput::default().emit(&http_entry());
    }
}
