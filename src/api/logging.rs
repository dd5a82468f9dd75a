use serde_json::Value;
use std::fs::OpenOptions;
use std::io::{IsTerminal, Write};

use crate::util::parse_bool_flag;

const DEFAULT_LOG_PATH: &str = "/tmp/fragments-debug.log";
const DEBUG_PAYLOAD_ENV: &str = "FRAGMENTS_DEBUG_PAYLOAD";
const LOG_PATH_ENV: &str = "FRAGMENTS_LOG_PATH";
const VERBOSE_ENV: &str = "FRAGMENTS_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

pub fn debug_payload_enabled() -> bool {
    std::env::var(DEBUG_PAYLOAD_ENV)
        .ok()
        .and_then(parse_bool_flag)
        .unwrap_or(false)
}

/// Debug and info records are opt-in; warnings and errors are always written.
pub fn verbose_enabled() -> bool {
    std::env::var(VERBOSE_ENV)
        .ok()
        .and_then(parse_bool_flag)
        .unwrap_or(false)
}

pub fn emit_debug_payload(request_url: &str, payload: &Value) {
    let formatted_payload = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|_| "<payload serialization error>".to_string());
    let message = format!(
        "FRAGMENTS DEBUG payload_request url={request_url}\npayload:\n{formatted_payload}\n"
    );
    emit_log_message(&message);
}

pub fn emit_fragment_parse_error(buffer: &str, parse_error: &serde_json::Error) {
    let message =
        format!("FRAGMENTS ERROR fragment_parse_failed error={parse_error}\ndata:\n{buffer}\n");
    emit_log_message(&message);
}

/// Writes one `FRAGMENTS <LEVEL> <event> key=value ...` line.
pub fn emit_record(level: Level, event: &str, fields: &[(&str, String)]) {
    if matches!(level, Level::Debug | Level::Info) && !verbose_enabled() {
        return;
    }
    emit_log_message(&format_record(level, event, fields));
}

fn format_record(level: Level, event: &str, fields: &[(&str, String)]) -> String {
    let mut line = format!("FRAGMENTS {} {event}", level.as_str());
    for (key, value) in fields {
        if value.contains(char::is_whitespace) {
            line.push_str(&format!(" {key}={value:?}"));
        } else {
            line.push_str(&format!(" {key}={value}"));
        }
    }
    line.push('\n');
    line
}

fn emit_log_message(message: &str) {
    if let Some(path) = resolve_log_path() {
        if append_log_file(&path, message).is_ok() {
            return;
        }
    }

    eprint!("{message}");
}

fn resolve_log_path() -> Option<String> {
    std::env::var(LOG_PATH_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            if std::io::stderr().is_terminal() {
                Some(DEFAULT_LOG_PATH.to_string())
            } else {
                None
            }
        })
}

fn append_log_file(path: &str, message: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(message.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_payload_enabled_accepts_true_variants() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::set_var(DEBUG_PAYLOAD_ENV, "1");
        assert!(debug_payload_enabled());
        std::env::set_var(DEBUG_PAYLOAD_ENV, "TRUE");
        assert!(debug_payload_enabled());
        std::env::remove_var(DEBUG_PAYLOAD_ENV);
        assert!(!debug_payload_enabled());
    }

    #[test]
    fn test_resolve_log_path_uses_env_override() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::set_var(LOG_PATH_ENV, "/tmp/fragments-test.log");
        assert_eq!(resolve_log_path().as_deref(), Some("/tmp/fragments-test.log"));
        std::env::remove_var(LOG_PATH_ENV);
    }

    #[test]
    fn test_format_record_quotes_values_with_spaces() {
        let line = format_record(
            Level::Warn,
            "sandbox_failed",
            &[
                ("cycle", "3".to_string()),
                ("error", "HTTP 500 boom".to_string()),
            ],
        );
        assert_eq!(
            line,
            "FRAGMENTS WARN sandbox_failed cycle=3 error=\"HTTP 500 boom\"\n"
        );
    }
}
