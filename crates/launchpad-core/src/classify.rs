//! Line classification for log views.
//!
//! Pure substring matching on a line; rendering is left to the host.

use crate::sink::SYSTEM_PREFIX;

/// Display class of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineKind {
    Info,
    Warn,
    Error,
    System,
    Plain,
}

impl LineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineKind::Info => "info",
            LineKind::Warn => "warn",
            LineKind::Error => "error",
            LineKind::System => "system",
            LineKind::Plain => "plain",
        }
    }
}

const ERROR_MARKERS: &[&str] = &["error", "fatal", "panic", "failed"];
const WARN_MARKERS: &[&str] = &["warn"];
const INFO_MARKERS: &[&str] = &["info"];

/// Classify a line. Launcher lines win over level keywords, errors over
/// warnings, warnings over info.
pub fn classify(line: &str) -> LineKind {
    if line.starts_with(SYSTEM_PREFIX) {
        return LineKind::System;
    }

    let lower = line.to_ascii_lowercase();
    let contains_any = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

    if contains_any(ERROR_MARKERS) {
        LineKind::Error
    } else if contains_any(WARN_MARKERS) {
        LineKind::Warn
    } else if contains_any(INFO_MARKERS) {
        LineKind::Info
    } else {
        LineKind::Plain
    }
}
