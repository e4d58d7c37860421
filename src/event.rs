use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::io::BufRead;
use std::str::FromStr;
use thiserror::Error;

use crate::filter::QUOTE_CHARS;

/// Errors raised while decoding an incoming event
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Invalid event JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Event must be a JSON object")]
    NotAnObject,

    #[error("Unknown event level '{0}'")]
    UnknownLevel(String),

    #[error("Invalid event timestamp '{0}'")]
    InvalidTimestamp(String),
}

/// Severity of a log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Level {
    Verbose,
    Debug,
    #[default]
    Information,
    Warning,
    Error,
    Fatal,
}

impl Level {
    /// Canonical severity name, the text filters compare against
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Verbose => "Verbose",
            Level::Debug => "Debug",
            Level::Information => "Information",
            Level::Warning => "Warning",
            Level::Error => "Error",
            Level::Fatal => "Fatal",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "verbose" | "vrb" | "trace" | "trc" => Ok(Level::Verbose),
            "debug" | "dbg" => Ok(Level::Debug),
            "information" | "info" | "inf" => Ok(Level::Information),
            "warning" | "warn" | "wrn" => Ok(Level::Warning),
            "error" | "err" | "eror" => Ok(Level::Error),
            "fatal" | "ftl" | "critical" => Ok(Level::Fatal),
            _ => Err(EventError::UnknownLevel(s.to_string())),
        }
    }
}

/// A structured log event as delivered by the host
#[derive(Debug, Clone, Default)]
pub struct LogEvent {
    pub timestamp: Option<DateTime<Utc>>,
    pub level: Level,
    pub message_template: String,
    /// Event properties; values may be strings, numbers or structured JSON
    pub properties: BTreeMap<String, Value>,
}

impl LogEvent {
    pub fn new(level: Level, message_template: impl Into<String>) -> Self {
        Self {
            timestamp: None,
            level,
            message_template: message_template.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Look up a property; a JSON `null` counts as absent
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name).filter(|v| !v.is_null())
    }

    /// Rendered text of a property with surrounding quote characters stripped
    pub fn property_text(&self, name: &str) -> Option<String> {
        self.property(name).map(|v| match v {
            Value::String(s) => s.trim_matches(QUOTE_CHARS).to_string(),
            other => other.to_string().trim_matches(QUOTE_CHARS).to_string(),
        })
    }
}

/// Parse one compact JSON log event line.
///
/// `@t` is the timestamp, `@l` the level (Information when absent) and `@mt`
/// or `@m` the message. Every other key becomes a property.
pub fn parse_event_line(line: &str) -> Result<LogEvent, EventError> {
    let value: Value = serde_json::from_str(line)?;
    let Value::Object(fields) = value else {
        return Err(EventError::NotAnObject);
    };

    event_from_fields(fields)
}

fn event_from_fields(fields: Map<String, Value>) -> Result<LogEvent, EventError> {
    let mut event = LogEvent::default();

    for (key, value) in fields {
        match key.as_str() {
            "@t" => {
                let raw = value.as_str().unwrap_or_default();
                let parsed = DateTime::parse_from_rfc3339(raw)
                    .map_err(|_| EventError::InvalidTimestamp(raw.to_string()))?;
                event.timestamp = Some(parsed.with_timezone(&Utc));
            }
            "@l" => {
                let raw = value.as_str().unwrap_or_default();
                event.level = raw.parse()?;
            }
            "@mt" => {
                event.message_template = value.as_str().unwrap_or_default().to_string();
            }
            "@m" => {
                if event.message_template.is_empty() {
                    event.message_template = value.as_str().unwrap_or_default().to_string();
                }
            }
            "@x" | "@i" | "@r" => {}
            _ => {
                event.properties.insert(key, value);
            }
        }
    }

    Ok(event)
}

/// Read events line by line, handing each decoded event to `on_event`.
///
/// Blank lines are ignored; undecodable lines are logged and skipped. Returns
/// the number of lines that failed to decode.
pub fn read_events<R, F>(reader: R, mut on_event: F) -> std::io::Result<usize>
where
    R: BufRead,
    F: FnMut(LogEvent),
{
    let mut rejected = 0;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match parse_event_line(&line) {
            Ok(event) => on_event(event),
            Err(e) => {
                rejected += 1;
                tracing::warn!(line = index + 1, error = %e, "skipping undecodable event");
            }
        }
    }

    Ok(rejected)
}
