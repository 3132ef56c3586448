// hearth-protocol: wire types shared between the ingestion pipeline, the
// broadcast hub, and viewer sessions.
//
// `LogEntry` is the normalized record published to the Bus and replayed
// verbatim (as JSON) to every connected viewer. Nothing here performs I/O;
// this crate only describes what crosses a wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Severity classification for a normalized log entry.
///
/// Serializes as an upper-case token. An unrecognized level string
/// round-trips through `Other` instead of being rejected -- the Normalizer
/// never fails on an unfamiliar level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
    Debug,
    Fatal,
    Other(String),
}

impl Severity {
    /// Parse a severity token case-insensitively. Always succeeds.
    pub fn parse(token: &str) -> Self {
        match token.to_ascii_uppercase().as_str() {
            "INFO" => Severity::Info,
            "WARN" | "WARNING" => Severity::Warn,
            "ERROR" | "ERRO" => Severity::Error,
            "DEBUG" => Severity::Debug,
            "FATAL" => Severity::Fatal,
            other => Severity::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Debug => "DEBUG",
            Severity::Fatal => "FATAL",
            Severity::Other(s) => s,
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Info
    }
}

impl Serialize for Severity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Severity::parse(&s))
    }
}

/// Normalizer strategy tag, carried on every entry as `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Json,
    Std,
    Sql,
    Raw,
}

/// A normalized log record: the shape published to the Bus and replayed to
/// every connected viewer.
///
/// Invariants upheld by the Normalizer that constructs this type (never by
/// `serde` alone): `timestamp` is never the Unix epoch zero value, `message`
/// is non-empty after normalization, and `severity` is always an upper-case
/// token (enforced structurally -- `Severity` only serializes upper-case).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub severity: Severity,
    pub message: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl LogEntry {
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Success envelope for the HTTP surface: `{"message": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl SuccessBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(message: impl Into<String>, data: Value) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
        }
    }
}

/// Failure envelope for the HTTP surface: `{"message": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureBody {
    pub message: String,
}

impl FailureBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
