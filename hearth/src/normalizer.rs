//! Pure byte-to-`LogEntry` classification. No I/O, no shared state: every
//! strategy below either matches and returns, or falls through to the next.
//! Nothing in this module can fail outward -- an unrecognized or malformed
//! line always produces the raw-fallback entry.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use hearth_protocol::{EntryType, LogEntry, Severity};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static STD_LOG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2})\s+([A-Z]+)\s+(.*)$").expect("valid regex")
});

static SQL_TRACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[(\d+\.\d+ms)\] \[rows:(\d+)\] (.*)$").expect("valid regex"));

static OCR_RESPONSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"OCR response for ([A-Z0-9]+): \{(.+)\}").expect("valid regex"));

const MESSAGE_KEYS: &[&str] = &["message", "msg", "content", "text", "body", "uri"];
const SERVICE_KEYS: &[&str] = &["service", "app", "application", "name", "service_name"];
const SEVERITY_KEYS: &[&str] = &["level", "severity", "log_level", "type"];
const TIMESTAMP_KEYS: &[&str] = &["timestamp", "time", "@timestamp", "ts", "created_at"];

/// Normalize a single already-framed line into a structured entry.
///
/// Deterministic: `normalize(b) == normalize(b)` for any input, modulo the
/// wall-clock timestamp stamped on the few fallback paths that have no
/// timestamp of their own.
pub fn normalize(raw: &[u8]) -> LogEntry {
    let raw_str = String::from_utf8_lossy(raw);
    let trimmed = raw_str.trim();

    if trimmed.starts_with('{') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
            return normalize_json(map, trimmed);
        }
    }

    if let Some(captures) = STD_LOG_RE.captures(trimmed) {
        return normalize_std(&captures, trimmed);
    }

    if let Some(captures) = SQL_TRACE_RE.captures(trimmed) {
        return normalize_sql(&captures, trimmed);
    }

    normalize_fallback(trimmed)
}

fn looks_like_http_access_log(map: &Map<String, Value>) -> bool {
    map.contains_key("status") || map.contains_key("uri") || map.contains_key("latency_human")
}

fn normalize_json(map: Map<String, Value>, raw: &str) -> LogEntry {
    let mut message = first_string_field(&map, MESSAGE_KEYS, "uri", "HTTP ");

    let mut service = SERVICE_KEYS
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
        .map(str::to_owned);
    if service.is_none() && looks_like_http_access_log(&map) {
        service = Some("API".to_owned());
    }

    let explicit_severity = SEVERITY_KEYS
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str));
    let mut severity = explicit_severity
        .map(Severity::parse)
        .unwrap_or(Severity::Info);

    let timestamp = TIMESTAMP_KEYS
        .iter()
        .find_map(|key| map.get(*key))
        .and_then(parse_timestamp_value)
        .unwrap_or_else(Utc::now);

    if explicit_severity.is_none() {
        if let Some(status) = map.get("status").and_then(Value::as_i64) {
            if status >= 500 {
                severity = Severity::Error;
            } else if status >= 400 {
                severity = Severity::Warn;
            }
        }
    }

    let mut metadata = map.clone();
    if let Some(latency) = map.get("latency_human").cloned() {
        metadata.insert("latency".to_owned(), latency);
    }

    if message.is_none() {
        message = Some(raw.to_owned());
    }

    LogEntry {
        timestamp,
        service: service.unwrap_or_else(|| "unknown".to_owned()),
        severity,
        message: message.unwrap_or_else(|| raw.to_owned()),
        entry_type: EntryType::Json,
        metadata,
        raw: Some(raw.to_owned()),
    }
}

fn first_string_field(
    map: &Map<String, Value>,
    keys: &[&str],
    prefix_key: &str,
    prefix: &str,
) -> Option<String> {
    for key in keys {
        if let Some(value) = map.get(*key).and_then(Value::as_str) {
            return Some(if *key == prefix_key {
                format!("{prefix}{value}")
            } else {
                value.to_owned()
            });
        }
    }
    None
}

fn parse_timestamp_value(value: &Value) -> Option<DateTime<Utc>> {
    if let Some(s) = value.as_str() {
        return parse_timestamp_str(s);
    }
    if let Some(n) = value.as_i64() {
        return Some(epoch_from_number(n));
    }
    if let Some(n) = value.as_f64() {
        return Some(epoch_from_number(n as i64));
    }
    None
}

fn epoch_from_number(n: i64) -> DateTime<Utc> {
    if n.unsigned_abs() as i128 > 1_000_000_000_000 {
        Utc.timestamp_millis_opt(n).single().unwrap_or_else(Utc::now)
    } else {
        Utc.timestamp_opt(n, 0).single().unwrap_or_else(Utc::now)
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

fn normalize_std(captures: &regex::Captures<'_>, raw: &str) -> LogEntry {
    let ts_str = &captures[1];
    let severity_token = &captures[2];
    let body = captures[3].to_owned();

    let timestamp = NaiveDateTime::parse_from_str(ts_str, "%Y/%m/%d %H:%M:%S")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or_else(|_| Utc::now());

    let mut severity = Severity::parse(severity_token);

    let (service, message) = extract_service_from_body(&body);
    let service = if service.is_empty() {
        "unknown".to_owned()
    } else {
        service
    };
    let message = if message.is_empty() {
        raw.to_owned()
    } else {
        message
    };

    let mut metadata = Map::new();

    let is_ocr = service.eq_ignore_ascii_case("OCR") || message.contains("OCR response");
    if is_ocr {
        if let Some(ocr_captures) = OCR_RESPONSE_RE.captures(&message) {
            let shipment_id = &ocr_captures[1];
            let status_blob = &ocr_captures[2];
            metadata.insert("shipment_id".to_owned(), Value::from(shipment_id));
            if status_blob.contains("Status:success") {
                metadata.insert("ocr_status".to_owned(), Value::from("success"));
            } else {
                metadata.insert("ocr_status".to_owned(), Value::from("failed"));
                severity = Severity::Error;
            }
        }
    }

    if message.contains("SLOW SQL") {
        severity = Severity::Warn;
        metadata.insert("alert".to_owned(), Value::from("slow_sql"));
    }

    LogEntry {
        timestamp,
        service,
        severity,
        message,
        entry_type: EntryType::Std,
        metadata,
        raw: Some(raw.to_owned()),
    }
}

fn extract_service_from_body(body: &str) -> (String, String) {
    if let Some(rest) = body.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            let service = rest[..end].to_owned();
            let message = rest[end + 1..].trim().to_owned();
            return (service, message);
        }
    }

    if let Some((first, remainder)) = body.split_once(' ') {
        if let Some(service) = first.strip_suffix(':') {
            return (service.to_owned(), remainder.to_owned());
        }
    }

    let first_token = body.split_whitespace().next().unwrap_or(body);
    (first_token.to_owned(), body.to_owned())
}

fn normalize_sql(captures: &regex::Captures<'_>, raw: &str) -> LogEntry {
    let latency = &captures[1];
    let rows = &captures[2];
    let query = &captures[3];

    let mut metadata = Map::new();
    metadata.insert("latency".to_owned(), Value::from(latency));
    metadata.insert("rows".to_owned(), Value::from(rows));

    LogEntry {
        timestamp: Utc::now(),
        service: "DB".to_owned(),
        severity: Severity::Warn,
        message: format!("SQL: {query}"),
        entry_type: EntryType::Sql,
        metadata,
        raw: Some(raw.to_owned()),
    }
}

fn normalize_fallback(trimmed: &str) -> LogEntry {
    let upper = trimmed.to_ascii_uppercase();
    let severity = if upper.contains("ERROR") || upper.contains("ERRO") {
        Severity::Error
    } else if upper.contains("WARN") {
        Severity::Warn
    } else if upper.contains("DEBUG") {
        Severity::Debug
    } else {
        Severity::Info
    };

    LogEntry {
        timestamp: Utc::now(),
        service: "unknown".to_owned(),
        severity,
        message: trimmed.to_owned(),
        entry_type: EntryType::Raw,
        metadata: Map::new(),
        raw: Some(trimmed.to_owned()),
    }
}
