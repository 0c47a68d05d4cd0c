//! Built-in status extractors.
//!
//! Extractors are pure functions from a response body and HTTP status code
//! to a [`Status`]. They compose with [`first_match`], which tries each
//! extractor in turn until one returns something other than
//! [`Status::Unknown`].

use std::sync::Arc;

use crate::status::{Status, StatusExtractor};

/// Maps an HTTP status code to a [`Status`], ignoring the body.
///
/// 2xx → up, 4xx → degraded, anything else → down.
pub fn http_status_to_status(status_code: u16) -> Status {
    match status_code {
        200..=299 => Status::Up,
        400..=499 => Status::Degraded,
        _ => Status::Down,
    }
}

/// Extractor over [`http_status_to_status`].
///
/// Useful for simple health endpoints that return 200 OK when healthy.
pub fn http_status_extractor() -> StatusExtractor {
    Arc::new(|_body, status_code| http_status_to_status(status_code))
}

/// Extractor that reads a JSON field using dot notation.
///
/// `path` navigates nested objects: `"data.health.status"` reaches into
/// `{"data": {"health": {"status": "ok"}}}`. The extracted value is mapped
/// with common health-check conventions (see [`map_health_word`]). Returns
/// [`Status::Unknown`] if the body is not JSON or the field is missing.
pub fn json_field_extractor(path: &str) -> StatusExtractor {
    let parts: Vec<String> = path.split('.').map(str::to_string).collect();

    Arc::new(move |body, _status_code| {
        let data: serde_json::Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(_) => return Status::Unknown,
        };

        let value = extract_json_path(&data, &parts);
        if value.is_empty() {
            return Status::Unknown;
        }

        map_health_word(&value.to_lowercase())
    })
}

/// Walks a JSON structure along dot-notation parts, stringifying the leaf.
fn extract_json_path(data: &serde_json::Value, parts: &[String]) -> String {
    let mut current = data;
    for part in parts {
        match current.get(part) {
            Some(next) => current = next,
            None => return String::new(),
        }
    }

    match current {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(f) if f == 0.0 => "false".to_string(),
            Some(f) if f == 1.0 => "true".to_string(),
            Some(f) => f.to_string(),
            None => String::new(),
        },
        _ => String::new(),
    }
}

/// Maps common health-check vocabulary to a [`Status`].
///
/// Up: "ok", "healthy", "up", "active", "running", "pass", "passed",
/// "true", "green", "none", "operational". Degraded: "degraded",
/// "warning", "partial", "yellow", "amber". Anything else is down.
pub fn map_health_word(s: &str) -> Status {
    match s {
        "ok" | "healthy" | "up" | "active" | "running" | "pass" | "passed" | "true" | "green"
        | "none" | "operational" => Status::Up,
        "degraded" | "warning" | "partial" | "yellow" | "amber" => Status::Degraded,
        _ => Status::Down,
    }
}

/// Extractor that matches the body against a regex with one capture group.
///
/// The first capture is compared case-insensitively against `up_match`:
/// equal → up, not equal → down, no match → unknown. Fails fast on an
/// invalid pattern.
pub fn regex_extractor(pattern: &str, up_match: &str) -> Result<StatusExtractor, regex::Error> {
    let re = regex::bytes::Regex::new(pattern)?;
    let up_match = up_match.to_lowercase();

    Ok(Arc::new(move |body, _status_code| {
        let captures = match re.captures(body) {
            Some(c) => c,
            None => return Status::Unknown,
        };
        let captured = match captures.get(1) {
            Some(m) => m.as_bytes(),
            None => return Status::Unknown,
        };
        if String::from_utf8_lossy(captured).to_lowercase() == up_match {
            Status::Up
        } else {
            Status::Down
        }
    }))
}

/// Extractor that checks whether the body contains `text`
/// (case-insensitive). Contains → up, otherwise down.
pub fn contains_extractor(text: &str) -> StatusExtractor {
    let lower = text.to_lowercase();
    Arc::new(move |body, _status_code| {
        if String::from_utf8_lossy(body).to_lowercase().contains(&lower) {
            Status::Up
        } else {
            Status::Down
        }
    })
}

/// Tries extractors in order, returning the first non-unknown result.
pub fn first_match(extractors: Vec<StatusExtractor>) -> StatusExtractor {
    Arc::new(move |body, status_code| {
        for extractor in &extractors {
            let status = extractor(body, status_code);
            if status != Status::Unknown {
                return status;
            }
        }
        Status::Unknown
    })
}

/// Default extractor: a JSON `status` field if present, otherwise the HTTP
/// status code.
pub fn default_extractor() -> StatusExtractor {
    first_match(vec![json_field_extractor("status"), http_status_extractor()])
}
