//! Degraded compatibility mode
//!
//! Used only when the body does not contain a decodable envelope. Each field
//! is pulled out independently so a truncated or mangled body still yields
//! whatever it carries.

use super::ParsedResponse;
use regex::Regex;
use once_cell::sync::Lazy;

pub trait DegradedExtractor: Send + Sync {
    fn extract(&self, raw: &str) -> ParsedResponse;
}

static SUCCESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""success"\s*:\s*(true|false)"#).unwrap());
static MESSAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""message"\s*:\s*"((?:[^"\\]|\\.)*)""#).unwrap());
static ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""id"\s*:\s*(\d+)"#).unwrap());

/// Field-by-field regex extraction.
pub struct RegexExtractor;

impl DegradedExtractor for RegexExtractor {
    fn extract(&self, raw: &str) -> ParsedResponse {
        let flat = raw.replace(['\r', '\n'], "");

        let success = SUCCESS_RE
            .captures(&flat)
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str() == "true");

        let message = MESSAGE_RE
            .captures(&flat)
            .and_then(|cap| cap.get(1))
            .map(|m| unescape(m.as_str()));

        let user_id = ID_RE
            .captures(&flat)
            .and_then(|cap| cap.get(1))
            .and_then(|m| m.as_str().parse::<i64>().ok());

        ParsedResponse {
            success,
            message,
            user_id,
            data: None,
            degraded: true,
        }
    }
}

fn unescape(fragment: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", fragment))
        .unwrap_or_else(|_| fragment.to_string())
}
