//! Response parsing for the upstream's JSON envelope
//!
//! The upstream answers with `{"success": bool, "message": str, "data": ...}`.
//! Bodies are not always clean: some arrive with headers or log noise around
//! the JSON, some are truncated. The parser takes the first balanced object in
//! the text and decodes it against the envelope. When that fails it hands the
//! raw text to a [`DegradedExtractor`], which recovers what it can field by
//! field.

pub mod degraded;

pub use degraded::{DegradedExtractor, RegexExtractor};

use crate::errors::CheckinError;
use serde::Deserialize;
use serde_json::Value;

/// The documented response schema.
#[derive(Debug, Deserialize, Default)]
struct ApiEnvelope {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResponse {
    /// `None` when the body did not say.
    pub success: Option<bool>,
    pub message: Option<String>,
    pub user_id: Option<i64>,
    pub data: Option<Value>,
    /// Set when the fields came from the degraded extractor.
    pub degraded: bool,
}

impl ParsedResponse {
    fn is_empty(&self) -> bool {
        self.success.is_none() && self.message.is_none() && self.user_id.is_none() && self.data.is_none()
    }

    pub fn message_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.message.as_deref().filter(|m| !m.is_empty()).unwrap_or(fallback)
    }
}

pub struct ResponseParser {
    fallback: Box<dyn DegradedExtractor>,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseParser {
    pub fn new() -> Self {
        Self {
            fallback: Box::new(RegexExtractor),
        }
    }

    pub fn with_fallback(fallback: Box<dyn DegradedExtractor>) -> Self {
        Self { fallback }
    }

    pub fn parse(&self, raw: &str) -> Result<ParsedResponse, CheckinError> {
        let start = raw
            .find('{')
            .ok_or_else(|| CheckinError::Parse(format!("No JSON object in response: {}", preview(raw))))?;

        if let Some(object) = first_balanced_object(&raw[start..]) {
            match serde_json::from_str::<ApiEnvelope>(object) {
                Ok(envelope) => {
                    let parsed = Self::from_envelope(envelope);
                    if !parsed.is_empty() {
                        return Ok(parsed);
                    }
                }
                Err(e) => {
                    log::debug!("Strict decode failed ({}), falling back to degraded extraction", e);
                }
            }
        }

        let parsed = self.fallback.extract(raw);
        if parsed.is_empty() {
            return Err(CheckinError::Parse(format!(
                "No recognizable fields in response: {}",
                preview(raw)
            )));
        }
        log::warn!("Response decoded in degraded mode: {}", preview(raw));
        Ok(ParsedResponse { degraded: true, ..parsed })
    }

    fn from_envelope(envelope: ApiEnvelope) -> ParsedResponse {
        let user_id = envelope
            .data
            .as_ref()
            .and_then(|data| data.get("id"))
            .and_then(Value::as_i64)
            .or(envelope.id);

        ParsedResponse {
            success: envelope.success,
            message: envelope.message,
            user_id,
            data: envelope.data,
            degraded: false,
        }
    }
}

/// Slice of `text` (which must start with `{`) up to the matching `}`.
/// Braces inside JSON strings do not count.
pub fn first_balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=idx]);
                }
            }
            _ => {}
        }
    }
    None
}

fn preview(raw: &str) -> String {
    let mut out: String = raw.chars().take(200).collect();
    if raw.chars().count() > 200 {
        out.push_str("...");
    }
    out
}
