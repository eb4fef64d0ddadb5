//! Masking for secrets that would otherwise end up in logs and reports

use regex::Regex;
use once_cell::sync::Lazy;

static SECRET_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (Regex::new(r#"("password"\s*:\s*")[^"]*"#).unwrap(), "${1}******"),
        (Regex::new(r#"("access_token"\s*:\s*")[^"]*"#).unwrap(), "${1}******"),
        (Regex::new(r#"("key"\s*:\s*")[^"]*"#).unwrap(), "${1}******"),
        (Regex::new(r"(?i)((?:set-)?cookie:\s*[^=;\s]+=)[^;\s]+").unwrap(), "${1}******"),
    ]
});

/// Keep the first and last two characters, star out the rest.
pub fn mask_middle(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - 4), tail)
}

/// Star out passwords, tokens, keys and session cookies inside free text.
pub fn redact_secrets(text: &str) -> String {
    SECRET_PATTERNS
        .iter()
        .fold(text.to_string(), |acc, (re, replacement)| {
            re.replace_all(&acc, *replacement).into_owned()
        })
}

/// Star out the value of cookie `name` wherever it appears as `name=value`.
pub fn redact_cookie(text: &str, name: &str) -> String {
    let pattern = format!(r#"((?:^|[\s;,:"']){}=)[^;\s"']+"#, regex::escape(name));
    match Regex::new(&pattern) {
        Ok(re) => re.replace_all(text, "${1}******").into_owned(),
        Err(e) => {
            log::warn!("Cannot build redaction pattern for cookie {}: {}", name, e);
            text.to_string()
        }
    }
}
