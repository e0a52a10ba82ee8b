//! Parsing of classifier responses.
//!
//! Models often wrap the JSON document in prose or code fences, so the first
//! balanced `{...}` object is located with a scan that understands JSON
//! strings before the document is decoded into [`ClassificationResponse`].

use serde::{Deserialize, Deserializer};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassificationParseError {
    #[error("Empty response")]
    EmptyResponse,

    #[error("No JSON found")]
    NoJsonObject,

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
}

/// The document the model is instructed to return.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationResponse {
    #[serde(default)]
    pub classifications: Vec<RawClassification>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawClassification {
    pub transaction_index: i64,
    pub reasoning: String,
    #[serde(deserialize_with = "account_code")]
    pub account: String,
    pub confidence: f64,
}

/// Account codes are strings, but models sometimes emit them as numbers.
fn account_code<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Code::deserialize(deserializer)? {
        Code::Text(s) => s,
        Code::Number(n) => n.to_string(),
    })
}

/// Returns the first balanced JSON object in `text`, if any.
///
/// Braces inside string literals (including escaped quotes) are ignored. When
/// an opening brace is never closed the scan restarts at the next one.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut start = 0;

    while let Some(offset) = text[start..].find('{') {
        let open = start + offset;
        if let Some(close) = matching_brace(bytes, open) {
            return Some(&text[open..=close]);
        }
        start = open + 1;
    }

    None
}

fn matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

/// Extracts and decodes the classifications, sorted by `transaction_index`.
pub fn parse_classifications(
    text: Option<&str>,
) -> Result<Vec<RawClassification>, ClassificationParseError> {
    let text = text
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ClassificationParseError::EmptyResponse)?;

    let object = extract_json_object(text).ok_or(ClassificationParseError::NoJsonObject)?;

    let response: ClassificationResponse = serde_json::from_str(object)
        .map_err(|e| ClassificationParseError::InvalidJson(e.to_string()))?;

    let mut classifications = response.classifications;
    classifications.sort_by_key(|c| c.transaction_index);
    Ok(classifications)
}
