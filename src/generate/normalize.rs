//! Turns free-form completion text into [`GeneratedCode`].
//!
//! Models are asked for a bare JSON object but often wrap it in a fenced
//! block or answer in prose. The order of attempts is: whole text as JSON,
//! then the first ```` ```json ```` block, then the raw text as markup.

use serde_json::Value;
use tracing::{debug, warn};

use super::dto::GeneratedCode;

pub const FENCE_OPEN: &str = "```json";
pub const FENCE_CLOSE: &str = "```";
pub const FALLBACK_CSS: &str =
    "/* Please reformat the response as it wasn't in the expected JSON format */";

pub fn normalize(raw: &str) -> GeneratedCode {
    if let Some(code) = parse_code(raw) {
        debug!("completion is a bare json object");
        return code;
    }

    if let Some(block) = fenced_json(raw) {
        if let Some(code) = parse_code(block) {
            debug!("completion carries a fenced json block");
            return code;
        }
        warn!(len = block.len(), "fenced json block did not parse");
    }

    warn!(len = raw.len(), "completion not in the expected shape, using fallback");
    GeneratedCode {
        html: raw.to_string(),
        css: FALLBACK_CSS.to_string(),
    }
}

/// Text between the first `FENCE_OPEN` and the next `FENCE_CLOSE`, trimmed.
/// An unterminated block runs to the end of the text.
fn fenced_json(raw: &str) -> Option<&str> {
    let start = raw.find(FENCE_OPEN)? + FENCE_OPEN.len();
    let rest = &raw[start..];
    let end = rest.find(FENCE_CLOSE).unwrap_or(rest.len());
    Some(rest[..end].trim())
}

/// Only a JSON object qualifies; serde would otherwise also fill the
/// struct positionally from a two-element array.
fn parse_code(text: &str) -> Option<GeneratedCode> {
    match serde_json::from_str::<Value>(text).ok()? {
        obj @ Value::Object(_) => serde_json::from_value(obj).ok(),
        _ => None,
    }
}
