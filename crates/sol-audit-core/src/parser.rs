//! Coercion of free-form vendor text into an [`AuditResult`].
//!
//! Recovery is heuristic. The text is first decoded as-is; if that fails the
//! first greedy `{ ... }` span is decoded instead, which copes with prose or
//! code fences around the object. The greedy span runs from the first `{` to
//! the last `}`, so text holding several independent objects, or braces
//! outside the intended object (for example Solidity snippets echoed in the
//! surrounding prose), can still be mis-extracted and rejected.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, trace};

use crate::audit::AuditResult;

static OBJECT_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.+\}").expect("object span regex is valid"));

const EXCERPT_CHARS: usize = 120;

/// Raised when no structured audit result can be recovered from vendor text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("could not parse audit response: {reason} (excerpt: \"{excerpt}\")")]
pub struct UnparsableResponse {
    pub reason: String,
    pub excerpt: String,
}

impl UnparsableResponse {
    fn new(reason: impl Into<String>, raw: &str) -> Self {
        Self {
            reason: reason.into(),
            excerpt: truncate(raw.trim(), EXCERPT_CHARS),
        }
    }
}

/// Parse raw vendor output into an audit result.
pub fn parse_audit_response(raw: &str) -> Result<AuditResult, UnparsableResponse> {
    let direct_err = match decode(raw) {
        Ok(result) => return Ok(result),
        Err(err) => err,
    };
    trace!(error = %direct_err, "direct decode failed; searching for embedded object");

    let Some(span) = OBJECT_SPAN.find(raw) else {
        return Err(UnparsableResponse::new(
            format!("no JSON object found ({direct_err})"),
            raw,
        ));
    };

    debug!(
        start = span.start(),
        end = span.end(),
        "decoding embedded object span"
    );
    decode(span.as_str()).map_err(|err| UnparsableResponse::new(err, raw))
}

fn decode(payload: &str) -> Result<AuditResult, String> {
    let result: AuditResult = serde_json::from_str(payload.trim()).map_err(|e| e.to_string())?;
    result.validate().map_err(|e| e.to_string())?;
    Ok(result)
}

fn truncate(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    input.chars().take(max_chars).collect::<String>() + "…"
}
