//! Result parser - compute function output to envelopes.
//!
//! The function may answer with nothing, one envelope, or an array of them.
//! All three shapes normalize to an ordered `Vec<Envelope>`.

use serde_json::Value;

use crate::envelope::Envelope;
use crate::types::{Error, Result};

/// Parse raw function output into outbound envelopes.
///
/// `source` is only used for log context. Parsed envelopes are returned
/// exactly as decoded; correlation is applied later by the resolver.
pub fn parse_function_result(raw: Option<&str>, source: &Envelope) -> Result<Vec<Envelope>> {
    let text = match raw.map(str::trim) {
        None | Some("") => {
            tracing::debug!(source_id = %source.id, "function returned no output");
            return Ok(Vec::new());
        }
        Some(text) => text,
    };

    let value: Value = serde_json::from_str(text).map_err(|e| {
        tracing::warn!(source_id = %source.id, error = %e, "function result is not JSON");
        Error::InvalidResult(e)
    })?;

    let envelopes = match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<Envelope>, _>>()
            .map_err(Error::InvalidResult)?,
        object @ Value::Object(_) => {
            vec![serde_json::from_value(object).map_err(Error::InvalidResult)?]
        }
        other => {
            return Err(Error::UnexpectedResultShape(format!(
                "expected an envelope or an array of envelopes, got {}",
                json_kind(&other)
            )))
        }
    };

    tracing::debug!(
        source_id = %source.id,
        count = envelopes.len(),
        "parsed function result"
    );

    Ok(envelopes)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
