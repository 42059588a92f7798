//! Envelope export to JSON.

use crate::types::Result;

use super::Envelope;

/// Encode one envelope as a JSON string.
pub fn to_json(envelope: &Envelope) -> Result<String> {
    Ok(serde_json::to_string(envelope)?)
}
