//! Error translator - failures to error envelopes.
//!
//! Building an error envelope never fails: if the source envelope cannot be
//! embedded, the problem is logged and the envelope goes out without `data`.

use serde::Serialize;

use crate::envelope::Envelope;
use crate::types::Error;

/// `type` attribute of every error envelope.
pub const ERROR_EVENT_TYPE: &str = "error";

/// Turns processing failures into error envelopes.
#[derive(Debug, Clone)]
pub struct ErrorTranslator {
    source_name: String,
}

impl ErrorTranslator {
    /// `source_name` becomes the `source` attribute of every error envelope.
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
        }
    }

    /// Build the error envelope for `failure`, embedding `source` when given.
    pub fn to_error_envelope(&self, failure: &Error, source: Option<&Envelope>) -> Envelope {
        self.build(failure, source)
    }

    fn build<S: Serialize>(&self, failure: &Error, source: Option<&S>) -> Envelope
    where
        S: Provenance,
    {
        let mut envelope = Envelope::new(self.source_name.clone(), ERROR_EVENT_TYPE);
        envelope.is_error_message = true;
        envelope.error_message = Some(failure.to_string());
        envelope.error_trace = Some(failure.trace());

        if let Some(source) = source {
            envelope.correlation_id = source.correlation_id().map(str::to_string);
            envelope.created_from = Some(source.id().to_string());

            match serde_json::to_value(source) {
                Ok(data) => envelope.data = data,
                Err(e) => {
                    tracing::warn!(
                        error_envelope_id = %envelope.id,
                        error = %e,
                        "could not embed source envelope in error envelope"
                    );
                }
            }
        }

        envelope
    }
}

/// Identity of whatever is embedded in an error envelope.
trait Provenance {
    fn id(&self) -> &str;
    fn correlation_id(&self) -> Option<&str>;
}

impl Provenance for Envelope {
    fn id(&self) -> &str {
        &self.id
    }

    fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }
}
