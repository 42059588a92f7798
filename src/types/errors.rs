//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.

use thiserror::Error;

use crate::envelope::Envelope;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the router.
#[derive(Error, Debug)]
pub enum Error {
    /// Compute function output could not be decoded into envelopes.
    #[error("invalid function result: {0}")]
    InvalidResult(#[source] serde_json::Error),

    /// Compute function output decoded, but not into an envelope shape.
    #[error("invalid function result: {0}")]
    UnexpectedResultShape(String),

    /// Compute function invocation failed (network, status, timeout).
    #[error("function invocation failed: {0}")]
    Invocation(String),

    /// Routing slip could not be resolved.
    #[error("routing error: {0}")]
    Routing(String),

    /// Transport send failed. Never translated into an error envelope.
    #[error("transport error on '{destination}': {message}")]
    Transport { destination: String, message: String },

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Internal errors, including recovered panics.
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client errors.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which error destination a failure is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Function produced output that is not a valid envelope (or list of them).
    InvalidMessage,
    /// Everything else that went wrong after the expiry check.
    DeadLetter,
}

impl Error {
    /// Map to the error destination role.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Error::InvalidResult(_) | Error::UnexpectedResultShape(_) => {
                FailureKind::InvalidMessage
            }
            _ => FailureKind::DeadLetter,
        }
    }

    /// Transport failures propagate to the caller instead of being translated.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }

    /// Render the error and its full `source()` chain, one cause per line.
    ///
    /// A cause whose text the previous line already shows is skipped.
    pub fn trace(&self) -> String {
        let mut previous = self.to_string();
        let mut trace = format!("{}: {}", self.variant_name(), previous);
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            let line = err.to_string();
            if !previous.contains(&line) {
                trace.push_str("\ncaused by: ");
                trace.push_str(&line);
            }
            previous = line;
            cause = err.source();
        }
        trace
    }

    fn variant_name(&self) -> &'static str {
        match self {
            Error::InvalidResult(_) => "InvalidResult",
            Error::UnexpectedResultShape(_) => "UnexpectedResultShape",
            Error::Invocation(_) => "Invocation",
            Error::Routing(_) => "Routing",
            Error::Transport { .. } => "Transport",
            Error::Config(_) => "Config",
            Error::Internal(_) => "Internal",
            Error::Serialization(_) => "Serialization",
            Error::Http(_) => "Http",
            Error::Io(_) => "Io",
        }
    }
}

// Convenience constructors
impl Error {
    pub fn invocation(msg: impl Into<String>) -> Self {
        Self::Invocation(msg.into())
    }

    pub fn routing(msg: impl Into<String>) -> Self {
        Self::Routing(msg.into())
    }

    pub fn transport(destination: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transport {
            destination: destination.into(),
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// A processing failure together with the envelope that triggered it.
#[derive(Debug)]
pub struct Failure {
    pub error: Error,
    pub envelope: Box<Envelope>,
}

impl Failure {
    pub fn new(error: Error, envelope: Envelope) -> Self {
        Self {
            error,
            envelope: Box::new(envelope),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (envelope {})", self.error, self.envelope.id)
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_mapping() {
        let bad_json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(
            Error::InvalidResult(bad_json).failure_kind(),
            FailureKind::InvalidMessage
        );
        assert_eq!(
            Error::UnexpectedResultShape("42".into()).failure_kind(),
            FailureKind::InvalidMessage
        );
        assert_eq!(
            Error::invocation("503").failure_kind(),
            FailureKind::DeadLetter
        );
        assert_eq!(Error::routing("no step").failure_kind(), FailureKind::DeadLetter);
        assert_eq!(Error::internal("panic").failure_kind(), FailureKind::DeadLetter);
    }

    #[test]
    fn test_trace_includes_cause_chain() {
        let bad_json = serde_json::from_str::<serde_json::Value>("{\"a\":").unwrap_err();
        let cause = bad_json.to_string();
        let err = Error::InvalidResult(bad_json);

        let trace = err.trace();
        assert!(trace.starts_with("InvalidResult: invalid function result"));
        assert_eq!(trace.matches(cause.as_str()).count(), 1, "{}", trace);
        assert!(!trace.contains("caused by"));
    }

    #[test]
    fn test_trace_io_cause_printed_once() {
        let trace = Error::Io(std::io::Error::other("disk gone")).trace();
        assert_eq!(trace, "Io: io error: disk gone");
    }

    #[test]
    fn test_trace_without_cause_is_single_line() {
        let trace = Error::routing("unknown step kind 'queue'").trace();
        assert_eq!(trace, "Routing: routing error: unknown step kind 'queue'");
    }

    #[test]
    fn test_is_transport() {
        assert!(Error::transport("output", "closed").is_transport());
        assert!(!Error::invocation("boom").is_transport());
    }
}
