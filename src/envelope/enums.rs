//! Enumerations shared by routing slips and route history.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a routing hop.
///
/// Only topics are routable today. Other kinds survive a decode/encode cycle
/// unchanged so envelopes from newer producers are not rewritten, but the
/// resolver refuses to route them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepKind {
    #[default]
    Topic,
    Other(String),
}

impl StepKind {
    pub fn as_str(&self) -> &str {
        match self {
            StepKind::Topic => "topic",
            StepKind::Other(kind) => kind,
        }
    }
}

impl From<String> for StepKind {
    fn from(kind: String) -> Self {
        if kind == "topic" {
            StepKind::Topic
        } else {
            StepKind::Other(kind)
        }
    }
}

impl From<StepKind> for String {
    fn from(kind: StepKind) -> Self {
        match kind {
            StepKind::Topic => "topic".to_string(),
            StepKind::Other(kind) => kind,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
