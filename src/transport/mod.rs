//! Transport contract and the transports shipped with the router.
//!
//! The engine only needs to hand an envelope to a named destination. Topic
//! provisioning, retries and redelivery belong to the transport.
//!
//! - **`InMemoryBus`**: topic pub/sub inside the process (tests, embedding)
//! - **`JsonLinesTransport`**: one JSON line per send (stdio binary)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;
use crate::types::Result;

pub mod lines;
pub mod memory;

pub use lines::JsonLinesTransport;
pub use memory::{BusStats, InMemoryBus, Subscription};

/// Outbound side of a messaging transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `envelope` to `destination`. `key` is passed through untouched.
    ///
    /// Errors are returned as `Error::Transport` and are not recovered by the
    /// engine.
    async fn send(&self, destination: &str, key: Option<&str>, envelope: &Envelope) -> Result<()>;
}

/// An inbound message as received from a transport. The key is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inbound {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub envelope: Envelope,
}

impl Inbound {
    pub fn new(key: Option<String>, envelope: Envelope) -> Self {
        Self { key, envelope }
    }

    /// Decode a line that is either `{"key":..,"envelope":..}` or a bare envelope.
    pub fn from_line(line: &str) -> Result<Self> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Line {
            Keyed(Inbound),
            Bare(Envelope),
        }

        Ok(match serde_json::from_str(line)? {
            Line::Keyed(inbound) => inbound,
            Line::Bare(envelope) => Inbound::new(None, envelope),
        })
    }
}

/// A completed send, as observed by subscribers or written to a line stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub envelope: Envelope,
}
