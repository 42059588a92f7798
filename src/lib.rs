//! # Slip Router - routing-slip dispatch for CloudEvent envelopes
//!
//! Moves envelopes between a messaging transport and a compute function.
//! Where an envelope goes next is written in the envelope itself (its routing
//! slip), not in static topology:
//! - Expired envelopes are dropped without a trace downstream
//! - Function output (nothing, one envelope, or many) is parsed and routed
//! - Each hop is appended to the envelope's route history; fan-out copies own
//!   their history and slip independently
//! - Test traffic can be kept away from a named destination
//! - Failures become error envelopes on a dead-letter or invalid-message sink
//!
//! ## Architecture
//!
//! ```text
//!   inbound ─► expiry ─► function ─► parser ─► resolver ─► filter ─► transport
//!                           │           │          │
//!                           └───────────┴──────────┴──► translator ─► error sink
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod engine;
pub mod envelope;
pub mod function;
pub mod transport;
pub mod types;

// Internal utilities
pub mod observability;

pub use engine::{DispatchReport, Dispatcher};
pub use envelope::Envelope;
pub use types::{Config, Error, Result};
