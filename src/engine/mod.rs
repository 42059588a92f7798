//! Event routing and dispatch engine.
//!
//! Leaves first:
//! - **expiry**: is the inbound envelope still worth processing
//! - **parser**: function output text to envelopes
//! - **resolver**: routing slip head to `(envelope, destination)` pairs
//! - **translator**: failures to error envelopes
//! - **dispatcher**: the sequence tying the above to a transport and a function

pub mod dispatcher;
pub mod expiry;
pub mod parser;
pub mod recovery;
pub mod resolver;
pub mod translator;

pub use dispatcher::{DispatchReport, Dispatcher, RunSummary};
pub use expiry::is_expired;
pub use parser::parse_function_result;
pub use resolver::{Resolved, RoutingResolver};
pub use translator::ErrorTranslator;
