//! Routing resolver - next hop(s) from the routing slip.
//!
//! Each resolution consumes exactly one slip step. The hop is written into
//! the route history of the copy that travels to it, before the copy leaves
//! the engine.

use crate::envelope::{Envelope, StepKind};
use crate::types::{Error, Result};

/// An envelope copy paired with the destination it must be sent to.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub envelope: Envelope,
    pub destination: String,
}

/// Resolves routing slips against a default output destination.
#[derive(Debug, Clone)]
pub struct RoutingResolver {
    default_output: String,
}

impl RoutingResolver {
    pub fn new(default_output: impl Into<String>) -> Self {
        Self {
            default_output: default_output.into(),
        }
    }

    /// Resolve `envelope` into one or more `(copy, destination)` pairs.
    ///
    /// `origin` is the inbound envelope the function was invoked with. When
    /// `envelope` has no correlation id it inherits `origin`'s correlation id,
    /// or `origin`'s id when that is absent too. This happens once, before any
    /// fan-out copy is made.
    pub fn resolve(&self, mut envelope: Envelope, origin: &Envelope) -> Result<Vec<Resolved>> {
        if envelope.correlation_id.is_none() {
            let inherited = origin
                .correlation_id
                .clone()
                .unwrap_or_else(|| origin.id.clone());
            tracing::debug!(
                envelope_id = %envelope.id,
                correlation_id = %inherited,
                "correlation id inherited"
            );
            envelope.correlation_id = Some(inherited);
        }

        let Some(step) = envelope.routing_slip.pop_step() else {
            envelope.route.record(StepKind::Topic, self.default_output.clone());
            tracing::debug!(
                envelope_id = %envelope.id,
                destination = %self.default_output,
                "empty routing slip, routing to default output"
            );
            return Ok(vec![Resolved {
                envelope,
                destination: self.default_output.clone(),
            }]);
        };

        if step.kind != StepKind::Topic {
            return Err(Error::routing(format!(
                "unsupported routing step kind '{}' on envelope {}",
                step.kind, envelope.id
            )));
        }

        if step.destinations.is_empty() {
            return Err(Error::routing(format!(
                "routing step without destinations on envelope {}",
                envelope.id
            )));
        }

        if step.destinations.iter().any(String::is_empty) {
            return Err(Error::routing(format!(
                "routing step with an empty destination on envelope {}",
                envelope.id
            )));
        }

        // The last destination takes the original, the others get deep copies.
        let mut destinations = step.destinations;
        let last = destinations.pop();
        let mut resolved = Vec::with_capacity(destinations.len() + 1);

        for destination in destinations {
            let mut copy = envelope.clone();
            copy.route.record(step.kind.clone(), destination.clone());
            resolved.push(Resolved {
                envelope: copy,
                destination,
            });
        }

        if let Some(destination) = last {
            envelope.route.record(step.kind, destination.clone());
            resolved.push(Resolved {
                envelope,
                destination,
            });
        }

        tracing::debug!(
            envelope_id = %resolved[0].envelope.id,
            destinations = ?resolved.iter().map(|r| r.destination.as_str()).collect::<Vec<_>>(),
            remaining_steps = resolved[0].envelope.routing_slip.len(),
            "routing slip step resolved"
        );

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{RouteHistoryEntry, RoutingStep};
    use crate::types::FailureKind;
    use pretty_assertions::assert_eq;

    fn resolver() -> RoutingResolver {
        RoutingResolver::new("output")
    }

    fn origin() -> Envelope {
        Envelope::new("/in", "in").with_id("origin-1")
    }

    fn entry(id: &str) -> RouteHistoryEntry {
        RouteHistoryEntry {
            kind: StepKind::Topic,
            id: id.to_string(),
        }
    }

    #[test]
    fn test_empty_slip_goes_to_default_output() {
        let env = Envelope::new("/fn", "t");
        let resolved = resolver().resolve(env, &origin()).unwrap();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].destination, "output");
        assert_eq!(resolved[0].envelope.route.entries(), &[entry("output")]);
        assert!(resolved[0].envelope.routing_slip.is_empty());
    }

    #[test]
    fn test_single_destination_pops_head() {
        let env = Envelope::new("/fn", "t").with_routing_slip(vec![
            RoutingStep::topic("billing"),
            RoutingStep::topic("audit"),
        ]);

        let resolved = resolver().resolve(env, &origin()).unwrap();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].destination, "billing");
        assert_eq!(resolved[0].envelope.route.entries(), &[entry("billing")]);
        assert_eq!(
            resolved[0].envelope.routing_slip.steps(),
            &[RoutingStep::topic("audit")]
        );
    }

    #[test]
    fn test_history_is_appended_not_replaced() {
        let mut env = Envelope::new("/fn", "t")
            .with_routing_slip(vec![RoutingStep::topic("input")]);
        env.route.record(StepKind::Topic, "first");

        let resolved = resolver().resolve(env, &origin()).unwrap();
        assert_eq!(
            resolved[0].envelope.route.entries(),
            &[entry("first"), entry("input")]
        );
    }

    #[test]
    fn test_fan_out_copies_are_independent() {
        let mut env = Envelope::new("/fn", "t").with_routing_slip(vec![
            RoutingStep::fan_out(["left", "right"]),
            RoutingStep::topic("join"),
        ]);
        env.route.record(StepKind::Topic, "input");

        let mut resolved = resolver().resolve(env, &origin()).unwrap();

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].destination, "left");
        assert_eq!(resolved[1].destination, "right");
        assert_eq!(
            resolved[0].envelope.route.entries(),
            &[entry("input"), entry("left")]
        );
        assert_eq!(
            resolved[1].envelope.route.entries(),
            &[entry("input"), entry("right")]
        );

        // Same identity, separate storage.
        assert_eq!(resolved[0].envelope.id, resolved[1].envelope.id);
        resolved[0].envelope.route.record(StepKind::Topic, "extra");
        resolved[0].envelope.routing_slip.pop_step();

        assert_eq!(resolved[1].envelope.route.len(), 2);
        assert_eq!(
            resolved[1].envelope.routing_slip.steps(),
            &[RoutingStep::topic("join")]
        );
    }

    #[test]
    fn test_correlation_from_origin_correlation_id() {
        let origin = origin().with_correlation_id("corr-7");
        let env = Envelope::new("/fn", "t")
            .with_routing_slip(vec![RoutingStep::fan_out(["a", "b"])]);

        let resolved = resolver().resolve(env, &origin).unwrap();
        for r in &resolved {
            assert_eq!(r.envelope.correlation_id.as_deref(), Some("corr-7"));
        }
    }

    #[test]
    fn test_correlation_falls_back_to_origin_id() {
        let resolved = resolver()
            .resolve(Envelope::new("/fn", "t"), &origin())
            .unwrap();
        assert_eq!(resolved[0].envelope.correlation_id.as_deref(), Some("origin-1"));
    }

    #[test]
    fn test_existing_correlation_is_kept() {
        let origin = origin().with_correlation_id("corr-origin");
        let env = Envelope::new("/fn", "t").with_correlation_id("corr-own");

        let resolved = resolver().resolve(env, &origin).unwrap();
        assert_eq!(resolved[0].envelope.correlation_id.as_deref(), Some("corr-own"));
    }

    #[test]
    fn test_unknown_step_kind_is_routing_error() {
        let step = RoutingStep {
            kind: StepKind::Other("queue".to_string()),
            destinations: vec!["q".to_string()],
        };
        let env = Envelope::new("/fn", "t").with_routing_slip(vec![step]);

        let err = resolver().resolve(env, &origin()).unwrap_err();
        assert!(matches!(err, Error::Routing(_)));
        assert!(err.to_string().contains("queue"));
        assert_eq!(err.failure_kind(), FailureKind::DeadLetter);
    }

    #[test]
    fn test_step_without_destinations_is_routing_error() {
        let step = RoutingStep {
            kind: StepKind::Topic,
            destinations: Vec::new(),
        };
        let env = Envelope::new("/fn", "t").with_routing_slip(vec![step]);
        assert!(matches!(
            resolver().resolve(env, &origin()),
            Err(Error::Routing(_))
        ));
    }
}
