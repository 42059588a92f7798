//! Routing slip (hops still to take) and route history (hops already taken).
//!
//! Both are plain owned vectors. Cloning an envelope clones them, so every
//! fan-out branch gets storage nobody else can mutate.

use serde::{Deserialize, Serialize};

use super::enums::StepKind;
use super::null_as_default;

/// One step of a routing slip: a kind and one or more destinations.
///
/// More than one destination means fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RoutingStepWire")]
pub struct RoutingStep {
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub destinations: Vec<String>,
}

/// Accepted decode forms: `destinations: [..]`, `destinationId: ".."` or
/// `id: ".."`, in any combination. Duplicates collapse.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoutingStepWire {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    kind: StepKind,
    #[serde(default, deserialize_with = "null_as_default")]
    destinations: Vec<String>,
    #[serde(default)]
    destination_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

impl From<RoutingStepWire> for RoutingStep {
    fn from(wire: RoutingStepWire) -> Self {
        let mut destinations = wire.destinations;
        for id in [wire.destination_id, wire.id].into_iter().flatten() {
            if !destinations.contains(&id) {
                destinations.push(id);
            }
        }
        Self {
            kind: wire.kind,
            destinations,
        }
    }
}

impl RoutingStep {
    /// Single topic hop.
    pub fn topic(destination: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Topic,
            destinations: vec![destination.into()],
        }
    }

    /// Topic hop delivered to every destination at once.
    pub fn fan_out<I, S>(destinations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: StepKind::Topic,
            destinations: destinations.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_fan_out(&self) -> bool {
        self.destinations.len() > 1
    }
}

/// Ordered steps remaining to be executed, head first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingSlip(Vec<RoutingStep>);

impl RoutingSlip {
    pub fn new(steps: Vec<RoutingStep>) -> Self {
        Self(steps)
    }

    /// Remove and return the head step.
    pub fn pop_step(&mut self) -> Option<RoutingStep> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.remove(0))
        }
    }

    pub fn peek(&self) -> Option<&RoutingStep> {
        self.0.first()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn steps(&self) -> &[RoutingStep] {
        &self.0
    }
}

impl From<Vec<RoutingStep>> for RoutingSlip {
    fn from(steps: Vec<RoutingStep>) -> Self {
        Self(steps)
    }
}

/// A hop already executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteHistoryEntry {
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub id: String,
}

/// Append-only log of hops, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteHistory(Vec<RouteHistoryEntry>);

impl RouteHistory {
    /// Append a hop. There is no way to remove one.
    pub fn record(&mut self, kind: StepKind, id: impl Into<String>) {
        self.0.push(RouteHistoryEntry { kind, id: id.into() });
    }

    pub fn last(&self) -> Option<&RouteHistoryEntry> {
        self.0.last()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RouteHistoryEntry> {
        self.0.iter()
    }

    pub fn entries(&self) -> &[RouteHistoryEntry] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a RouteHistory {
    type Item = &'a RouteHistoryEntry;
    type IntoIter = std::slice::Iter<'a, RouteHistoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_step_decodes_destinations_array() {
        let step: RoutingStep =
            serde_json::from_value(json!({"type": "topic", "destinations": ["a", "b"]})).unwrap();
        assert_eq!(step, RoutingStep::fan_out(["a", "b"]));
        assert!(step.is_fan_out());
    }

    #[test]
    fn test_step_decodes_single_destination_forms() {
        let by_destination_id: RoutingStep =
            serde_json::from_value(json!({"type": "topic", "destinationId": "orders"})).unwrap();
        let by_id: RoutingStep =
            serde_json::from_value(json!({"type": "topic", "id": "orders"})).unwrap();

        assert_eq!(by_destination_id, RoutingStep::topic("orders"));
        assert_eq!(by_id, RoutingStep::topic("orders"));
    }

    #[test]
    fn test_step_decodes_destination_id_next_to_id() {
        let same: RoutingStep = serde_json::from_value(
            json!({"type": "topic", "destinationId": "orders", "id": "orders"}),
        )
        .unwrap();
        assert_eq!(same, RoutingStep::topic("orders"));

        let both: RoutingStep =
            serde_json::from_value(json!({"type": "topic", "destinationId": "a", "id": "b"}))
                .unwrap();
        assert_eq!(both.destinations, vec!["a", "b"]);
    }

    #[test]
    fn test_step_decodes_null_fields_as_absent() {
        let step: RoutingStep = serde_json::from_value(
            json!({"type": null, "destinations": null, "destinationId": "orders", "id": null}),
        )
        .unwrap();
        assert_eq!(step, RoutingStep::topic("orders"));
    }

    #[test]
    fn test_step_encodes_destinations_array() {
        let encoded = serde_json::to_value(RoutingStep::topic("orders")).unwrap();
        assert_eq!(encoded, json!({"type": "topic", "destinations": ["orders"]}));
    }

    #[test]
    fn test_unknown_step_kind_is_preserved() {
        let step: RoutingStep =
            serde_json::from_value(json!({"type": "queue", "destinations": ["q1"]})).unwrap();
        assert_eq!(step.kind, StepKind::Other("queue".to_string()));

        let encoded = serde_json::to_value(&step).unwrap();
        assert_eq!(encoded["type"], "queue");
    }

    #[test]
    fn test_step_kind_match_is_exact() {
        let step: RoutingStep =
            serde_json::from_value(json!({"type": "TOPIC", "destinations": ["q1"]})).unwrap();
        assert_eq!(step.kind, StepKind::Other("TOPIC".to_string()));
        assert_eq!(serde_json::to_value(&step).unwrap()["type"], "TOPIC");
    }

    #[test]
    fn test_pop_step_in_order() {
        let mut slip = RoutingSlip::new(vec![
            RoutingStep::topic("first"),
            RoutingStep::topic("second"),
        ]);

        assert_eq!(slip.pop_step(), Some(RoutingStep::topic("first")));
        assert_eq!(slip.len(), 1);
        assert_eq!(slip.pop_step(), Some(RoutingStep::topic("second")));
        assert!(slip.is_empty());
        assert_eq!(slip.pop_step(), None);
    }

    #[test]
    fn test_history_appends() {
        let mut history = RouteHistory::default();
        history.record(StepKind::Topic, "a");
        history.record(StepKind::Topic, "b");

        let ids: Vec<&str> = history.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(history.last().map(|e| e.id.as_str()), Some("b"));
    }

    #[test]
    fn test_history_wire_shape() {
        let mut history = RouteHistory::default();
        history.record(StepKind::Topic, "input");
        assert_eq!(
            serde_json::to_value(&history).unwrap(),
            json!([{"type": "topic", "id": "input"}])
        );
    }
}
