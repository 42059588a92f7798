//! Envelope - the routed unit.
//!
//! A CloudEvent-shaped record plus the routing attributes the engine acts on:
//! - **CloudEvent attributes**: id, source, type, specversion, time, data
//! - **Routing**: routing slip (hops remaining) and route history (hops taken)
//! - **Test traffic**: test flag and the destination it must not reach
//! - **Error details**: populated only on envelopes built by the error translator
//!
//! Envelopes are values. `Clone` is a deep copy, which is what keeps fan-out
//! branches from seeing each other's routing state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub mod enums;
pub mod export;
pub mod routing;

pub use enums::*;
pub use export::to_json;
pub use routing::{RouteHistory, RouteHistoryEntry, RoutingSlip, RoutingStep};

/// CloudEvents spec version stamped on envelopes built here.
pub const SPEC_VERSION: &str = "1.0";

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_specversion() -> String {
    SPEC_VERSION.to_string()
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Decode an explicit JSON `null` the same as an absent field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_new_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(new_id))
}

fn null_as_specversion<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_specversion))
}

/// Main envelope structure.
///
/// Wire names are camelCase. Attributes without a field of their own (other
/// CloudEvents attributes such as `datacontenttype` or `subject`, and
/// extensions) are kept in `extensions` and forwarded unchanged. A `null`
/// value decodes like an absent attribute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default = "new_id", deserialize_with = "null_as_new_id")]
    pub id: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub source: String,

    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub event_type: String,

    #[serde(default = "default_specversion", deserialize_with = "null_as_specversion")]
    pub specversion: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,

    /// Opaque payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "RoutingSlip::is_empty"
    )]
    pub routing_slip: RoutingSlip,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "RouteHistory::is_empty"
    )]
    pub route: RouteHistory,

    /// Id of the envelope this one was derived from. Set on error envelopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_from: Option<String>,

    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "is_false")]
    pub is_test_message: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_out_before_topic: Option<String>,

    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "is_false")]
    pub is_error_message: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_trace: Option<String>,

    /// Every other attribute, as received.
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl Envelope {
    /// Create an envelope with a fresh id and the current time.
    pub fn new(source: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            source: source.into(),
            event_type: event_type.into(),
            specversion: default_specversion(),
            time: Some(Utc::now()),
            data: Value::Null,
            correlation_id: None,
            expiry_date: None,
            routing_slip: RoutingSlip::default(),
            route: RouteHistory::default(),
            created_from: None,
            is_test_message: false,
            filter_out_before_topic: None,
            is_error_message: false,
            error_message: None,
            error_trace: None,
            extensions: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_expiry_date(mut self, expiry_date: DateTime<Utc>) -> Self {
        self.expiry_date = Some(expiry_date);
        self
    }

    pub fn with_routing_slip(mut self, steps: Vec<RoutingStep>) -> Self {
        self.routing_slip = RoutingSlip::new(steps);
        self
    }

    /// Mark as test traffic that must not be delivered to `topic`.
    pub fn with_test_message(mut self, filter_out_before_topic: Option<String>) -> Self {
        self.is_test_message = true;
        self.filter_out_before_topic = filter_out_before_topic;
        self
    }

    /// True iff this is test traffic and `destination` is exactly the topic it
    /// must be kept away from.
    pub fn is_filter_out_necessary(&self, destination: &str) -> bool {
        self.is_test_message && self.filter_out_before_topic.as_deref() == Some(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn cloud_event() -> Value {
        json!({
            "id": "evt-1",
            "source": "/orders",
            "type": "order.created",
            "specversion": "1.0",
            "time": "2024-05-01T10:00:00Z",
            "data": {"orderId": 7, "lines": [1, 2]},
            "correlationId": "corr-1",
            "routingSlip": [
                {"type": "topic", "destinations": ["billing"]},
                {"type": "topic", "destinations": ["audit", "shipping"]}
            ],
            "route": [{"type": "topic", "id": "input"}],
            "isTestMessage": true,
            "filterOutBeforeTopic": "shipping",
            "somethingNew": {"ignored": true}
        })
    }

    #[test]
    fn test_decode_cloud_event() {
        let env: Envelope = serde_json::from_value(cloud_event()).unwrap();

        assert_eq!(env.id, "evt-1");
        assert_eq!(env.source, "/orders");
        assert_eq!(env.event_type, "order.created");
        assert_eq!(env.time.unwrap().to_rfc3339(), "2024-05-01T10:00:00+00:00");
        assert_eq!(env.data["orderId"], 7);
        assert_eq!(env.correlation_id.as_deref(), Some("corr-1"));
        assert_eq!(env.routing_slip.len(), 2);
        assert_eq!(env.routing_slip.peek(), Some(&RoutingStep::topic("billing")));
        assert_eq!(env.route.len(), 1);
        assert!(env.is_test_message);
        assert_eq!(env.filter_out_before_topic.as_deref(), Some("shipping"));
        assert!(!env.is_error_message);
        assert_eq!(env.extensions.get("somethingNew"), Some(&json!({"ignored": true})));
    }

    #[test]
    fn test_unmodelled_attributes_survive_round_trip() {
        let input = json!({
            "id": "e1",
            "source": "/s",
            "type": "t",
            "datacontenttype": "application/json",
            "dataschema": "https://schemas.example/order.json",
            "subject": "order-7",
            "createdFrom": "root",
            "traceparent": "00-abc-def-01"
        });
        let env: Envelope = serde_json::from_value(input.clone()).unwrap();

        assert_eq!(env.created_from.as_deref(), Some("root"));
        assert_eq!(env.extensions["subject"], "order-7");
        assert!(!env.extensions.contains_key("createdFrom"));

        let encoded = serde_json::to_value(&env).unwrap();
        for key in ["datacontenttype", "dataschema", "subject", "createdFrom", "traceparent"] {
            assert_eq!(encoded[key], input[key], "attribute {} changed", key);
        }
    }

    #[test]
    fn test_null_attributes_decode_as_absent() {
        let env: Envelope = serde_json::from_value(json!({
            "id": null,
            "source": null,
            "type": null,
            "specversion": null,
            "time": null,
            "data": null,
            "correlationId": null,
            "routingSlip": null,
            "route": null,
            "createdFrom": null,
            "isTestMessage": null,
            "filterOutBeforeTopic": null,
            "isErrorMessage": null
        }))
        .unwrap();

        assert!(!env.id.is_empty());
        assert_eq!(env.source, "");
        assert_eq!(env.event_type, "");
        assert_eq!(env.specversion, SPEC_VERSION);
        assert!(env.routing_slip.is_empty());
        assert!(env.route.is_empty());
        assert!(!env.is_test_message);
        assert!(!env.is_error_message);
        assert!(env.created_from.is_none());
        assert!(env.extensions.is_empty());
    }

    #[test]
    fn test_decode_minimal_event_fills_defaults() {
        let env: Envelope = serde_json::from_value(json!({"type": "ping"})).unwrap();

        assert!(!env.id.is_empty());
        assert_eq!(env.specversion, "1.0");
        assert!(env.data.is_null());
        assert!(env.routing_slip.is_empty());
        assert!(env.route.is_empty());
        assert!(env.correlation_id.is_none());
    }

    #[test]
    fn test_encode_omits_absent_fields() {
        let env = Envelope::new("/svc", "ping").with_id("e1");
        let encoded = serde_json::to_value(&env).unwrap();
        let keys: Vec<&String> = encoded.as_object().unwrap().keys().collect();

        assert_eq!(keys.len(), 5, "unexpected keys: {:?}", keys);
        assert_eq!(encoded["id"], "e1");
        assert!(encoded.get("routingSlip").is_none());
        assert!(encoded.get("isTestMessage").is_none());
    }

    #[test]
    fn test_clone_is_independent() {
        let original: Envelope = serde_json::from_value(cloud_event()).unwrap();
        let mut copy = original.clone();

        copy.route.record(StepKind::Topic, "billing");
        copy.routing_slip.pop_step();

        assert_eq!(original.route.len(), 1);
        assert_eq!(original.routing_slip.len(), 2);
        assert_eq!(copy.route.len(), 2);
        assert_eq!(copy.routing_slip.len(), 1);
    }

    #[test]
    fn test_filter_out_necessary_truth_table() {
        let test_msg = Envelope::new("/t", "t").with_test_message(Some("output".into()));
        assert!(test_msg.is_filter_out_necessary("output"));
        assert!(!test_msg.is_filter_out_necessary("other"));

        let mut not_test = test_msg.clone();
        not_test.is_test_message = false;
        assert!(!not_test.is_filter_out_necessary("output"));

        let no_topic = Envelope::new("/t", "t").with_test_message(None);
        assert!(!no_topic.is_filter_out_necessary("output"));
        assert!(!no_topic.is_filter_out_necessary(""));
    }

    proptest! {
        #[test]
        fn prop_filter_out_matches_definition(
            is_test in any::<bool>(),
            filter in proptest::option::of("[a-c]{0,2}"),
            topic in "[a-c]{0,2}",
        ) {
            let mut env = Envelope::new("/p", "p");
            env.is_test_message = is_test;
            env.filter_out_before_topic = filter.clone();

            let expected = is_test && filter.as_deref() == Some(topic.as_str());
            prop_assert_eq!(env.is_filter_out_necessary(&topic), expected);
        }
    }
}
