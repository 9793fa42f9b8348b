//! Broker wire format.
//!
//! The message body is the event payload alone. The envelope fields travel as
//! headers and are reattached on decode.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use event_store::{AggregateId, EventEnvelope, EventId, Version};

use crate::{BusError, Result};

pub const EVENT_NAME_HEADER: &str = "event-name";
pub const AGGREGATE_NAME_HEADER: &str = "aggregate-name";
pub const AGGREGATE_ID_HEADER: &str = "aggregate-id";
pub const VERSION_HEADER: &str = "version";
pub const EVENT_ID_HEADER: &str = "event-id";
pub const TIMESTAMP_HEADER: &str = "timestamp";
pub const METADATA_HEADER: &str = "metadata";
/// Carries the aggregate id for tracing on the broker side.
pub const MESSAGE_ID_HEADER: &str = "message-id";

/// Every header `encode` may set.
pub const ENVELOPE_HEADERS: [&str; 8] = [
    EVENT_NAME_HEADER,
    AGGREGATE_NAME_HEADER,
    AGGREGATE_ID_HEADER,
    VERSION_HEADER,
    EVENT_ID_HEADER,
    TIMESTAMP_HEADER,
    METADATA_HEADER,
    MESSAGE_ID_HEADER,
];

/// A message as it travels through the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl WireMessage {
    fn header(&self, name: &str) -> Result<&str> {
        self.headers
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| BusError::Codec(format!("missing header {name}")))
    }
}

/// Identifier under which the broker deduplicates re-published events.
///
/// Unique per stored event, so two events of one aggregate never collide.
pub fn dedup_id(event: &EventEnvelope) -> String {
    format!("{}:{}", event.aggregate_id, event.version)
}

pub fn encode(event: &EventEnvelope) -> Result<WireMessage> {
    let body = serde_json::to_vec(&event.payload).map_err(|e| BusError::Codec(e.to_string()))?;

    let mut headers = BTreeMap::new();
    headers.insert(EVENT_NAME_HEADER.to_string(), event.event_name.clone());
    headers.insert(
        AGGREGATE_NAME_HEADER.to_string(),
        event.aggregate_name.clone(),
    );
    headers.insert(
        AGGREGATE_ID_HEADER.to_string(),
        event.aggregate_id.to_string(),
    );
    headers.insert(VERSION_HEADER.to_string(), event.version.to_string());
    headers.insert(EVENT_ID_HEADER.to_string(), event.event_id.to_string());
    headers.insert(TIMESTAMP_HEADER.to_string(), event.timestamp.to_rfc3339());
    headers.insert(MESSAGE_ID_HEADER.to_string(), event.aggregate_id.to_string());
    if !event.metadata.is_empty() {
        let metadata =
            serde_json::to_string(&event.metadata).map_err(|e| BusError::Codec(e.to_string()))?;
        headers.insert(METADATA_HEADER.to_string(), metadata);
    }

    Ok(WireMessage { headers, body })
}

pub fn decode(message: &WireMessage) -> Result<EventEnvelope> {
    let version: i64 = message
        .header(VERSION_HEADER)?
        .parse()
        .map_err(|_| BusError::Codec("version header is not an integer".to_string()))?;

    let payload = if message.body.is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_slice(&message.body).map_err(|e| BusError::Codec(e.to_string()))?
    };

    let event_id = match message.headers.get(EVENT_ID_HEADER) {
        Some(raw) => serde_json::from_value::<EventId>(serde_json::Value::String(raw.clone()))
            .map_err(|e| BusError::Codec(format!("bad event id: {e}")))?,
        None => EventId::new(),
    };

    let timestamp = match message.headers.get(TIMESTAMP_HEADER) {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map_err(|e| BusError::Codec(format!("bad timestamp: {e}")))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let metadata: HashMap<String, serde_json::Value> = match message.headers.get(METADATA_HEADER) {
        Some(raw) => serde_json::from_str(raw).map_err(|e| BusError::Codec(e.to_string()))?,
        None => HashMap::new(),
    };

    Ok(EventEnvelope {
        event_id,
        event_name: message.header(EVENT_NAME_HEADER)?.to_string(),
        aggregate_id: AggregateId::new(message.header(AGGREGATE_ID_HEADER)?),
        aggregate_name: message.header(AGGREGATE_NAME_HEADER)?.to_string(),
        version: Version::new(version),
        timestamp,
        payload,
        metadata,
    })
}
