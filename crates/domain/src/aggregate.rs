//! Core aggregate and domain event traits.

use common::AggregateId;
use event_store::{EventEnvelope, Version};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::DomainError;

/// Trait for domain events.
///
/// Implementors are enums serialized adjacently tagged
/// (`#[serde(tag = "type", content = "data")]`): the variant name is the
/// event name and the variant data is the stored payload.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Every event name this type can decode.
    const EVENT_NAMES: &'static [&'static str];

    /// Version of the payload schema, recorded in each event's metadata.
    const SCHEMA_VERSION: u32 = 1;

    /// Returns the event type name.
    fn event_type(&self) -> &'static str;

    /// Encodes the payload (the variant data, without the tag).
    fn to_payload(&self) -> Result<serde_json::Value, DomainError> {
        let mut tagged = serde_json::to_value(self)?;
        Ok(tagged
            .get_mut("data")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null))
    }

    /// Decodes an event from its stored name and payload.
    ///
    /// Unknown names fail with [`DomainError::UnknownEvent`].
    fn from_parts(event_name: &str, payload: serde_json::Value) -> Result<Self, DomainError> {
        if !Self::EVENT_NAMES.contains(&event_name) {
            return Err(DomainError::UnknownEvent {
                event_name: event_name.to_string(),
            });
        }
        let tagged = serde_json::json!({ "type": event_name, "data": payload });
        Ok(serde_json::from_value(tagged)?)
    }
}

/// Identity, version and pending-event buffer shared by every aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateBase<E> {
    id: Option<AggregateId>,
    version: Version,
    uncommitted: Vec<E>,
}

impl<E> Default for AggregateBase<E> {
    fn default() -> Self {
        Self {
            id: None,
            version: Version::initial(),
            uncommitted: Vec::new(),
        }
    }
}

impl<E> AggregateBase<E> {
    pub fn id(&self) -> Option<&AggregateId> {
        self.id.as_ref()
    }

    pub fn set_id(&mut self, id: AggregateId) {
        self.id = Some(id);
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn uncommitted(&self) -> &[E] {
        &self.uncommitted
    }

    pub fn record(&mut self, event: E) {
        self.uncommitted.push(event);
    }

    pub fn clear_uncommitted(&mut self) {
        self.uncommitted.clear();
    }
}

/// Trait for aggregates in an event-sourced system.
///
/// State changes only through [`apply_change`](Aggregate::apply_change)
/// (new facts, buffered until saved) and
/// [`load_from_history`](Aggregate::load_from_history) (stored facts, never
/// buffered). Both run the same [`apply`](Aggregate::apply) reducer.
pub trait Aggregate: Default + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Returns the aggregate type name stored beside every event.
    fn aggregate_type() -> &'static str;

    fn base(&self) -> &AggregateBase<Self::Event>;

    fn base_mut(&mut self) -> &mut AggregateBase<Self::Event>;

    /// Applies an event to the aggregate, updating its state.
    ///
    /// Must be deterministic and free of I/O, and must handle every variant.
    fn apply(&mut self, event: &Self::Event);

    /// Returns the aggregate's identifier, or None before its first event.
    fn id(&self) -> Option<&AggregateId> {
        self.base().id()
    }

    /// Version of the last stored event this instance has seen.
    fn version(&self) -> Version {
        self.base().version()
    }

    /// Applies a new event and buffers it for the next save.
    fn apply_change(&mut self, event: Self::Event) {
        self.apply(&event);
        self.base_mut().record(event);
    }

    /// Rebuilds state by replaying stored events in version order.
    fn load_from_history(&mut self, history: &[EventEnvelope]) -> Result<(), DomainError> {
        for envelope in history {
            let event = Self::Event::from_parts(&envelope.event_name, envelope.payload.clone())?;
            self.apply(&event);
            self.base_mut().set_version(envelope.version);
        }
        Ok(())
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        self.base().uncommitted()
    }

    /// Clears the buffer after a successful save at `version`.
    fn mark_changes_as_committed(&mut self, version: Version) {
        let base = self.base_mut();
        base.clear_uncommitted();
        base.set_version(version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", content = "data")]
    enum CounterEvent {
        Opened { id: String },
        Incremented { by: i32 },
    }

    impl DomainEvent for CounterEvent {
        const EVENT_NAMES: &'static [&'static str] = &["Opened", "Incremented"];

        fn event_type(&self) -> &'static str {
            match self {
                CounterEvent::Opened { .. } => "Opened",
                CounterEvent::Incremented { .. } => "Incremented",
            }
        }
    }

    #[derive(Debug, Default)]
    struct Counter {
        base: AggregateBase<CounterEvent>,
        value: i32,
    }

    impl Aggregate for Counter {
        type Event = CounterEvent;

        fn aggregate_type() -> &'static str {
            "Counter"
        }

        fn base(&self) -> &AggregateBase<CounterEvent> {
            &self.base
        }

        fn base_mut(&mut self) -> &mut AggregateBase<CounterEvent> {
            &mut self.base
        }

        fn apply(&mut self, event: &CounterEvent) {
            match event {
                CounterEvent::Opened { id } => self.base.set_id(AggregateId::new(id.clone())),
                CounterEvent::Incremented { by } => self.value += by,
            }
        }
    }

    fn envelope(event: &CounterEvent, version: i64) -> EventEnvelope {
        EventEnvelope::builder()
            .event_name(event.event_type())
            .aggregate_id("c-1")
            .aggregate_name(Counter::aggregate_type())
            .version(Version::new(version))
            .payload_raw(event.to_payload().unwrap())
            .build()
    }

    #[test]
    fn apply_change_buffers_without_touching_version() {
        let mut counter = Counter::default();
        counter.apply_change(CounterEvent::Opened { id: "c-1".into() });
        counter.apply_change(CounterEvent::Incremented { by: 3 });

        assert_eq!(counter.value, 3);
        assert_eq!(counter.uncommitted_events().len(), 2);
        assert_eq!(counter.version(), Version::initial());

        counter.mark_changes_as_committed(Version::new(2));
        assert!(counter.uncommitted_events().is_empty());
        assert_eq!(counter.version(), Version::new(2));
    }

    #[test]
    fn load_from_history_does_not_buffer() {
        let history = vec![
            envelope(&CounterEvent::Opened { id: "c-1".into() }, 1),
            envelope(&CounterEvent::Incremented { by: 5 }, 2),
        ];

        let mut counter = Counter::default();
        counter.load_from_history(&history).unwrap();

        assert_eq!(counter.id(), Some(&AggregateId::new("c-1")));
        assert_eq!(counter.value, 5);
        assert_eq!(counter.version(), Version::new(2));
        assert!(counter.uncommitted_events().is_empty());
    }

    #[test]
    fn payload_is_variant_data_only() {
        let payload = CounterEvent::Incremented { by: 7 }.to_payload().unwrap();
        assert_eq!(payload, serde_json::json!({"by": 7}));

        let decoded = CounterEvent::from_parts("Incremented", payload).unwrap();
        assert_eq!(decoded, CounterEvent::Incremented { by: 7 });
    }

    #[test]
    fn unknown_event_name_is_rejected() {
        let history = vec![
            EventEnvelope::builder()
                .event_name("Decremented")
                .aggregate_id("c-1")
                .aggregate_name("Counter")
                .version(Version::first())
                .payload_raw(serde_json::json!({"by": 1}))
                .build(),
        ];

        let mut counter = Counter::default();
        let result = counter.load_from_history(&history);

        assert!(matches!(result, Err(DomainError::UnknownEvent { .. })));
    }
}
