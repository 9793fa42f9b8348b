//! Durable topic-exchange transport on NATS JetStream.
//!
//! | exchange concept         | JetStream                                    |
//! |--------------------------|----------------------------------------------|
//! | topic exchange `name`    | file-backed stream `name` on `name.>`         |
//! | routing key / channel    | subject `name.{channel}`                      |
//! | durable queue + binding  | durable pull consumer filtered on the binding |
//! | persistent message       | file storage                                  |
//! | ack / nack(no requeue)   | `ack()` / `ack_with(AckKind::Term)`            |

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_nats::{
    HeaderMap,
    jetstream::{self, AckKind, consumer::pull},
};
use async_trait::async_trait;
use event_store::{EventEnvelope, EventPublisher, PublishError};
use futures_util::StreamExt;
use tokio::{sync::Mutex, task::JoinHandle};

use crate::{
    BusError, DeliveryOutcome, EventBus, EventHandler, HandlerRegistry, Result,
    wire::{self, WireMessage},
};

/// Window in which the broker drops re-published events with the same dedup id.
const DUPLICATE_WINDOW: Duration = Duration::from_secs(120);

/// Connection and topology settings for the durable transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub url: String,
    pub exchange: String,
    pub exchange_type: String,
    pub queue: String,
    pub routing_key: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            exchange: "allocator".to_string(),
            exchange_type: "topic".to_string(),
            queue: "allocator-worker".to_string(),
            routing_key: "#".to_string(),
        }
    }
}

impl BrokerConfig {
    /// Rejects settings JetStream cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.exchange_type != "topic" {
            return Err(BusError::Config(format!(
                "unsupported exchange type {:?}, only \"topic\" is available",
                self.exchange_type
            )));
        }
        for (field, value) in [("exchange", &self.exchange), ("queue", &self.queue)] {
            if value.is_empty() || value.contains(['.', '*', '>', ' ']) {
                return Err(BusError::Config(format!("invalid {field} name {value:?}")));
            }
        }
        self.binding_subject().map(|_| ())
    }

    /// Subject a message published on `channel` lands on.
    pub fn subject_for(&self, channel: &str) -> String {
        format!("{}.{}", self.exchange, channel)
    }

    /// Translates the topic binding key into a subject filter.
    ///
    /// `*` matches one token in both worlds; `#` becomes `>` and is only
    /// accepted as the last token.
    pub fn binding_subject(&self) -> Result<String> {
        let tokens: Vec<&str> = self.routing_key.split('.').collect();
        let last = tokens.len() - 1;
        let mut translated = Vec::with_capacity(tokens.len());
        for (i, token) in tokens.iter().enumerate() {
            match *token {
                "#" if i == last => translated.push(">"),
                "#" => {
                    return Err(BusError::Config(format!(
                        "routing key {:?}: '#' is only supported as the last token",
                        self.routing_key
                    )));
                }
                "" => {
                    return Err(BusError::Config(format!(
                        "routing key {:?} has an empty token",
                        self.routing_key
                    )));
                }
                other => translated.push(other),
            }
        }
        Ok(format!("{}.{}", self.exchange, translated.join(".")))
    }
}

/// Observable lifecycle of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Ready,
}

struct Connection {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    stream: jetstream::stream::Stream,
    consumer_task: Option<JoinHandle<()>>,
}

enum ConnectionState {
    Disconnected,
    Connecting,
    Ready(Connection),
}

/// Event bus backed by a NATS JetStream stream.
///
/// The connection is opened once by [`init`](Self::init) and released by
/// [`close`](Self::close); publishing or subscribing in any other state fails
/// with [`BusError::NotInitialized`] instead of reconnecting.
pub struct NatsEventBus {
    config: BrokerConfig,
    state: Mutex<ConnectionState>,
    handlers: HandlerRegistry,
}

impl NatsEventBus {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ConnectionState::Disconnected),
            handlers: HandlerRegistry::new(),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub async fn status(&self) -> ConnectionStatus {
        match *self.state.lock().await {
            ConnectionState::Disconnected => ConnectionStatus::Disconnected,
            ConnectionState::Connecting => ConnectionStatus::Connecting,
            ConnectionState::Ready(_) => ConnectionStatus::Ready,
        }
    }

    /// Connects to the broker and declares the exchange stream.
    #[tracing::instrument(skip(self), fields(url = %self.config.url, exchange = %self.config.exchange))]
    pub async fn init(&self) -> Result<()> {
        self.config.validate()?;
        {
            let mut state = self.state.lock().await;
            if !matches!(*state, ConnectionState::Disconnected) {
                return Err(BusError::AlreadyInitialized);
            }
            *state = ConnectionState::Connecting;
        }

        match self.connect().await {
            Ok(connection) => {
                *self.state.lock().await = ConnectionState::Ready(connection);
                tracing::info!("event bus ready");
                Ok(())
            }
            Err(err) => {
                *self.state.lock().await = ConnectionState::Disconnected;
                tracing::error!(error = %err, "event bus failed to initialize");
                Err(err)
            }
        }
    }

    async fn connect(&self) -> Result<Connection> {
        let client = async_nats::connect(self.config.url.as_str())
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        let jetstream = jetstream::new(client.clone());

        let stream = jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: self.config.exchange.clone(),
                subjects: vec![format!("{}.>", self.config.exchange)],
                storage: jetstream::stream::StorageType::File,
                duplicate_window: DUPLICATE_WINDOW,
                ..Default::default()
            })
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;

        Ok(Connection {
            client,
            jetstream,
            stream,
            consumer_task: None,
        })
    }

    async fn jetstream(&self) -> Result<jetstream::Context> {
        match &*self.state.lock().await {
            ConnectionState::Ready(connection) => Ok(connection.jetstream.clone()),
            _ => Err(BusError::NotInitialized),
        }
    }

    /// Declares the durable queue and starts delivering its messages to the
    /// registered handlers in a background task.
    #[tracing::instrument(skip(self), fields(queue = %self.config.queue))]
    pub async fn subscribe_events(&self) -> Result<()> {
        let filter_subject = self.config.binding_subject()?;
        let mut state = self.state.lock().await;
        let ConnectionState::Ready(connection) = &mut *state else {
            return Err(BusError::NotInitialized);
        };
        if connection.consumer_task.is_some() {
            return Err(BusError::Subscribe(format!(
                "queue {} is already being consumed",
                self.config.queue
            )));
        }

        let consumer = connection
            .stream
            .get_or_create_consumer(
                &self.config.queue,
                pull::Config {
                    durable_name: Some(self.config.queue.clone()),
                    filter_subject: filter_subject.clone(),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        let handlers = self.handlers.clone();
        connection.consumer_task = Some(tokio::spawn(consume(messages, handlers)));

        tracing::info!(%filter_subject, "consuming durable queue");
        Ok(())
    }

    /// Stops consuming, flushes pending publishes and drops the connection.
    #[tracing::instrument(skip(self))]
    pub async fn close(&self) -> Result<()> {
        let previous =
            std::mem::replace(&mut *self.state.lock().await, ConnectionState::Disconnected);

        if let ConnectionState::Ready(connection) = previous {
            if let Some(task) = connection.consumer_task {
                task.abort();
            }
            connection
                .client
                .flush()
                .await
                .map_err(|e| BusError::Connection(e.to_string()))?;
            tracing::info!("event bus closed");
        }
        Ok(())
    }
}

#[async_trait]
impl EventBus for NatsEventBus {
    #[tracing::instrument(
        skip(self, event),
        fields(event_name = %event.event_name, aggregate_id = %event.aggregate_id, version = %event.version)
    )]
    async fn publish(&self, channel: &str, event: &EventEnvelope) -> Result<()> {
        let jetstream = self.jetstream().await?;
        let message = wire::encode(event)?;

        let mut headers = HeaderMap::new();
        for (name, value) in &message.headers {
            headers.insert(name.as_str(), value.as_str());
        }
        headers.insert(
            async_nats::header::NATS_MESSAGE_ID,
            wire::dedup_id(event).as_str(),
        );

        let ack = jetstream
            .publish_with_headers(self.config.subject_for(channel), headers, message.body.into())
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;

        if ack.duplicate {
            tracing::debug!("broker dropped duplicate publish");
        } else {
            metrics::counter!("event_bus_published_total").increment(1);
        }
        Ok(())
    }

    async fn register_handler(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.register(handler).await;
    }
}

#[async_trait]
impl EventPublisher for NatsEventBus {
    async fn publish(
        &self,
        channel: &str,
        event: &EventEnvelope,
    ) -> std::result::Result<(), PublishError> {
        EventBus::publish(self, channel, event)
            .await
            .map_err(PublishError::from)
    }
}

fn to_wire(message: &async_nats::Message) -> WireMessage {
    let mut headers = BTreeMap::new();
    if let Some(map) = &message.headers {
        for name in wire::ENVELOPE_HEADERS {
            if let Some(value) = map.get(name) {
                headers.insert(name.to_string(), value.as_str().to_string());
            }
        }
    }
    WireMessage {
        headers,
        body: message.payload.to_vec(),
    }
}

/// Decodes a delivered message and runs the matching handlers.
///
/// Undecodable messages are rejected; redelivering them cannot succeed.
pub async fn deliver(message: &WireMessage, handlers: &HandlerRegistry) -> DeliveryOutcome {
    let outcome = match wire::decode(message) {
        Ok(event) => handlers.dispatch(&event).await,
        Err(err) => {
            tracing::error!(error = %err, "dropping undecodable message");
            DeliveryOutcome::Reject {
                failures: vec![crate::HandlerError::new("wire", err.to_string())],
            }
        }
    };

    if outcome.is_ack() {
        metrics::counter!("event_bus_deliveries_acked_total").increment(1);
    } else {
        metrics::counter!("event_bus_deliveries_rejected_total").increment(1);
    }
    outcome
}

async fn consume(mut messages: pull::Stream, handlers: HandlerRegistry) {
    while let Some(next) = messages.next().await {
        let message = match next {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(error = %err, "error receiving from durable queue");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        let settled = match deliver(&to_wire(&message.message), &handlers).await {
            DeliveryOutcome::Ack { .. } => message.ack().await,
            DeliveryOutcome::Reject { .. } => message.ack_with(AckKind::Term).await,
        };
        if let Err(err) = settled {
            tracing::error!(subject = %message.subject, error = %err, "failed to settle message");
        }
    }
    tracing::warn!("durable queue stream ended");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use event_store::Version;

    use super::*;
    use crate::HandlerError;

    #[test]
    fn default_config_binds_everything() {
        let config = BrokerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.binding_subject().unwrap(), "allocator.>");
        assert_eq!(config.subject_for("allocator"), "allocator.allocator");
    }

    #[test]
    fn routing_key_wildcards_translate() {
        let config = BrokerConfig {
            routing_key: "allocator.*.#".to_string(),
            ..Default::default()
        };
        assert_eq!(config.binding_subject().unwrap(), "allocator.allocator.*.>");
    }

    #[test]
    fn inner_hash_is_rejected() {
        let config = BrokerConfig {
            routing_key: "#.allocator".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(BusError::Config(_))));
    }

    #[test]
    fn only_topic_exchanges_are_supported() {
        let config = BrokerConfig {
            exchange_type: "fanout".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(BusError::Config(_))));
    }

    #[tokio::test]
    async fn publish_before_init_fails_fast() {
        let bus = NatsEventBus::new(BrokerConfig::default());
        let event = EventEnvelope::builder()
            .event_name("KycApproved")
            .aggregate_id("alloc-1")
            .aggregate_name("DatacapAllocator")
            .version(Version::new(2))
            .payload_raw(serde_json::json!({}))
            .build();

        let result = EventBus::publish(&bus, "allocator", &event).await;

        assert!(matches!(result, Err(BusError::NotInitialized)));
        assert_eq!(bus.status().await, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn subscribe_before_init_fails_fast() {
        let bus = NatsEventBus::new(BrokerConfig::default());
        assert!(matches!(
            bus.subscribe_events().await,
            Err(BusError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn close_without_init_is_a_no_op() {
        let bus = NatsEventBus::new(BrokerConfig::default());
        bus.close().await.unwrap();
    }

    struct Flaky {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for Flaky {
        fn event_name(&self) -> &str {
            "KycApproved"
        }

        async fn handle(&self, _event: &EventEnvelope) -> std::result::Result<(), HandlerError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(HandlerError::new("Flaky", "first call fails"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn delivery_rejects_on_failure_and_acks_on_success() {
        let handlers = HandlerRegistry::new();
        handlers
            .register(Arc::new(Flaky {
                calls: AtomicUsize::new(0),
            }))
            .await;
        let event = EventEnvelope::builder()
            .event_name("KycApproved")
            .aggregate_id("alloc-1")
            .aggregate_name("DatacapAllocator")
            .version(Version::new(2))
            .payload_raw(serde_json::json!({}))
            .build();
        let message = wire::encode(&event).unwrap();

        assert!(!deliver(&message, &handlers).await.is_ack());
        assert!(deliver(&message, &handlers).await.is_ack());
    }

    #[tokio::test]
    async fn undecodable_delivery_is_rejected() {
        let message = WireMessage {
            headers: BTreeMap::new(),
            body: b"{}".to_vec(),
        };
        assert!(!deliver(&message, &HandlerRegistry::new()).await.is_ack());
    }
}
