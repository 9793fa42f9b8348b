//! Event-sourced repository.

use std::marker::PhantomData;

use common::{AggregateId, CorrelationId};
use event_store::{
    AppendOptions, CORRELATION_ID_KEY, EventEnvelope, EventStore, EventStoreError,
    SCHEMA_VERSION_KEY, UncommittedEvent,
};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::error::DomainError;

/// Loads aggregates by replaying their history and saves their pending events.
///
/// The repository does no version tracking of its own: `save` sends exactly
/// the [`AppendOptions`] it is given.
pub struct EventSourcedRepository<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    _phantom: PhantomData<fn() -> A>,
}

impl<S, A> EventSourcedRepository<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Rebuilds an aggregate from its full history.
    #[tracing::instrument(skip(self), fields(aggregate_type = A::aggregate_type()))]
    pub async fn get_by_id(&self, id: &AggregateId) -> Result<A, DomainError> {
        let history = self.history(id).await?;
        let mut aggregate = A::default();
        aggregate.load_from_history(&history)?;
        Ok(aggregate)
    }

    /// Returns the stored envelopes of an aggregate.
    pub async fn history(&self, id: &AggregateId) -> Result<Vec<EventEnvelope>, DomainError> {
        self.store
            .get_events_for_aggregate(id)
            .await
            .map_err(|err| match err {
                EventStoreError::AggregateNotFound(id) => DomainError::AggregateNotFound {
                    aggregate_type: A::aggregate_type(),
                    aggregate_id: id.to_string(),
                },
                other => other.into(),
            })
    }

    /// Persists the aggregate's pending events and clears its buffer.
    pub async fn save(
        &self,
        aggregate: &mut A,
        options: AppendOptions,
    ) -> Result<Vec<EventEnvelope>, DomainError> {
        self.save_with_correlation(aggregate, options, None).await
    }

    /// Like [`save`](Self::save), recording the correlation id on every event.
    #[tracing::instrument(
        skip(self, aggregate),
        fields(
            aggregate_type = A::aggregate_type(),
            aggregate_id = ?aggregate.id(),
            pending = aggregate.uncommitted_events().len()
        )
    )]
    pub async fn save_with_correlation(
        &self,
        aggregate: &mut A,
        options: AppendOptions,
        correlation_id: Option<CorrelationId>,
    ) -> Result<Vec<EventEnvelope>, DomainError> {
        if aggregate.uncommitted_events().is_empty() {
            return Ok(Vec::new());
        }

        let id = aggregate
            .id()
            .cloned()
            .ok_or(DomainError::MissingAggregateId {
                aggregate_type: A::aggregate_type(),
            })?;

        let mut pending = Vec::with_capacity(aggregate.uncommitted_events().len());
        for event in aggregate.uncommitted_events() {
            let mut uncommitted = UncommittedEvent::new(
                id.clone(),
                A::aggregate_type(),
                event.event_type(),
                event.to_payload()?,
            )
            .with_metadata(
                SCHEMA_VERSION_KEY,
                serde_json::json!(<A::Event as DomainEvent>::SCHEMA_VERSION),
            );
            if let Some(correlation_id) = correlation_id {
                uncommitted = uncommitted
                    .with_metadata(CORRELATION_ID_KEY, serde_json::json!(correlation_id.to_string()));
            }
            pending.push(uncommitted);
        }

        let stored = self.store.append(&id, pending, options).await?;

        if let Some(last) = stored.last() {
            aggregate.mark_changes_as_committed(last.version);
        }
        Ok(stored)
    }
}
