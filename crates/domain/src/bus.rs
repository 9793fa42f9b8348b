//! Command and query dispatch.
//!
//! Commands and queries are tagged values: `name()` returns the variant tag
//! and each tag is bound to exactly one handler.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use common::CorrelationId;

use crate::error::DomainError;

/// An intention to change state. Never persisted.
pub trait Command: Send + Sync + 'static {
    type Output: Send;

    /// Tag used to resolve the handler.
    fn name(&self) -> &'static str;

    fn correlation_id(&self) -> CorrelationId;
}

#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync {
    /// Tag of the commands this handler accepts.
    fn command_name(&self) -> &'static str;

    async fn handle(&self, command: C) -> Result<C::Output, DomainError>;
}

/// Routes each command to the one handler bound to its tag.
pub struct CommandBus<C: Command> {
    handlers: HashMap<&'static str, Arc<dyn CommandHandler<C>>>,
}

impl<C: Command> Default for CommandBus<C> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<C: Command> CommandBus<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a handler to its declared tag. A second handler for the same tag
    /// is a configuration error.
    pub fn register_handler(&mut self, handler: Arc<dyn CommandHandler<C>>) -> Result<(), DomainError> {
        let name = handler.command_name();
        if self.handlers.contains_key(name) {
            return Err(DomainError::DuplicateHandler {
                name: name.to_string(),
            });
        }
        tracing::debug!(command = name, "registered command handler");
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Fails listing every name in `names` that has no handler.
    pub fn ensure_registered(&self, names: &[&str]) -> Result<(), DomainError> {
        let missing: Vec<String> = names
            .iter()
            .filter(|name| !self.is_registered(name))
            .map(|name| name.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DomainError::MissingHandlers { names: missing })
        }
    }

    /// Dispatches a command to its handler and awaits the result. No retries.
    #[tracing::instrument(
        skip(self, command),
        fields(command = command.name(), correlation_id = %command.correlation_id())
    )]
    pub async fn send(&self, command: C) -> Result<C::Output, DomainError> {
        let name = command.name();
        let handler = self
            .handlers
            .get(name)
            .cloned()
            .ok_or_else(|| DomainError::HandlerNotRegistered {
                name: name.to_string(),
            })?;

        metrics::counter!("command_bus_dispatched_total", "command" => name).increment(1);

        let result = handler.handle(command).await;
        if let Err(err) = &result {
            tracing::warn!(code = err.code(), error = %err, "command failed");
        }
        result
    }
}

/// A read request. Never changes state.
pub trait Query: Send + Sync + 'static {
    type Output: Send;

    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait QueryHandler<Q: Query>: Send + Sync {
    fn query_name(&self) -> &'static str;

    async fn handle(&self, query: Q) -> Result<Q::Output, DomainError>;
}

/// Routes each query to the one handler bound to its tag.
pub struct QueryBus<Q: Query> {
    handlers: HashMap<&'static str, Arc<dyn QueryHandler<Q>>>,
}

impl<Q: Query> Default for QueryBus<Q> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<Q: Query> QueryBus<Q> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_handler(&mut self, handler: Arc<dyn QueryHandler<Q>>) -> Result<(), DomainError> {
        let name = handler.query_name();
        if self.handlers.contains_key(name) {
            return Err(DomainError::DuplicateHandler {
                name: name.to_string(),
            });
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn ensure_registered(&self, names: &[&str]) -> Result<(), DomainError> {
        let missing: Vec<String> = names
            .iter()
            .filter(|name| !self.handlers.contains_key(**name))
            .map(|name| name.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DomainError::MissingHandlers { names: missing })
        }
    }

    #[tracing::instrument(skip(self, query), fields(query = query.name()))]
    pub async fn execute(&self, query: Q) -> Result<Q::Output, DomainError> {
        let name = query.name();
        let handler = self
            .handlers
            .get(name)
            .cloned()
            .ok_or_else(|| DomainError::HandlerNotRegistered {
                name: name.to_string(),
            })?;
        handler.handle(query).await
    }
}
