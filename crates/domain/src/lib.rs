//! Domain layer of the allocator workflow.
//!
//! This crate provides:
//! - [`Aggregate`] and [`DomainEvent`], the event-sourced entity contract
//! - [`EventSourcedRepository`] to load aggregates from history and save them
//! - [`CommandBus`] and [`QueryBus`], tag-keyed single-handler dispatch
//! - the [`DatacapAllocator`] application aggregate and its service

pub mod aggregate;
pub mod application;
pub mod bus;
pub mod error;
pub mod repository;

pub use aggregate::{Aggregate, AggregateBase, DomainEvent};
pub use application::{
    AllocationInstructions, AllocationMethod, Applicant, ApplicationCommand, ApplicationConfig,
    ApplicationError, ApplicationEvent, ApplicationPhase, ApplicationQuery, ApplicationService,
    CommandKind, CommandOutcome, DATACAP_ALLOCATOR, DatacapAllocator, KycResult, PhaseStatus,
    PullRequestLink, QueryResult, register_application_handlers,
};
pub use bus::{Command, CommandBus, CommandHandler, Query, QueryBus, QueryHandler};
pub use error::{DomainError, ErrorStatus};
pub use repository::EventSourcedRepository;
