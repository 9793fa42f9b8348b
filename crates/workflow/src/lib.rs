//! Side effects driven by the allocator event stream.
//!
//! Reactors never touch the event store directly. They observe stored events
//! (or poll an external system) and feed their conclusions back as commands
//! through the command bus, so every state change still passes the aggregate's
//! guards:
//!
//! 1. [`PullRequestReactor`] opens the registry pull request when an
//!    application is created and relabels it whenever the phase changes.
//! 2. [`RkhApprovalSubscriber`] polls the root key holder multisig and records
//!    newly observed approvals for applications waiting on it.

pub mod error;
pub mod pull_request;
pub mod rkh_approvals;
pub mod services;

pub use error::{Result, WorkflowError};
pub use pull_request::{PullRequestReactor, subscribe_pull_request_reactor};
pub use rkh_approvals::RkhApprovalSubscriber;
pub use services::{
    InMemoryMultisigApprovalSource, InMemoryPullRequestService, MultisigApprovalSource,
    MultisigProposal, PullRequestService,
};
