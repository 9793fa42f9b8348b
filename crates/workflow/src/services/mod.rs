//! External collaborators and in-memory implementations.

pub mod github;
pub mod multisig;

pub use github::{InMemoryPullRequestService, PullRequestService};
pub use multisig::{InMemoryMultisigApprovalSource, MultisigApprovalSource, MultisigProposal};
