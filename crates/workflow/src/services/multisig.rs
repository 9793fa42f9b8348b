//! Root key holder multisig access and in-memory implementation.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Result, WorkflowError};

/// A pending multisig proposal granting an allocator its DataCap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigProposal {
    /// On-chain message id of the proposal.
    pub message_id: u64,
    /// Address the proposal would make an allocator.
    pub allocator_address: String,
    /// Signers that have approved so far, proposer included.
    pub approvers: Vec<String>,
}

/// Read access to the root key holder multisig.
#[async_trait]
pub trait MultisigApprovalSource: Send + Sync {
    async fn pending_proposals(&self) -> Result<Vec<MultisigProposal>>;
}

#[derive(Debug, Default)]
struct InMemoryMultisigState {
    proposals: Vec<MultisigProposal>,
    unavailable: bool,
}

/// In-memory multisig for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMultisigApprovalSource {
    state: Arc<RwLock<InMemoryMultisigState>>,
}

impl InMemoryMultisigApprovalSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a proposal, or replaces the one with the same message id.
    pub async fn upsert_proposal(&self, proposal: MultisigProposal) {
        let mut state = self.state.write().await;
        state.proposals.retain(|p| p.message_id != proposal.message_id);
        state.proposals.push(proposal);
    }

    /// Records an approval on an existing proposal.
    pub async fn approve(&self, message_id: u64, signer: impl Into<String>) {
        let signer = signer.into();
        let mut state = self.state.write().await;
        if let Some(proposal) = state.proposals.iter_mut().find(|p| p.message_id == message_id) {
            if !proposal.approvers.contains(&signer) {
                proposal.approvers.push(signer);
            }
        }
    }

    /// Makes every read fail until reset.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }
}

#[async_trait]
impl MultisigApprovalSource for InMemoryMultisigApprovalSource {
    async fn pending_proposals(&self) -> Result<Vec<MultisigProposal>> {
        let state = self.state.read().await;
        if state.unavailable {
            return Err(WorkflowError::ApprovalSource("multisig node unreachable".to_string()));
        }
        Ok(state.proposals.clone())
    }
}
