//! Polls the root key holder multisig for approvals.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use domain::{ApplicationCommand, ApplicationPhase, CommandBus};
use projections::ApplicationDetailsView;

use crate::error::Result;
use crate::services::MultisigApprovalSource;

/// Records newly observed multisig approvals for applications in
/// `RKH_APPROVAL`.
///
/// A proposal belongs to the application whose applicant address it targets.
/// Approval sets already recorded in the read model are not sent again.
pub struct RkhApprovalSubscriber<M: MultisigApprovalSource> {
    source: M,
    applications: Arc<ApplicationDetailsView>,
    commands: Arc<CommandBus<ApplicationCommand>>,
}

impl<M: MultisigApprovalSource> RkhApprovalSubscriber<M> {
    pub fn new(
        source: M,
        applications: Arc<ApplicationDetailsView>,
        commands: Arc<CommandBus<ApplicationCommand>>,
    ) -> Self {
        Self {
            source,
            applications,
            commands,
        }
    }

    /// Runs one poll and returns how many applications got an update.
    ///
    /// A failing command is logged and skipped so one application cannot
    /// stall the others; only an unreadable multisig fails the poll.
    #[tracing::instrument(skip(self))]
    pub async fn poll_once(&self) -> Result<usize> {
        let waiting = self.applications.by_phase(ApplicationPhase::RkhApproval).await;
        if waiting.is_empty() {
            return Ok(0);
        }

        let proposals = self.source.pending_proposals().await?;
        let mut updated = 0;

        for application in waiting {
            let Some(proposal) = proposals
                .iter()
                .find(|p| p.allocator_address == application.applicant_address)
            else {
                continue;
            };

            if proposal
                .approvers
                .iter()
                .all(|signer| application.rkh_approvals.contains(signer))
            {
                continue;
            }

            let command = ApplicationCommand::update_rkh_approvals(
                application.application_id.clone(),
                proposal.message_id,
                proposal.approvers.clone(),
            );
            match self.commands.send(command).await {
                Ok(outcome) => {
                    updated += 1;
                    metrics::counter!("workflow_rkh_approval_updates_total").increment(1);
                    tracing::info!(
                        application_id = %application.application_id,
                        message_id = proposal.message_id,
                        approvals = proposal.approvers.len(),
                        version = %outcome.version,
                        "recorded rkh approvals"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        application_id = %application.application_id,
                        code = err.code(),
                        error = %err,
                        "failed to record rkh approvals"
                    );
                }
            }
        }

        Ok(updated)
    }

    /// Polls every `interval` until `shutdown` resolves.
    pub async fn run<F>(&self, interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("rkh approval polling stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.poll_once().await {
                        tracing::error!(error = %err, "rkh approval poll failed");
                    }
                }
            }
        }
    }
}
