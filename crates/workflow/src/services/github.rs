//! Pull request service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use domain::{Applicant, ApplicationPhase, PullRequestLink};
use tokio::sync::RwLock;

use crate::error::{Result, WorkflowError};

/// Registry pull requests that mirror applications on GitHub.
#[async_trait]
pub trait PullRequestService: Send + Sync {
    /// Opens the pull request for a new application.
    async fn open_pull_request(
        &self,
        application_id: &AggregateId,
        applicant: &Applicant,
    ) -> Result<PullRequestLink>;

    /// Returns the pull request already opened for an application.
    async fn find_pull_request(&self, application_id: &AggregateId) -> Result<Option<PullRequestLink>>;

    /// Replaces the phase label on a pull request.
    async fn set_phase_label(&self, number: u64, phase: ApplicationPhase) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryPullRequestState {
    pull_requests: HashMap<AggregateId, PullRequestLink>,
    labels: HashMap<u64, ApplicationPhase>,
    next_number: u64,
    opened: usize,
    fail_on_open: bool,
}

/// In-memory pull request service for tests and local runs.
#[derive(Debug, Clone)]
pub struct InMemoryPullRequestService {
    repository_url: String,
    state: Arc<RwLock<InMemoryPullRequestState>>,
}

impl Default for InMemoryPullRequestService {
    fn default() -> Self {
        Self::new("https://github.com/filecoin-project/Allocator-Registry")
    }
}

impl InMemoryPullRequestService {
    pub fn new(repository_url: impl Into<String>) -> Self {
        Self {
            repository_url: repository_url.into(),
            state: Arc::default(),
        }
    }

    /// Configures the service to fail every open call.
    pub async fn set_fail_on_open(&self, fail: bool) {
        self.state.write().await.fail_on_open = fail;
    }

    /// Number of pull requests actually opened.
    pub async fn opened_count(&self) -> usize {
        self.state.read().await.opened
    }

    pub async fn label(&self, number: u64) -> Option<ApplicationPhase> {
        self.state.read().await.labels.get(&number).copied()
    }
}

#[async_trait]
impl PullRequestService for InMemoryPullRequestService {
    async fn open_pull_request(
        &self,
        application_id: &AggregateId,
        applicant: &Applicant,
    ) -> Result<PullRequestLink> {
        let mut state = self.state.write().await;

        if state.fail_on_open {
            return Err(WorkflowError::PullRequestService(format!(
                "could not open pull request for {}",
                applicant.github_username
            )));
        }

        state.next_number += 1;
        state.opened += 1;
        let number = state.next_number;
        let link = PullRequestLink {
            number,
            url: format!("{}/pull/{}", self.repository_url, number),
            commit_sha: uuid::Uuid::new_v4().simple().to_string(),
        };
        state.pull_requests.insert(application_id.clone(), link.clone());
        state.labels.insert(number, ApplicationPhase::Kyc);

        Ok(link)
    }

    async fn find_pull_request(&self, application_id: &AggregateId) -> Result<Option<PullRequestLink>> {
        Ok(self.state.read().await.pull_requests.get(application_id).cloned())
    }

    async fn set_phase_label(&self, number: u64, phase: ApplicationPhase) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.labels.contains_key(&number) {
            return Err(WorkflowError::PullRequestService(format!(
                "pull request #{number} does not exist"
            )));
        }
        state.labels.insert(number, phase);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn applicant() -> Applicant {
        Applicant::new("Acme Storage", "f1acme", "acme")
    }

    #[tokio::test]
    async fn open_assigns_sequential_numbers() {
        let service = InMemoryPullRequestService::default();

        let first = service
            .open_pull_request(&AggregateId::new("alloc-1"), &applicant())
            .await
            .unwrap();
        let second = service
            .open_pull_request(&AggregateId::new("alloc-2"), &applicant())
            .await
            .unwrap();

        assert_eq!(first.number, 1);
        assert_eq!(second.number, 2);
        assert!(second.url.ends_with("/pull/2"));
        assert_eq!(service.label(1).await, Some(ApplicationPhase::Kyc));
    }

    #[tokio::test]
    async fn find_returns_opened_link() {
        let service = InMemoryPullRequestService::default();
        let id = AggregateId::new("alloc-1");
        assert!(service.find_pull_request(&id).await.unwrap().is_none());

        let link = service.open_pull_request(&id, &applicant()).await.unwrap();

        assert_eq!(service.find_pull_request(&id).await.unwrap(), Some(link));
    }

    #[tokio::test]
    async fn fail_on_open() {
        let service = InMemoryPullRequestService::default();
        service.set_fail_on_open(true).await;

        let result = service
            .open_pull_request(&AggregateId::new("alloc-1"), &applicant())
            .await;

        assert!(matches!(result, Err(WorkflowError::PullRequestService(_))));
        assert_eq!(service.opened_count().await, 0);
    }

    #[tokio::test]
    async fn labelling_unknown_pull_request_fails() {
        let service = InMemoryPullRequestService::default();
        assert!(
            service
                .set_phase_label(7, ApplicationPhase::Approved)
                .await
                .is_err()
        );
    }
}
