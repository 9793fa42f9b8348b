//! Value objects for the application domain.

use serde::{Deserialize, Serialize};

use super::{AllocationMethod, ApplicationError};

/// Who is applying for DataCap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Applicant {
    pub name: String,
    /// Filecoin address that will hold the allocator role.
    pub address: String,
    pub github_username: String,
}

impl Applicant {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        github_username: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            github_username: github_username.into(),
        }
    }
}

/// Outcome reported by the KYC provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KycResult {
    pub provider: String,
    /// Provider-side reference for the check.
    pub reference: String,
    #[serde(default)]
    pub score: Option<u32>,
}

/// Raw allocation instruction columns, as entered by governance.
///
/// Kept unvalidated until the governance review is approved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationInstructions {
    pub methods: Vec<String>,
    pub amounts: Vec<u64>,
}

/// One well-formed instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationInstruction {
    pub method: AllocationMethod,
    pub amount: u64,
}

impl AllocationInstructions {
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty() && self.amounts.is_empty()
    }

    /// Validates every row and returns the last one, which decides the
    /// approval route.
    pub fn last_valid(&self) -> Result<AllocationInstruction, ApplicationError> {
        if self.is_empty() {
            return Err(ApplicationError::MissingAllocationInstructions);
        }
        if self.methods.len() != self.amounts.len() {
            return Err(ApplicationError::MalformedAllocationInstructions {
                reason: format!(
                    "{} methods but {} amounts",
                    self.methods.len(),
                    self.amounts.len()
                ),
            });
        }

        let mut last = None;
        for (method, amount) in self.methods.iter().zip(&self.amounts) {
            let method: AllocationMethod = method
                .parse()
                .map_err(|method| ApplicationError::UnknownAllocationMethod { method })?;
            if *amount == 0 {
                return Err(ApplicationError::MalformedAllocationInstructions {
                    reason: "amounts must be positive".to_string(),
                });
            }
            last = Some(AllocationInstruction {
                method,
                amount: *amount,
            });
        }

        last.ok_or(ApplicationError::MissingAllocationInstructions)
    }
}

/// The GitHub pull request tracking an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestLink {
    pub number: u64,
    pub url: String,
    pub commit_sha: String,
}
