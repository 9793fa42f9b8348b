//! Application queries.

use common::AggregateId;
use event_store::EventEnvelope;

use crate::bus::Query;

use super::DatacapAllocator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationQuery {
    /// Current state, rehydrated from history.
    GetApplication { application_id: AggregateId },
    /// Stored events in version order.
    GetApplicationHistory { application_id: AggregateId },
}

impl ApplicationQuery {
    pub const NAMES: &'static [&'static str] = &["GetApplication", "GetApplicationHistory"];

    pub fn get_application(application_id: impl Into<AggregateId>) -> Self {
        ApplicationQuery::GetApplication {
            application_id: application_id.into(),
        }
    }

    pub fn get_history(application_id: impl Into<AggregateId>) -> Self {
        ApplicationQuery::GetApplicationHistory {
            application_id: application_id.into(),
        }
    }

    pub fn application_id(&self) -> &AggregateId {
        match self {
            ApplicationQuery::GetApplication { application_id }
            | ApplicationQuery::GetApplicationHistory { application_id } => application_id,
        }
    }
}

impl Query for ApplicationQuery {
    type Output = QueryResult;

    fn name(&self) -> &'static str {
        match self {
            ApplicationQuery::GetApplication { .. } => "GetApplication",
            ApplicationQuery::GetApplicationHistory { .. } => "GetApplicationHistory",
        }
    }
}

#[derive(Debug, Clone)]
pub enum QueryResult {
    Application(Box<DatacapAllocator>),
    History(Vec<EventEnvelope>),
}
