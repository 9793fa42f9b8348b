use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an aggregate instance.
///
/// Application guids are chosen by the caller (for example the allocator
/// address or a registry slug), so the id wraps an opaque string rather
/// than a UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(String);

impl AggregateId {
    /// Creates an aggregate ID from any string-like guid.
    pub fn new(guid: impl Into<String>) -> Self {
        Self(guid.into())
    }

    /// Creates a new random aggregate ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the guid as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AggregateId {
    fn from(guid: &str) -> Self {
        Self(guid.to_string())
    }
}

impl From<String> for AggregateId {
    fn from(guid: String) -> Self {
        Self(guid)
    }
}

impl From<AggregateId> for String {
    fn from(id: AggregateId) -> Self {
        id.0
    }
}

/// Opaque identifier tying a command to the events and log lines it causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Creates a new random correlation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CorrelationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_id_generate_creates_unique_ids() {
        let id1 = AggregateId::generate();
        let id2 = AggregateId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn aggregate_id_preserves_guid() {
        let id = AggregateId::new("alloc-1");
        assert_eq!(id.as_str(), "alloc-1");
        assert_eq!(id.to_string(), "alloc-1");
        assert_eq!(AggregateId::from("alloc-1"), id);
    }

    #[test]
    fn aggregate_id_serializes_as_plain_string() {
        let id = AggregateId::new("alloc-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"alloc-1\"");
        let deserialized: AggregateId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn correlation_ids_are_unique() {
        assert_ne!(CorrelationId::new(), CorrelationId::new());
    }
}
