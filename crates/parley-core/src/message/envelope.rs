use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Sender id reserved for the human participant.
pub const USER_SENDER_ID: &str = "user";

/// Metadata key carrying the lifecycle event of a system record.
pub const EVENT_TYPE_KEY: &str = "event_type";

/// Identity and provenance of one logical message.
///
/// All fragments of a message share `message_id`. `timestamp` is the time of
/// the first fragment; `sequence_number` is the GSN of the latest fragment
/// written for this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub message_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub sequence_number: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl MessageEnvelope {
    /// Creates an envelope stamped with the current time.
    ///
    /// The sequence number stays 0 until the store assigns one on append.
    pub fn new(
        message_id: impl Into<String>,
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            timestamp: Utc::now(),
            sequence_number: 0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_from_user(&self) -> bool {
        self.sender_id == USER_SENDER_ID
    }

    /// Lifecycle event carried by system records, if any.
    pub fn event_type(&self) -> Option<&str> {
        self.metadata.get(EVENT_TYPE_KEY).and_then(Value::as_str)
    }

    pub fn is_system_event(&self) -> bool {
        self.event_type().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_sentinel() {
        let envelope = MessageEnvelope::new("m1", USER_SENDER_ID, "You");
        assert!(envelope.is_from_user());
        assert!(!MessageEnvelope::new("m2", "agent-7", "Planner").is_from_user());
    }

    #[test]
    fn test_event_type_from_metadata() {
        let envelope =
            MessageEnvelope::new("m1", "system", "System").with_metadata(EVENT_TYPE_KEY, "run_started");
        assert_eq!(envelope.event_type(), Some("run_started"));
        assert!(envelope.is_system_event());

        let envelope = MessageEnvelope::new("m2", "system", "System").with_metadata(EVENT_TYPE_KEY, 3);
        assert_eq!(envelope.event_type(), None);
    }
}
