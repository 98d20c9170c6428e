//! On-disk format of one record file.
//!
//! A record is two YAML documents:
//!
//! ```text
//! ---
//! metadata:
//!   message_id: m1
//!   sender_id: agent-1
//!   sender_name: Planner
//!   timestamp: 2025-03-01T09:00:00Z
//!   gsn: 42
//! ---
//! content:
//!   - content_id: c1
//!     content_type: text
//!     status: completed
//!     gsn: 42
//!     data:
//!       text: Hello
//! ```
//!
//! Parsing is tolerant: an unreadable metadata document is rebuilt from the
//! file name and unreadable content entries are skipped one at a time.

use chrono::{DateTime, Utc};
use parley_core::content::{ContentItem, ContentStatus, make_content};
use parley_core::error::Result;
use parley_core::history::naming::base_message_key;
use parley_core::message::{MessageEnvelope, MessageRecord, RecordHandle};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Serialize, Deserialize)]
struct MetadataDocument {
    metadata: MetadataDto,
}

#[derive(Debug, Serialize, Deserialize)]
struct MetadataDto {
    message_id: String,
    #[serde(default)]
    sender_id: String,
    #[serde(default)]
    sender_name: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    gsn: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    extra: BTreeMap<String, Value>,
}

#[derive(Debug, Serialize)]
struct ContentDocument {
    content: Vec<ContentEntryDto>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ContentEntryDto {
    content_id: String,
    content_type: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    gsn: Option<u64>,
    #[serde(default)]
    data: Value,
}

impl From<&MessageEnvelope> for MetadataDto {
    fn from(envelope: &MessageEnvelope) -> Self {
        Self {
            message_id: envelope.message_id.clone(),
            sender_id: envelope.sender_id.clone(),
            sender_name: envelope.sender_name.clone(),
            timestamp: envelope.timestamp,
            gsn: envelope.sequence_number,
            extra: envelope.metadata.clone(),
        }
    }
}

impl MetadataDto {
    fn into_envelope(self) -> MessageEnvelope {
        MessageEnvelope {
            message_id: self.message_id,
            sender_id: self.sender_id,
            sender_name: self.sender_name,
            timestamp: self.timestamp,
            sequence_number: self.gsn,
            metadata: self.extra,
        }
    }
}

impl From<&ContentItem> for ContentEntryDto {
    fn from(item: &ContentItem) -> Self {
        Self {
            content_id: item.content_id.clone(),
            content_type: item.content_type().to_string(),
            status: Some(item.status.to_string()),
            parent_id: item.parent_id.clone(),
            gsn: Some(item.sequence),
            data: item.payload.data(),
        }
    }
}

impl ContentEntryDto {
    fn into_item(self, default_gsn: u64) -> ContentItem {
        let status = self
            .status
            .as_deref()
            .and_then(|s| ContentStatus::from_str(s).ok())
            .unwrap_or_default();
        ContentItem {
            content_id: self.content_id,
            status,
            parent_id: self.parent_id,
            sequence: self.gsn.unwrap_or(default_gsn),
            payload: make_content(&self.content_type, self.data),
        }
    }
}

/// Serializes a record into its two-document form.
pub fn render_record(envelope: &MessageEnvelope, contents: &[ContentItem]) -> Result<String> {
    let metadata = serde_yaml::to_string(&MetadataDocument {
        metadata: MetadataDto::from(envelope),
    })?;
    let content = serde_yaml::to_string(&ContentDocument {
        content: contents.iter().map(ContentEntryDto::from).collect(),
    })?;
    Ok(format!("---\n{}---\n{}", metadata, content))
}

/// Parses a record file, recovering whatever is readable.
pub fn parse_record(text: &str, handle: &RecordHandle) -> MessageRecord {
    let mut metadata: Option<MetadataDto> = None;
    let mut raw_entries: Vec<serde_yaml::Value> = Vec::new();

    for document in serde_yaml::Deserializer::from_str(text) {
        let value = match serde_yaml::Value::deserialize(document) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    "[RecordFormat] Unreadable YAML in {}: {}",
                    handle.path.display(),
                    e
                );
                break;
            }
        };

        if value.get("metadata").is_some() && metadata.is_none() {
            match serde_yaml::from_value::<MetadataDocument>(value) {
                Ok(doc) => metadata = Some(doc.metadata),
                Err(e) => tracing::warn!(
                    "[RecordFormat] Malformed metadata in {}: {}",
                    handle.path.display(),
                    e
                ),
            }
        } else if let Some(serde_yaml::Value::Sequence(entries)) = value.get("content") {
            raw_entries.extend(entries.iter().cloned());
        }
    }

    let envelope = match metadata {
        Some(dto) => dto.into_envelope(),
        None => envelope_from_handle(handle),
    };

    let mut contents = Vec::with_capacity(raw_entries.len());
    for entry in raw_entries {
        match serde_yaml::from_value::<ContentEntryDto>(entry) {
            Ok(dto) => contents.push(dto.into_item(envelope.sequence_number)),
            Err(e) => tracing::warn!(
                "[RecordFormat] Skipping malformed content entry in {}: {}",
                handle.path.display(),
                e
            ),
        }
    }

    MessageRecord {
        envelope,
        contents,
        handle: Some(handle.clone()),
    }
}

/// Best-effort envelope when the metadata document cannot be read.
fn envelope_from_handle(handle: &RecordHandle) -> MessageEnvelope {
    let timestamp = handle.timestamp().unwrap_or_default();
    MessageEnvelope::new(
        base_message_key(&handle.message_key),
        handle.sender_key.clone(),
        handle.sender_key.clone(),
    )
    .with_timestamp(timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use parley_core::content::ContentPayload;
    use parley_core::skill::{SkillAggregate, SkillEvent, SkillState};
    use std::path::PathBuf;

    fn handle() -> RecordHandle {
        RecordHandle {
            path: PathBuf::from("/tmp/20250301/1740819600_m1_agent-1.yaml"),
            date: chrono::NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            epoch: 1_740_819_600,
            message_key: "m1".into(),
            sender_key: "agent-1".into(),
        }
    }

    #[test]
    fn test_render_then_parse() {
        let envelope = MessageEnvelope {
            sequence_number: 7,
            ..MessageEnvelope::new("m1", "agent-1", "Planner")
                .with_timestamp(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap())
                .with_metadata("event_type", "run_started")
        };
        let skill = SkillAggregate::from_event(
            Some("run1".into()),
            "search",
            SkillEvent::Progress {
                text: Some("halfway".into()),
                percentage: Some(50.0),
            },
        );
        let contents = vec![
            ContentItem::text("c1", "Hello").with_sequence(7),
            ContentItem::new("s1", ContentPayload::Skill(skill))
                .with_parent("run0")
                .with_sequence(7),
        ];

        let text = render_record(&envelope, &contents).unwrap();
        assert!(text.starts_with("---\nmetadata:\n"));

        let record = parse_record(&text, &handle());
        assert_eq!(record.envelope, envelope);
        assert_eq!(record.contents, contents);
        assert_eq!(
            record.contents[1].as_skill().unwrap().state,
            SkillState::InProgress
        );
    }

    #[test]
    fn test_missing_content_gsn_defaults_to_envelope() {
        let text = "---\nmetadata:\n  message_id: m1\n  sender_id: agent-1\n  sender_name: Planner\n  timestamp: 2025-03-01T09:00:00Z\n  gsn: 12\n---\ncontent:\n  - content_id: c1\n    content_type: text\n    data:\n      text: hi\n";
        let record = parse_record(text, &handle());

        assert_eq!(record.contents.len(), 1);
        assert_eq!(record.contents[0].sequence, 12);
        assert_eq!(record.contents[0].status, ContentStatus::Completed);
    }

    #[test]
    fn test_broken_metadata_falls_back_to_file_name() {
        let text = "---\nmetadata:\n  sender_name: [oops\n---\ncontent: []\n";
        let record = parse_record(text, &handle());

        assert_eq!(record.envelope.message_id, "m1");
        assert_eq!(record.envelope.sender_id, "agent-1");
        assert_eq!(record.envelope.sequence_number, 0);
        assert_eq!(record.envelope.timestamp.timestamp(), 1_740_819_600);
    }

    #[test]
    fn test_bad_entries_are_skipped_individually() {
        let text = "---\nmetadata:\n  message_id: m1\n  timestamp: 2025-03-01T09:00:00Z\n  gsn: 3\n---\ncontent:\n  - content_type: text\n    data: {text: no id}\n  - content_id: c2\n    content_type: hologram\n    data: {text: beam}\n  - content_id: c3\n    content_type: text\n    status: weird\n    data: {text: ok}\n";
        let record = parse_record(text, &handle());

        let ids: Vec<_> = record.contents.iter().map(|c| c.content_id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c3"]);
        assert_eq!(record.contents[0].payload, ContentPayload::text("beam"));
        assert_eq!(record.contents[1].status, ContentStatus::Completed);
    }
}
