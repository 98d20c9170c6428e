use super::envelope::MessageEnvelope;
use crate::content::ContentItem;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::PathBuf;

/// Locates one record file inside a day partition.
///
/// The fields other than `path` are parsed from the file name
/// (`<epoch>_<messageKey>_<senderKey>.<ext>`) so handles can be ordered
/// without opening files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordHandle {
    pub path: PathBuf,
    pub date: NaiveDate,
    pub epoch: i64,
    pub message_key: String,
    pub sender_key: String,
}

impl RecordHandle {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.epoch, 0)
    }
}

impl Ord for RecordHandle {
    fn cmp(&self, other: &Self) -> Ordering {
        self.date
            .cmp(&other.date)
            .then(self.epoch.cmp(&other.epoch))
            .then_with(|| self.file_name().cmp(&other.file_name()))
    }
}

impl PartialOrd for RecordHandle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One persisted fragment: an envelope plus the content items written under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub envelope: MessageEnvelope,
    pub contents: Vec<ContentItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<RecordHandle>,
}

impl MessageRecord {
    pub fn new(envelope: MessageEnvelope, contents: Vec<ContentItem>) -> Self {
        Self {
            envelope,
            contents,
            handle: None,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.envelope.message_id
    }

    /// Highest sequence number carried by the envelope or any content item.
    pub fn max_sequence(&self) -> u64 {
        self.contents
            .iter()
            .map(|c| c.sequence)
            .fold(self.envelope.sequence_number, u64::max)
    }
}

/// Summary of the most recent record in a store.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordInfo {
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
    pub handle: RecordHandle,
}
