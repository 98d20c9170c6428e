//! History repository trait.
//!
//! Defines the persistence contract the window index and the application
//! layer are written against.

use crate::content::ContentItem;
use crate::error::{ParleyError, Result};
use crate::message::{MessageEnvelope, MessageRecord, RecordHandle, RecordInfo};
use async_trait::async_trait;
use chrono::NaiveDate;

/// An append-only, day-partitioned store of message records.
///
/// # Implementation Notes
///
/// Implementations should handle:
/// - Assigning a fresh sequence number on every `append`
/// - Crash-safe replacement of record files (a failed write leaves the prior
///   record intact)
/// - Tolerant loading: a record that cannot be fully parsed is returned
///   partially rather than failing
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Writes or extends the record for `envelope.message_id` and returns the
    /// record exactly as written, including the sequence number assigned to
    /// this call.
    ///
    /// With `append_mode`, content already stored for the message in its
    /// partition is read back and `delta` is concatenated to it. Without it,
    /// the record is replaced wholesale.
    ///
    /// # Returns
    ///
    /// - `Ok(MessageRecord)`: The written record, with `handle` set
    /// - `Err(ParleyError::Persistence)`: The write failed; nothing was replaced
    async fn append_record(
        &self,
        envelope: &MessageEnvelope,
        delta: &[ContentItem],
        append_mode: bool,
    ) -> Result<MessageRecord>;

    /// Like [`append_record`](Self::append_record), returning only the handle.
    async fn append(
        &self,
        envelope: &MessageEnvelope,
        delta: &[ContentItem],
        append_mode: bool,
    ) -> Result<RecordHandle> {
        let record = self.append_record(envelope, delta, append_mode).await?;
        record
            .handle
            .ok_or_else(|| ParleyError::internal("repository returned a record without a handle"))
    }

    /// Existing partitions, oldest first.
    async fn list_dates(&self) -> Result<Vec<NaiveDate>>;

    /// Record handles of one partition ordered by embedded timestamp, then
    /// file name. A missing partition yields an empty list.
    async fn list_record_files(&self, date: NaiveDate) -> Result<Vec<RecordHandle>>;

    /// Loads one record. Only fails when the file cannot be read at all.
    async fn load(&self, handle: &RecordHandle) -> Result<MessageRecord>;

    /// Whether the record file behind `handle` still exists.
    async fn exists(&self, handle: &RecordHandle) -> bool;

    /// The most recent record, scanning partitions newest first.
    async fn latest_record_info(&self) -> Result<Option<RecordInfo>>;
}
