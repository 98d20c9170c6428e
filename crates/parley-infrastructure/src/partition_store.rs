//! Day-partitioned, file-per-message record store.
//!
//! # Directory Structure
//!
//! ```text
//! <root>/
//! ├── sequence.toml                      # last issued GSN
//! ├── writer.lock                        # advisory single-writer lock
//! ├── 20250301/
//! │   ├── 1740819600_m1_agent-1.yaml
//! │   └── 1740819655_m2_user.yaml
//! └── 20250302/
//!     └── ...
//! ```

use crate::sequence::SequenceFile;
use crate::storage::record_format::{parse_record, render_record};
use crate::storage::{FileLock, run_blocking, temp_path_for};
use async_trait::async_trait;
use chrono::NaiveDate;
use parley_core::config::HistoryConfig;
use parley_core::content::ContentItem;
use parley_core::error::{ParleyError, Result};
use parley_core::history::HistoryRepository;
use parley_core::history::naming::{
    disambiguated_record_file_name, matches_message_key, parse_partition_name,
    parse_record_file_name, partition_name, record_file_name,
};
use parley_core::message::{MessageEnvelope, MessageRecord, RecordHandle, RecordInfo};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const WRITER_LOCK_FILE: &str = "writer.lock";

/// File-backed [`HistoryRepository`] for one (workspace, project) root.
///
/// Writes are serialized by an in-process mutex guarding the GSN counter and
/// by an advisory lock file across processes. Reads take no lock: every
/// record replacement is a rename, so readers see the old or the new file.
pub struct PartitionStore {
    root: PathBuf,
    extension: String,
    sequence_file: SequenceFile,
    /// Last issued GSN.
    last_gsn: Mutex<u64>,
}

impl PartitionStore {
    /// Opens (creating if needed) the store rooted at `root`.
    ///
    /// The GSN counter resumes from `sequence.toml`, raised to the highest
    /// GSN found in the newest partition in case the counter file lagged
    /// behind a record write.
    pub async fn open(root: impl Into<PathBuf>, config: &HistoryConfig) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| ParleyError::persistence(&root, e.to_string()))?;

        let store = Self {
            sequence_file: SequenceFile::in_dir(&root),
            extension: config.file_extension.clone(),
            root,
            last_gsn: Mutex::new(0),
        };

        let persisted = store.sequence_file.load().await.unwrap_or_else(|e| {
            tracing::warn!("[PartitionStore] Ignoring unreadable sequence file: {}", e);
            0
        });
        let scanned = store.max_gsn_in_newest_partition().await?;
        *store.last_gsn.lock().await = persisted.max(scanned);

        tracing::debug!(
            "[PartitionStore] Opened {} (last gsn {})",
            store.root.display(),
            persisted.max(scanned)
        );
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Last GSN handed out by this store.
    pub async fn last_gsn(&self) -> u64 {
        *self.last_gsn.lock().await
    }

    fn partition_dir(&self, date: NaiveDate) -> PathBuf {
        self.root.join(partition_name(date))
    }

    async fn max_gsn_in_newest_partition(&self) -> Result<u64> {
        let Some(newest) = self.list_dates().await?.pop() else {
            return Ok(0);
        };
        let mut max = 0;
        for handle in self.list_record_files(newest).await? {
            match self.load(&handle).await {
                Ok(record) => max = max.max(record.max_sequence()),
                Err(e) => tracing::warn!(
                    "[PartitionStore] Skipping {} while scanning sequence numbers: {}",
                    handle.path.display(),
                    e
                ),
            }
        }
        Ok(max)
    }

    /// The newest record for `message_id` inside one partition.
    async fn find_in_partition(
        &self,
        date: NaiveDate,
        message_id: &str,
    ) -> Result<Option<MessageRecord>> {
        for handle in self.list_record_files(date).await?.into_iter().rev() {
            if !matches_message_key(&handle.message_key, message_id) {
                continue;
            }
            match self.load(&handle).await {
                Ok(record) if record.message_id() == message_id => return Ok(Some(record)),
                Ok(_) => {}
                Err(e) => tracing::warn!(
                    "[PartitionStore] Unreadable candidate {}: {}",
                    handle.path.display(),
                    e
                ),
            }
        }
        Ok(None)
    }

    /// Whether `path` already holds the record of a different message.
    async fn held_by_other(&self, path: &Path, date: NaiveDate, message_id: &str) -> bool {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return false;
        }
        let Some(handle) = self.handle_for(path.to_path_buf(), date) else {
            return false;
        };
        match self.load(&handle).await {
            Ok(record) => record.message_id() != message_id,
            Err(e) => {
                tracing::warn!(
                    "[PartitionStore] Treating unreadable {} as taken: {}",
                    path.display(),
                    e
                );
                true
            }
        }
    }

    fn handle_for(&self, path: PathBuf, date: NaiveDate) -> Option<RecordHandle> {
        let file_name = path.file_name()?.to_str()?.to_string();
        let parsed = parse_record_file_name(&file_name, &self.extension)?;
        Some(RecordHandle {
            path,
            date,
            epoch: parsed.epoch,
            message_key: parsed.message_key,
            sender_key: parsed.sender_key,
        })
    }

    async fn acquire_writer_lock(&self) -> Result<FileLock> {
        let lock_path = self.root.join(WRITER_LOCK_FILE);
        run_blocking(move || FileLock::acquire(&lock_path)).await
    }
}

/// Writes `contents` to a temp file next to `path`, syncs it, then renames it
/// over `path`. The temp file is removed if any step fails.
async fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    let tmp_path = temp_path_for(path)?;

    let written = async {
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, path).await
    }
    .await;

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(ParleyError::persistence(path, e.to_string()));
    }
    Ok(())
}

#[async_trait]
impl HistoryRepository for PartitionStore {
    async fn append_record(
        &self,
        envelope: &MessageEnvelope,
        delta: &[ContentItem],
        append_mode: bool,
    ) -> Result<MessageRecord> {
        let mut last_gsn = self.last_gsn.lock().await;
        let _writer = self.acquire_writer_lock().await?;
        // Another handle on the same root may have written since our last append.
        let persisted = self.sequence_file.load().await.unwrap_or(0);
        let gsn = (*last_gsn).max(persisted) + 1;

        let date = envelope.timestamp.date_naive();
        let dir = self.partition_dir(date);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ParleyError::persistence(&dir, e.to_string()))?;

        let existing = self.find_in_partition(date, &envelope.message_id).await?;

        let mut record_envelope = envelope.clone();
        let mut contents = Vec::with_capacity(delta.len());
        if let Some(previous) = &existing {
            if append_mode {
                record_envelope.timestamp = previous.envelope.timestamp;
                for (key, value) in &previous.envelope.metadata {
                    record_envelope
                        .metadata
                        .entry(key.clone())
                        .or_insert_with(|| value.clone());
                }
                contents.extend(previous.contents.iter().cloned());
            }
        }
        record_envelope.sequence_number = gsn;
        contents.extend(delta.iter().cloned().map(|item| item.with_sequence(gsn)));

        let epoch = record_envelope.timestamp.timestamp();
        let mut file_name = record_file_name(
            epoch,
            &record_envelope.message_id,
            &record_envelope.sender_id,
            &self.extension,
        );
        let mut path = dir.join(&file_name);
        let existing_path = existing
            .as_ref()
            .and_then(|r| r.handle.as_ref())
            .map(|h| h.path.clone());
        if existing_path.as_ref() != Some(&path)
            && self.held_by_other(&path, date, &record_envelope.message_id).await
        {
            file_name = disambiguated_record_file_name(
                epoch,
                &record_envelope.message_id,
                &record_envelope.sender_id,
                &self.extension,
            );
            path = dir.join(&file_name);
            tracing::warn!(
                "[PartitionStore] Name clash for '{}', writing {} instead",
                record_envelope.message_id,
                file_name
            );
        }
        let text = render_record(&record_envelope, &contents)
            .map_err(|e| e.into_persistence(&path))?;
        write_atomically(&path, &text).await?;

        // A wholesale rewrite may land under a new name; drop the old file.
        if let Some(stale) = existing.and_then(|r| r.handle).filter(|h| h.path != path) {
            if let Err(e) = tokio::fs::remove_file(&stale.path).await {
                tracing::warn!(
                    "[PartitionStore] Failed to remove superseded {}: {}",
                    stale.path.display(),
                    e
                );
            }
        }

        *last_gsn = gsn;
        if let Err(e) = self.sequence_file.store(gsn).await {
            // The record itself carries the GSN; reopening rescans it.
            tracing::warn!("[PartitionStore] Failed to persist gsn {}: {}", gsn, e);
        }

        tracing::debug!(
            "[PartitionStore] Wrote {} (gsn {}, {} items, append_mode={})",
            file_name,
            gsn,
            contents.len(),
            append_mode
        );

        let handle = self
            .handle_for(path.clone(), date)
            .ok_or_else(|| ParleyError::internal(format!("Unparseable record name {}", file_name)))?;
        Ok(MessageRecord {
            envelope: record_envelope,
            contents,
            handle: Some(handle),
        })
    }

    async fn list_dates(&self) -> Result<Vec<NaiveDate>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut dates = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(date) = entry.file_name().to_str().and_then(parse_partition_name) {
                dates.push(date);
            }
        }
        dates.sort();
        Ok(dates)
    }

    async fn list_record_files(&self, date: NaiveDate) -> Result<Vec<RecordHandle>> {
        let dir = self.partition_dir(date);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut handles = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(handle) = self.handle_for(entry.path(), date) {
                handles.push(handle);
            }
        }
        handles.sort();
        Ok(handles)
    }

    async fn load(&self, handle: &RecordHandle) -> Result<MessageRecord> {
        let text = match tokio::fs::read_to_string(&handle.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ParleyError::not_found("record", handle.path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(parse_record(&text, handle))
    }

    async fn exists(&self, handle: &RecordHandle) -> bool {
        tokio::fs::try_exists(&handle.path).await.unwrap_or(false)
    }

    async fn latest_record_info(&self) -> Result<Option<RecordInfo>> {
        for date in self.list_dates().await?.into_iter().rev() {
            for handle in self.list_record_files(date).await?.into_iter().rev() {
                match self.load(&handle).await {
                    Ok(record) => {
                        return Ok(Some(RecordInfo {
                            message_id: record.envelope.message_id,
                            timestamp: record.envelope.timestamp,
                            handle,
                        }));
                    }
                    Err(e) => tracing::warn!(
                        "[PartitionStore] Skipping unreadable {}: {}",
                        handle.path.display(),
                        e
                    ),
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn envelope(message_id: &str, secs: u32) -> MessageEnvelope {
        MessageEnvelope::new(message_id, "agent-1", "Planner")
            .with_timestamp(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, secs).unwrap())
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_gsn() {
        let temp_dir = TempDir::new().unwrap();
        let store = PartitionStore::open(temp_dir.path(), &HistoryConfig::default())
            .await
            .unwrap();

        let first = store
            .append(&envelope("m1", 0), &[ContentItem::text("c1", "a")], false)
            .await
            .unwrap();
        let second = store
            .append(&envelope("m2", 1), &[ContentItem::text("c1", "b")], false)
            .await
            .unwrap();

        assert_eq!(store.load(&first).await.unwrap().envelope.sequence_number, 1);
        let record = store.load(&second).await.unwrap();
        assert_eq!(record.envelope.sequence_number, 2);
        assert_eq!(record.contents[0].sequence, 2);
        assert_eq!(store.last_gsn().await, 2);
    }

    #[tokio::test]
    async fn test_append_mode_concatenates_without_dedup() {
        let temp_dir = TempDir::new().unwrap();
        let store = PartitionStore::open(temp_dir.path(), &HistoryConfig::default())
            .await
            .unwrap();

        store
            .append(&envelope("m1", 0), &[ContentItem::text("c1", "Hel")], true)
            .await
            .unwrap();
        let later = envelope("m1", 30);
        let handle = store
            .append(&later, &[ContentItem::text("c1", "Hello")], true)
            .await
            .unwrap();

        let record = store.load(&handle).await.unwrap();
        assert_eq!(record.contents.len(), 2);
        assert_eq!(record.contents[0].sequence, 1);
        assert_eq!(record.contents[1].sequence, 2);
        assert_eq!(record.envelope.timestamp, envelope("m1", 0).timestamp);
        assert_eq!(record.envelope.sequence_number, 2);

        let date = handle.date;
        assert_eq!(store.list_record_files(date).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_and_removes_old_name() {
        let temp_dir = TempDir::new().unwrap();
        let store = PartitionStore::open(temp_dir.path(), &HistoryConfig::default())
            .await
            .unwrap();

        store
            .append(&envelope("m1", 0), &[ContentItem::text("c1", "draft")], false)
            .await
            .unwrap();
        let handle = store
            .append(&envelope("m1", 45), &[ContentItem::text("c2", "final")], false)
            .await
            .unwrap();

        let handles = store.list_record_files(handle.date).await.unwrap();
        assert_eq!(handles, vec![handle.clone()]);
        let record = store.load(&handle).await.unwrap();
        assert_eq!(record.contents.len(), 1);
        assert_eq!(record.contents[0].content_id, "c2");
    }

    #[tokio::test]
    async fn test_reopen_resumes_counter() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = PartitionStore::open(temp_dir.path(), &HistoryConfig::default())
                .await
                .unwrap();
            for i in 0..3 {
                store
                    .append(&envelope(&format!("m{i}"), i), &[], false)
                    .await
                    .unwrap();
            }
        }
        // Simulate a counter file that lagged behind the last record.
        std::fs::write(temp_dir.path().join("sequence.toml"), "last_gsn = 1\n").unwrap();

        let store = PartitionStore::open(temp_dir.path(), &HistoryConfig::default())
            .await
            .unwrap();
        assert_eq!(store.last_gsn().await, 3);
    }

    #[tokio::test]
    async fn test_foreign_entries_are_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let store = PartitionStore::open(temp_dir.path(), &HistoryConfig::default())
            .await
            .unwrap();
        let handle = store
            .append(&envelope("m1", 0), &[ContentItem::text("c1", "a")], false)
            .await
            .unwrap();

        std::fs::create_dir(temp_dir.path().join("notes")).unwrap();
        std::fs::write(temp_dir.path().join("20250301").join("README.txt"), "hi").unwrap();

        assert_eq!(store.list_dates().await.unwrap(), vec![handle.date]);
        assert_eq!(store.list_record_files(handle.date).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_append_record_returns_written_record() {
        let temp_dir = TempDir::new().unwrap();
        let store = PartitionStore::open(temp_dir.path(), &HistoryConfig::default())
            .await
            .unwrap();

        store
            .append(&envelope("m1", 0), &[ContentItem::text("c1", "Hel")], true)
            .await
            .unwrap();
        let written = store
            .append_record(&envelope("m1", 9), &[ContentItem::text("c1", "Hello")], true)
            .await
            .unwrap();

        assert_eq!(written.envelope.sequence_number, 2);
        assert_eq!(written.envelope.timestamp, envelope("m1", 0).timestamp);
        assert_eq!(written.contents.len(), 2);
        assert_eq!(written.contents[1].sequence, 2);
        let handle = written.handle.clone().unwrap();
        assert_eq!(store.load(&handle).await.unwrap(), written);
    }

    #[tokio::test]
    async fn test_sanitized_name_clash_keeps_both_records() {
        let temp_dir = TempDir::new().unwrap();
        let store = PartitionStore::open(temp_dir.path(), &HistoryConfig::default())
            .await
            .unwrap();

        let slash = store
            .append(&envelope("a/b", 0), &[ContentItem::text("c1", "slash")], true)
            .await
            .unwrap();
        let dash = store
            .append(&envelope("a-b", 0), &[ContentItem::text("c1", "dash")], true)
            .await
            .unwrap();
        assert_ne!(slash.path, dash.path);
        assert!(dash.message_key.starts_with("a-b~"));

        // Further appends find their own files again.
        let dash_again = store
            .append(&envelope("a-b", 0), &[ContentItem::text("c2", "more")], true)
            .await
            .unwrap();
        let slash_again = store
            .append(&envelope("a/b", 0), &[ContentItem::text("c2", "more")], true)
            .await
            .unwrap();
        assert_eq!(dash_again, dash);
        assert_eq!(slash_again, slash);

        assert_eq!(store.list_record_files(slash.date).await.unwrap().len(), 2);
        let slash_record = store.load(&slash).await.unwrap();
        let dash_record = store.load(&dash).await.unwrap();
        assert_eq!(slash_record.message_id(), "a/b");
        assert_eq!(dash_record.message_id(), "a-b");
        assert_eq!(slash_record.contents.len(), 2);
        assert_eq!(dash_record.contents.len(), 2);
    }

    #[tokio::test]
    async fn test_latest_record_info() {
        let temp_dir = TempDir::new().unwrap();
        let store = PartitionStore::open(temp_dir.path(), &HistoryConfig::default())
            .await
            .unwrap();
        assert!(store.latest_record_info().await.unwrap().is_none());

        store.append(&envelope("m1", 0), &[], false).await.unwrap();
        store.append(&envelope("m2", 5), &[], false).await.unwrap();

        let info = store.latest_record_info().await.unwrap().unwrap();
        assert_eq!(info.message_id, "m2");
        assert_eq!(info.timestamp, envelope("m2", 5).timestamp);
    }
}
