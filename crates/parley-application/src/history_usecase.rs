//! Conversation history use case.
//!
//! `ConversationHistory` is the query and append surface for one
//! (workspace, project) pair. It serves raw records straight from the
//! window index and grouped, reconciled, decorated messages built from them.

use crate::registry::HistoryKey;
use chrono::NaiveDate;
use parley_core::config::HistoryConfig;
use parley_core::content::ContentItem;
use parley_core::error::Result;
use parley_core::grouping::{GroupedMessage, build_messages};
use parley_core::history::{
    HistoryRepository, HistoryWindow, NoopResolver, SenderMetadataResolver, WindowIndex,
    decorate_message,
};
use parley_core::message::{MessageEnvelope, MessageRecord, RecordHandle, RecordInfo};
use parley_infrastructure::{ParleyPaths, PartitionStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Grouped messages on both sides of a reference message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageWindow {
    pub before: Vec<GroupedMessage>,
    pub current: Option<GroupedMessage>,
    pub after: Vec<GroupedMessage>,
}

/// History of one (workspace, project) pair.
///
/// # Thread Safety
///
/// All state lives behind the repository and the window index, both of which
/// are safe to share; wrap in `Arc` to use from several tasks.
pub struct ConversationHistory {
    key: HistoryKey,
    repository: Arc<dyn HistoryRepository>,
    index: WindowIndex,
    resolver: Arc<dyn SenderMetadataResolver>,
}

impl ConversationHistory {
    pub fn new(
        key: HistoryKey,
        repository: Arc<dyn HistoryRepository>,
        config: &HistoryConfig,
        resolver: Arc<dyn SenderMetadataResolver>,
    ) -> Self {
        Self {
            key,
            index: WindowIndex::new(repository.clone(), config),
            repository,
            resolver,
        }
    }

    /// Opens the file-backed history of `key` under `paths`.
    pub async fn open(
        key: HistoryKey,
        paths: &ParleyPaths,
        config: &HistoryConfig,
        resolver: Arc<dyn SenderMetadataResolver>,
    ) -> Result<Self> {
        let root = paths.project_history_dir(&key.workspace, &key.project)?;
        let store = PartitionStore::open(root, config).await?;
        tracing::info!("[ConversationHistory] Opened history for {}", key);
        Ok(Self::new(key, Arc::new(store), config, resolver))
    }

    /// History without decoration, mostly for tools and tests.
    pub fn undecorated(
        key: HistoryKey,
        repository: Arc<dyn HistoryRepository>,
        config: &HistoryConfig,
    ) -> Self {
        Self::new(key, repository, config, Arc::new(NoopResolver))
    }

    pub fn key(&self) -> &HistoryKey {
        &self.key
    }

    pub fn repository(&self) -> &Arc<dyn HistoryRepository> {
        &self.repository
    }

    pub fn resolver(&self) -> &Arc<dyn SenderMetadataResolver> {
        &self.resolver
    }

    // ============================================================================
    // Raw record surface
    // ============================================================================

    /// Persists one fragment. Failures surface as `ParleyError::Persistence`.
    pub async fn append(
        &self,
        envelope: &MessageEnvelope,
        delta: &[ContentItem],
        append_mode: bool,
    ) -> Result<RecordHandle> {
        let handle = self.repository.append(envelope, delta, append_mode).await?;
        // A rewrite can rename the file; the next lookup re-resolves.
        self.index.invalidate(&envelope.message_id).await;
        Ok(handle)
    }

    /// Persists one fragment and returns the record as written, carrying the
    /// sequence number assigned to this append.
    pub async fn append_record(
        &self,
        envelope: &MessageEnvelope,
        delta: &[ContentItem],
        append_mode: bool,
    ) -> Result<MessageRecord> {
        let record = self
            .repository
            .append_record(envelope, delta, append_mode)
            .await?;
        self.index.invalidate(&envelope.message_id).await;
        Ok(record)
    }

    pub async fn get_latest(&self, count: usize) -> Result<Vec<MessageRecord>> {
        self.index.latest(count).await
    }

    pub async fn get_before(
        &self,
        message_id: &str,
        count: usize,
        date_hint: Option<NaiveDate>,
    ) -> Result<Vec<MessageRecord>> {
        self.index.before(message_id, count, date_hint).await
    }

    pub async fn get_after(
        &self,
        message_id: &str,
        count: usize,
        date_hint: Option<NaiveDate>,
    ) -> Result<Vec<MessageRecord>> {
        self.index.after(message_id, count, date_hint).await
    }

    pub async fn get_around(
        &self,
        message_id: &str,
        before: usize,
        after: usize,
        date_hint: Option<NaiveDate>,
    ) -> Result<HistoryWindow> {
        self.index.around(message_id, before, after, date_hint).await
    }

    pub async fn get_by_date(&self, date: NaiveDate) -> Result<Vec<MessageRecord>> {
        self.index.by_date(date).await
    }

    pub async fn list_dates(&self) -> Result<Vec<NaiveDate>> {
        self.index.list_dates().await
    }

    pub async fn resolve(
        &self,
        message_id: &str,
        date_hint: Option<NaiveDate>,
    ) -> Result<Option<RecordHandle>> {
        self.index.resolve(message_id, date_hint).await
    }

    pub async fn latest_record_info(&self) -> Result<Option<RecordInfo>> {
        self.repository.latest_record_info().await
    }

    // ============================================================================
    // Grouped message surface
    // ============================================================================

    pub async fn latest_messages(&self, count: usize) -> Result<Vec<GroupedMessage>> {
        Ok(self.to_messages(self.get_latest(count).await?))
    }

    pub async fn messages_before(
        &self,
        message_id: &str,
        count: usize,
        date_hint: Option<NaiveDate>,
    ) -> Result<Vec<GroupedMessage>> {
        Ok(self.to_messages(self.get_before(message_id, count, date_hint).await?))
    }

    pub async fn messages_after(
        &self,
        message_id: &str,
        count: usize,
        date_hint: Option<NaiveDate>,
    ) -> Result<Vec<GroupedMessage>> {
        Ok(self.to_messages(self.get_after(message_id, count, date_hint).await?))
    }

    pub async fn messages_around(
        &self,
        message_id: &str,
        before: usize,
        after: usize,
        date_hint: Option<NaiveDate>,
    ) -> Result<MessageWindow> {
        let window = self.get_around(message_id, before, after, date_hint).await?;
        Ok(MessageWindow {
            before: self.to_messages(window.before),
            current: window
                .current
                .and_then(|record| self.to_messages(vec![record]).pop()),
            after: self.to_messages(window.after),
        })
    }

    pub async fn messages_by_date(&self, date: NaiveDate) -> Result<Vec<GroupedMessage>> {
        Ok(self.to_messages(self.get_by_date(date).await?))
    }

    /// Groups, reconciles and decorates a working set of records.
    pub fn to_messages(&self, records: Vec<MessageRecord>) -> Vec<GroupedMessage> {
        let mut messages = build_messages(records);
        for message in &mut messages {
            decorate_message(message, self.resolver.as_ref());
        }
        messages
    }
}
