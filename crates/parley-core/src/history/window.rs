//! Cursor and window queries over a day-partitioned repository.
//!
//! Queries walk partitions outward from a reference point and stop after a
//! bounded number of calendar days, so no query scans the whole store except
//! an uncached `resolve` of an unknown message id.

use super::naming::matches_message_key;
use super::repository::HistoryRepository;
use crate::config::HistoryConfig;
use crate::error::Result;
use crate::message::{MessageRecord, RecordHandle};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Records on both sides of a reference message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryWindow {
    pub before: Vec<MessageRecord>,
    pub current: Option<MessageRecord>,
    pub after: Vec<MessageRecord>,
}

impl HistoryWindow {
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.current.is_none() && self.after.is_empty()
    }
}

/// Bounded messageId -> handle cache, evicting the oldest insertion first.
#[derive(Debug)]
struct ResolveCache {
    capacity: usize,
    entries: HashMap<String, RecordHandle>,
    order: VecDeque<String>,
}

impl ResolveCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, message_id: &str) -> Option<RecordHandle> {
        self.entries.get(message_id).cloned()
    }

    fn insert(&mut self, message_id: &str, handle: RecordHandle) {
        if self.capacity == 0 {
            return;
        }
        if self
            .entries
            .insert(message_id.to_string(), handle)
            .is_none()
        {
            self.order.push_back(message_id.to_string());
        }
        while self.entries.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    fn remove(&mut self, message_id: &str) {
        if self.entries.remove(message_id).is_some() {
            self.order.retain(|id| id != message_id);
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// Serves `latest`, `before`, `after`, `around` and `by_date` queries.
pub struct WindowIndex {
    repository: Arc<dyn HistoryRepository>,
    cursor_lookback: Days,
    latest_lookback: Days,
    cache: Mutex<ResolveCache>,
}

impl WindowIndex {
    pub fn new(repository: Arc<dyn HistoryRepository>, config: &HistoryConfig) -> Self {
        Self {
            repository,
            cursor_lookback: Days::new(config.before_lookback_days.into()),
            latest_lookback: Days::new(config.latest_lookback_days.into()),
            cache: Mutex::new(ResolveCache::new(config.resolve_cache_capacity)),
        }
    }

    pub fn repository(&self) -> &Arc<dyn HistoryRepository> {
        &self.repository
    }

    /// Finds the record file of `message_id`, trying `date_hint` first.
    ///
    /// File names only carry a sanitized key, so every candidate is loaded
    /// and its envelope checked before it is accepted.
    pub async fn resolve(
        &self,
        message_id: &str,
        date_hint: Option<NaiveDate>,
    ) -> Result<Option<RecordHandle>> {
        let cached = self.cache.lock().await.get(message_id);
        if let Some(handle) = cached {
            if self.repository.exists(&handle).await {
                return Ok(Some(handle));
            }
            tracing::debug!(
                "[WindowIndex] Cached handle for '{}' is gone, re-resolving",
                message_id
            );
            self.cache.lock().await.remove(message_id);
        }

        let mut dates = self.repository.list_dates().await?;
        dates.reverse();
        if let Some(hint) = date_hint {
            if let Some(pos) = dates.iter().position(|d| *d == hint) {
                let hinted = dates.remove(pos);
                dates.insert(0, hinted);
            }
        }

        for date in dates {
            let handles = self.repository.list_record_files(date).await?;
            for handle in handles.into_iter().rev() {
                if !matches_message_key(&handle.message_key, message_id) {
                    continue;
                }
                match self.repository.load(&handle).await {
                    Ok(record) if record.message_id() == message_id => {
                        self.cache.lock().await.insert(message_id, handle.clone());
                        return Ok(Some(handle));
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!(
                            "[WindowIndex] Skipping unreadable candidate {}: {}",
                            handle.path.display(),
                            e
                        );
                    }
                }
            }
        }

        tracing::debug!("[WindowIndex] Message '{}' not found", message_id);
        Ok(None)
    }

    /// Drops the cached resolution of one message.
    pub async fn invalidate(&self, message_id: &str) {
        self.cache.lock().await.remove(message_id);
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    /// The most recent `count` records, oldest first.
    pub async fn latest(&self, count: usize) -> Result<Vec<MessageRecord>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let dates = self.repository.list_dates().await?;
        let Some(&newest) = dates.last() else {
            return Ok(Vec::new());
        };
        let floor = newest.checked_sub_days(self.latest_lookback).unwrap_or(NaiveDate::MIN);

        let mut collected = Vec::new();
        for date in dates.iter().rev().take_while(|d| **d >= floor) {
            let handles = self.repository.list_record_files(*date).await?;
            self.collect_records(handles.iter().rev(), count, &mut collected)
                .await;
            if collected.len() >= count {
                break;
            }
        }
        collected.reverse();
        Ok(collected)
    }

    /// Up to `count` records preceding `message_id`, oldest first.
    ///
    /// An unknown reference yields an empty list.
    pub async fn before(
        &self,
        message_id: &str,
        count: usize,
        date_hint: Option<NaiveDate>,
    ) -> Result<Vec<MessageRecord>> {
        match self.resolve(message_id, date_hint).await? {
            Some(reference) => self.before_handle(&reference, count).await,
            None => Ok(Vec::new()),
        }
    }

    /// Up to `count` records following `message_id`, oldest first.
    pub async fn after(
        &self,
        message_id: &str,
        count: usize,
        date_hint: Option<NaiveDate>,
    ) -> Result<Vec<MessageRecord>> {
        match self.resolve(message_id, date_hint).await? {
            Some(reference) => self.after_handle(&reference, count).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn around(
        &self,
        message_id: &str,
        before: usize,
        after: usize,
        date_hint: Option<NaiveDate>,
    ) -> Result<HistoryWindow> {
        let Some(reference) = self.resolve(message_id, date_hint).await? else {
            return Ok(HistoryWindow::default());
        };

        let current = match self.repository.load(&reference).await {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(
                    "[WindowIndex] Failed to load reference {}: {}",
                    reference.path.display(),
                    e
                );
                None
            }
        };

        Ok(HistoryWindow {
            before: self.before_handle(&reference, before).await?,
            current,
            after: self.after_handle(&reference, after).await?,
        })
    }

    /// Every record of one partition, oldest first.
    pub async fn by_date(&self, date: NaiveDate) -> Result<Vec<MessageRecord>> {
        let handles = self.repository.list_record_files(date).await?;
        let mut records = Vec::with_capacity(handles.len());
        self.collect_records(handles.iter(), usize::MAX, &mut records)
            .await;
        Ok(records)
    }

    pub async fn list_dates(&self) -> Result<Vec<NaiveDate>> {
        self.repository.list_dates().await
    }

    async fn before_handle(
        &self,
        reference: &RecordHandle,
        count: usize,
    ) -> Result<Vec<MessageRecord>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let floor = reference
            .date
            .checked_sub_days(self.cursor_lookback)
            .unwrap_or(NaiveDate::MIN);

        let mut collected = Vec::new();
        let same_day = self.repository.list_record_files(reference.date).await?;
        let split = split_position(&same_day, reference);
        self.collect_records(same_day[..split.before_end].iter().rev(), count, &mut collected)
            .await;

        let dates = self.repository.list_dates().await?;
        for date in dates
            .iter()
            .rev()
            .filter(|d| **d < reference.date && **d >= floor)
        {
            if collected.len() >= count {
                break;
            }
            let handles = self.repository.list_record_files(*date).await?;
            self.collect_records(handles.iter().rev(), count, &mut collected)
                .await;
        }

        collected.reverse();
        Ok(collected)
    }

    async fn after_handle(
        &self,
        reference: &RecordHandle,
        count: usize,
    ) -> Result<Vec<MessageRecord>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let ceiling = reference
            .date
            .checked_add_days(self.cursor_lookback)
            .unwrap_or(NaiveDate::MAX);

        let mut collected = Vec::new();
        let same_day = self.repository.list_record_files(reference.date).await?;
        let split = split_position(&same_day, reference);
        self.collect_records(same_day[split.after_start..].iter(), count, &mut collected)
            .await;

        let dates = self.repository.list_dates().await?;
        for date in dates
            .iter()
            .filter(|d| **d > reference.date && **d <= ceiling)
        {
            if collected.len() >= count {
                break;
            }
            let handles = self.repository.list_record_files(*date).await?;
            self.collect_records(handles.iter(), count, &mut collected)
                .await;
        }

        Ok(collected)
    }

    /// Loads handles in iteration order until `out` holds `limit` records.
    /// Unreadable records are logged and skipped.
    async fn collect_records<'a>(
        &self,
        handles: impl Iterator<Item = &'a RecordHandle>,
        limit: usize,
        out: &mut Vec<MessageRecord>,
    ) {
        for handle in handles {
            if out.len() >= limit {
                return;
            }
            match self.repository.load(handle).await {
                Ok(record) => out.push(record),
                Err(e) => tracing::warn!(
                    "[WindowIndex] Skipping unreadable record {}: {}",
                    handle.path.display(),
                    e
                ),
            }
        }
    }
}

struct Split {
    before_end: usize,
    after_start: usize,
}

/// Splits one partition's handles around the reference by position, so
/// records sharing the reference's second stay on the correct side.
fn split_position(handles: &[RecordHandle], reference: &RecordHandle) -> Split {
    match handles.iter().position(|h| h.path == reference.path) {
        Some(pos) => Split {
            before_end: pos,
            after_start: pos + 1,
        },
        None => {
            let pos = handles.partition_point(|h| h < reference);
            Split {
                before_end: pos,
                after_start: pos,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentItem;
    use crate::history::naming::message_key;
    use crate::error::ParleyError;
    use crate::message::{MessageEnvelope, RecordInfo};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;

    /// In-memory repository keyed by file path.
    #[derive(Default)]
    struct MemoryRepository {
        records: std::sync::Mutex<Vec<(RecordHandle, MessageRecord)>>,
        loads: std::sync::atomic::AtomicUsize,
    }

    impl MemoryRepository {
        fn put(&self, message_id: &str, y: i32, m: u32, d: u32, secs: u32) {
            let timestamp = Utc.with_ymd_and_hms(y, m, d, 12, 0, secs).unwrap();
            let date = timestamp.date_naive();
            let file = format!("{}_{}_agent.yaml", timestamp.timestamp(), message_key(message_id));
            let handle = RecordHandle {
                path: PathBuf::from(format!("/mem/{}/{}", date, file)),
                date,
                epoch: timestamp.timestamp(),
                message_key: message_key(message_id),
                sender_key: "agent".into(),
            };
            let record = MessageRecord::new(
                MessageEnvelope::new(message_id, "agent", "Agent").with_timestamp(timestamp),
                vec![ContentItem::text("c", message_id)],
            );
            self.records.lock().unwrap().push((handle, record));
        }

        fn remove(&self, message_id: &str) {
            self.records
                .lock()
                .unwrap()
                .retain(|(_, r)| r.message_id() != message_id);
        }
    }

    #[async_trait]
    impl HistoryRepository for MemoryRepository {
        async fn append_record(
            &self,
            _envelope: &MessageEnvelope,
            _delta: &[ContentItem],
            _append_mode: bool,
        ) -> Result<MessageRecord> {
            Err(ParleyError::internal("read-only"))
        }

        async fn list_dates(&self) -> Result<Vec<NaiveDate>> {
            let mut dates: Vec<_> = self.records.lock().unwrap().iter().map(|(h, _)| h.date).collect();
            dates.sort();
            dates.dedup();
            Ok(dates)
        }

        async fn list_record_files(&self, date: NaiveDate) -> Result<Vec<RecordHandle>> {
            let mut handles: Vec<_> = self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|(h, _)| h.date == date)
                .map(|(h, _)| h.clone())
                .collect();
            handles.sort();
            Ok(handles)
        }

        async fn load(&self, handle: &RecordHandle) -> Result<MessageRecord> {
            self.loads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.records
                .lock()
                .unwrap()
                .iter()
                .find(|(h, _)| h == handle)
                .map(|(_, r)| r.clone())
                .ok_or_else(|| ParleyError::not_found("record", handle.file_name()))
        }

        async fn exists(&self, handle: &RecordHandle) -> bool {
            self.records.lock().unwrap().iter().any(|(h, _)| h == handle)
        }

        async fn latest_record_info(&self) -> Result<Option<RecordInfo>> {
            Ok(None)
        }
    }

    fn ids(records: &[MessageRecord]) -> Vec<&str> {
        records.iter().map(|r| r.message_id()).collect()
    }

    fn index(repo: &Arc<MemoryRepository>) -> WindowIndex {
        WindowIndex::new(repo.clone(), &HistoryConfig::default())
    }

    #[tokio::test]
    async fn test_before_after_across_days() {
        let repo = Arc::new(MemoryRepository::default());
        repo.put("a", 2025, 3, 1, 0);
        repo.put("b", 2025, 3, 2, 0);
        repo.put("c", 2025, 3, 3, 0);
        repo.put("d", 2025, 3, 3, 1);
        repo.put("e", 2025, 3, 4, 0);
        let index = index(&repo);

        assert_eq!(ids(&index.before("d", 2, None).await.unwrap()), vec!["b", "c"]);
        assert_eq!(ids(&index.before("d", 10, None).await.unwrap()), vec!["a", "b", "c"]);
        assert_eq!(ids(&index.after("b", 2, None).await.unwrap()), vec!["c", "d"]);
        assert!(index.after("e", 3, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_same_second_neighbours_split_by_position() {
        let repo = Arc::new(MemoryRepository::default());
        repo.put("m1", 2025, 3, 1, 5);
        repo.put("m2", 2025, 3, 1, 5);
        repo.put("m3", 2025, 3, 1, 5);
        let index = index(&repo);

        let window = index.around("m2", 5, 5, None).await.unwrap();
        assert_eq!(ids(&window.before), vec!["m1"]);
        assert_eq!(window.current.unwrap().message_id(), "m2");
        assert_eq!(ids(&window.after), vec!["m3"]);
    }

    #[tokio::test]
    async fn test_lookback_bounds_cursor_walk() {
        let repo = Arc::new(MemoryRepository::default());
        repo.put("old", 2025, 1, 1, 0);
        repo.put("ref", 2025, 3, 1, 0);
        let index = index(&repo);

        assert!(index.before("ref", 5, None).await.unwrap().is_empty());
        assert!(index.after("old", 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_latest_starts_at_newest_partition() {
        let repo = Arc::new(MemoryRepository::default());
        repo.put("ancient", 2024, 1, 1, 0);
        repo.put("x", 2025, 2, 20, 0);
        repo.put("y", 2025, 3, 1, 0);
        repo.put("z", 2025, 3, 1, 9);
        let index = index(&repo);

        assert_eq!(ids(&index.latest(2).await.unwrap()), vec!["y", "z"]);
        assert_eq!(ids(&index.latest(10).await.unwrap()), vec!["x", "y", "z"]);
        assert!(index.latest(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_reference_is_empty_window() {
        let repo = Arc::new(MemoryRepository::default());
        repo.put("a", 2025, 3, 1, 0);
        let index = index(&repo);

        assert!(index.around("missing", 3, 3, None).await.unwrap().is_empty());
        assert!(index.before("missing", 3, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_uses_cache_and_drops_stale_entries() {
        let repo = Arc::new(MemoryRepository::default());
        repo.put("a", 2025, 3, 1, 0);
        let index = index(&repo);

        let first = index.resolve("a", None).await.unwrap().unwrap();
        let loads = repo.loads.load(std::sync::atomic::Ordering::SeqCst);
        let second = index.resolve("a", None).await.unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(repo.loads.load(std::sync::atomic::Ordering::SeqCst), loads);

        repo.remove("a");
        assert!(index.resolve("a", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_by_date_returns_partition_in_order() {
        let repo = Arc::new(MemoryRepository::default());
        repo.put("late", 2025, 3, 1, 30);
        repo.put("early", 2025, 3, 1, 1);
        repo.put("other", 2025, 3, 2, 0);
        let index = index(&repo);

        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(ids(&index.by_date(date).await.unwrap()), vec!["early", "late"]);
    }

    #[test]
    fn test_resolve_cache_is_bounded() {
        let handle = |n: i64| RecordHandle {
            path: PathBuf::from(format!("/mem/{n}")),
            date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            epoch: n,
            message_key: n.to_string(),
            sender_key: "s".into(),
        };
        let mut cache = ResolveCache::new(2);
        cache.insert("1", handle(1));
        cache.insert("2", handle(2));
        cache.insert("3", handle(3));

        assert!(cache.get("1").is_none());
        assert_eq!(cache.get("3"), Some(handle(3)));
        assert_eq!(cache.entries.len(), 2);
    }
}
