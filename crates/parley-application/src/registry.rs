use crate::history_usecase::ConversationHistory;
use parley_core::config::HistoryConfig;
use parley_core::error::Result;
use parley_core::history::SenderMetadataResolver;
use parley_infrastructure::ParleyPaths;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Identifies one history: a project inside a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HistoryKey {
    pub workspace: String,
    pub project: String,
}

impl HistoryKey {
    pub fn new(workspace: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            workspace: workspace.into(),
            project: project.into(),
        }
    }
}

impl fmt::Display for HistoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workspace, self.project)
    }
}

/// Explicit registry of open histories.
///
/// Owners pass the registry around by handle; nothing is global. A history
/// stays open until it is evicted or the registry is cleared.
pub struct HistoryRegistry {
    paths: ParleyPaths,
    config: HistoryConfig,
    resolver: Arc<dyn SenderMetadataResolver>,
    histories: Arc<RwLock<HashMap<HistoryKey, Arc<ConversationHistory>>>>,
}

impl HistoryRegistry {
    pub fn new(
        paths: ParleyPaths,
        config: HistoryConfig,
        resolver: Arc<dyn SenderMetadataResolver>,
    ) -> Self {
        Self {
            paths,
            config,
            resolver,
            histories: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Opens the history for `key`, replacing any instance already registered.
    pub async fn create(&self, key: HistoryKey) -> Result<Arc<ConversationHistory>> {
        let history = Arc::new(self.open(key.clone()).await?);
        let mut histories = self.histories.write().await;
        if histories.insert(key.clone(), history.clone()).is_some() {
            tracing::debug!("[HistoryRegistry] Replaced history for {}", key);
        }
        Ok(history)
    }

    pub async fn get(&self, key: &HistoryKey) -> Option<Arc<ConversationHistory>> {
        let histories = self.histories.read().await;
        histories.get(key).cloned()
    }

    /// Returns the registered history, opening it on first use.
    pub async fn get_or_create(&self, key: &HistoryKey) -> Result<Arc<ConversationHistory>> {
        if let Some(history) = self.get(key).await {
            return Ok(history);
        }

        let mut histories = self.histories.write().await;
        // Another task may have opened it while we waited for the write lock.
        if let Some(history) = histories.get(key) {
            return Ok(history.clone());
        }
        let history = Arc::new(self.open(key.clone()).await?);
        histories.insert(key.clone(), history.clone());
        Ok(history)
    }

    /// Removes a history from the registry. Handles already given out stay usable.
    pub async fn evict(&self, key: &HistoryKey) -> Option<Arc<ConversationHistory>> {
        let mut histories = self.histories.write().await;
        let evicted = histories.remove(key);
        if evicted.is_some() {
            tracing::debug!("[HistoryRegistry] Evicted history for {}", key);
        }
        evicted
    }

    pub async fn clear(&self) {
        let mut histories = self.histories.write().await;
        histories.clear();
    }

    pub async fn keys(&self) -> Vec<HistoryKey> {
        let histories = self.histories.read().await;
        let mut keys: Vec<HistoryKey> = histories.keys().cloned().collect();
        keys.sort();
        keys
    }

    async fn open(&self, key: HistoryKey) -> Result<ConversationHistory> {
        ConversationHistory::open(key, &self.paths, &self.config, self.resolver.clone()).await
    }
}
