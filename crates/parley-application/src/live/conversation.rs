//! Incremental path for a conversation that is still streaming.
//!
//! Fragments arrive one at a time (usually right after being persisted).
//! Each one is folded into its message group and the message is marked
//! dirty; the batcher then pushes the reconciled content of every changed
//! message to the render sink once per interval.

use super::batcher::{FlushCallback, UpdateBatcher};
use crate::history_usecase::ConversationHistory;
use parley_core::content::ContentItem;
use parley_core::error::{ParleyError, Result};
use parley_core::grouping::{GroupedMessage, MessageGroup};
use parley_core::history::{
    RenderSink, SenderMetadataResolver, decorate_contents, decorate_message,
};
use parley_core::message::{MessageEnvelope, MessageRecord, RecordHandle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

type GroupMap = Arc<Mutex<HashMap<String, MessageGroup>>>;

pub struct LiveConversation {
    history: Option<Arc<ConversationHistory>>,
    groups: GroupMap,
    batcher: UpdateBatcher,
    resolver: Arc<dyn SenderMetadataResolver>,
}

impl LiveConversation {
    /// Live view backed by `history`; `record_and_ingest` persists through it.
    pub fn new(
        history: Arc<ConversationHistory>,
        sink: Arc<dyn RenderSink>,
        interval: Duration,
    ) -> Self {
        let resolver = history.resolver().clone();
        Self::build(Some(history), sink, resolver, interval)
    }

    /// Live view with no persistence behind it.
    pub fn detached(
        sink: Arc<dyn RenderSink>,
        resolver: Arc<dyn SenderMetadataResolver>,
        interval: Duration,
    ) -> Self {
        Self::build(None, sink, resolver, interval)
    }

    fn build(
        history: Option<Arc<ConversationHistory>>,
        sink: Arc<dyn RenderSink>,
        resolver: Arc<dyn SenderMetadataResolver>,
        interval: Duration,
    ) -> Self {
        let groups: GroupMap = Arc::new(Mutex::new(HashMap::new()));
        let on_flush: FlushCallback = {
            let groups = groups.clone();
            let resolver = resolver.clone();
            Arc::new(move |message_ids: Vec<String>| {
                for message_id in message_ids {
                    let mut contents = {
                        let groups = lock(&groups);
                        match groups.get(&message_id) {
                            Some(group) => group.merged_contents(),
                            None => continue,
                        }
                    };
                    decorate_contents(&mut contents, resolver.as_ref());
                    sink.on_items_changed(&message_id, &contents);
                }
            })
        };

        Self {
            history,
            groups,
            batcher: UpdateBatcher::new(interval, on_flush),
            resolver,
        }
    }

    pub fn history(&self) -> Option<&Arc<ConversationHistory>> {
        self.history.as_ref()
    }

    /// Folds one fragment into its message and schedules a render.
    pub fn ingest(&self, record: MessageRecord) {
        let message_id = record.message_id().to_string();
        {
            let mut groups = lock(&self.groups);
            match groups.get_mut(&message_id) {
                Some(group) => group.absorb(record),
                None => {
                    groups.insert(message_id.clone(), MessageGroup::new(record));
                }
            }
        }
        tracing::trace!("[LiveConversation] Ingested fragment of {}", message_id);
        self.batcher.mark_dirty(message_id);
    }

    /// Drops everything known about the record's message and starts over
    /// from `record`, mirroring a wholesale rewrite in the store.
    pub fn replace(&self, record: MessageRecord) {
        let message_id = record.message_id().to_string();
        lock(&self.groups).insert(message_id.clone(), MessageGroup::new(record));
        tracing::trace!("[LiveConversation] Replaced {}", message_id);
        self.batcher.mark_dirty(message_id);
    }

    /// Persists a fragment, then ingests it as it was written.
    pub async fn record_and_ingest(
        &self,
        envelope: &MessageEnvelope,
        delta: &[ContentItem],
        append_mode: bool,
    ) -> Result<RecordHandle> {
        let history = self.history.as_ref().ok_or_else(|| {
            ParleyError::internal("live conversation has no history to record into")
        })?;
        let written = history.append_record(envelope, delta, append_mode).await?;
        let handle = written.handle.clone().ok_or_else(|| {
            ParleyError::internal("written record carries no handle")
        })?;

        // In append mode the stored record holds the whole message; only the
        // delta, stamped with this append's sequence number, is fed forward.
        let sequence = written.envelope.sequence_number;
        let delta = delta
            .iter()
            .cloned()
            .map(|item| item.with_sequence(sequence))
            .collect();
        let record = MessageRecord {
            envelope: written.envelope,
            contents: delta,
            handle: Some(handle.clone()),
        };
        if append_mode {
            self.ingest(record);
        } else {
            self.replace(record);
        }
        Ok(handle)
    }

    /// Delivers every pending change to the sink right away.
    pub fn flush_now(&self) {
        self.batcher.flush_now();
    }

    pub fn pending(&self) -> Vec<String> {
        self.batcher.pending()
    }

    /// Current reconciled, decorated state of one message.
    pub fn merged(&self, message_id: &str) -> Option<GroupedMessage> {
        let mut message = lock(&self.groups).get(message_id)?.to_message();
        decorate_message(&mut message, self.resolver.as_ref());
        Some(message)
    }

    /// All messages seen so far, in sequence order.
    pub fn messages(&self) -> Vec<GroupedMessage> {
        let mut groups: Vec<GroupedMessage> = {
            let groups = lock(&self.groups);
            let mut ordered: Vec<&MessageGroup> = groups.values().collect();
            ordered.sort_by(|a, b| {
                a.max_sequence()
                    .cmp(&b.max_sequence())
                    .then_with(|| a.message_id().cmp(b.message_id()))
            });
            ordered.into_iter().map(MessageGroup::to_message).collect()
        };
        for message in &mut groups {
            decorate_message(message, self.resolver.as_ref());
        }
        groups
    }
}

fn lock(groups: &Mutex<HashMap<String, MessageGroup>>) -> MutexGuard<'_, HashMap<String, MessageGroup>> {
    groups.lock().unwrap_or_else(PoisonError::into_inner)
}
