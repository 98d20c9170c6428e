//! Collapsing raw records that share a message id.

use crate::content::{ContentItem, ContentPayload};
use crate::history::SenderDisplay;
use crate::message::{MessageEnvelope, MessageRecord};
use crate::skill::{merge_items, reconcile};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Every fragment seen so far for one message id, collapsed by `content_id`.
///
/// Fragments are kept as they arrive and folded in ascending
/// `(sequence, arrival)` order whenever content is read, so the result does
/// not depend on arrival order. Plain content keeps the highest-sequence
/// version of each `content_id`; skill and tool-call fragments sharing a
/// `content_id` are folded with the priority merge so a terminal fragment is
/// never shadowed by a later, lower-priority one.
///
/// Arrival order matters only for identity: a reconciled aggregate keeps the
/// `content_id` of the first fragment of its run that arrived.
#[derive(Debug, Clone)]
pub struct MessageGroup {
    envelope: MessageEnvelope,
    max_sequence: u64,
    fragments: HashMap<String, Fragments>,
    arrivals: u64,
}

/// Raw fragments of one `content_id`, tagged with their arrival index.
#[derive(Debug, Clone)]
struct Fragments {
    first_arrival: u64,
    items: Vec<(u64, ContentItem)>,
}

impl Fragments {
    fn collapse(&self) -> Option<ContentItem> {
        let mut items: Vec<&(u64, ContentItem)> = self.items.iter().collect();
        items.sort_by_key(|(arrival, item)| (item.sequence, *arrival));
        items
            .into_iter()
            .map(|(_, item)| item.clone())
            .reduce(merge_items)
    }
}

impl MessageGroup {
    pub fn new(record: MessageRecord) -> Self {
        let mut group = Self {
            max_sequence: record.envelope.sequence_number,
            envelope: record.envelope,
            fragments: HashMap::new(),
            arrivals: 0,
        };
        for item in record.contents {
            group.absorb_item(item);
        }
        group
    }

    /// Folds another fragment of the same message in.
    pub fn absorb(&mut self, record: MessageRecord) {
        debug_assert_eq!(record.envelope.message_id, self.envelope.message_id);

        let incoming = record.envelope;
        self.max_sequence = self.max_sequence.max(incoming.sequence_number);
        if incoming.sequence_number < self.envelope.sequence_number {
            let mut earlier = incoming;
            for (key, value) in std::mem::take(&mut self.envelope.metadata) {
                earlier.metadata.entry(key).or_insert(value);
            }
            self.envelope = earlier;
        } else {
            for (key, value) in incoming.metadata {
                self.envelope.metadata.entry(key).or_insert(value);
            }
        }

        for item in record.contents {
            self.absorb_item(item);
        }
    }

    fn absorb_item(&mut self, item: ContentItem) {
        self.max_sequence = self.max_sequence.max(item.sequence);
        let arrival = self.arrivals;
        self.arrivals += 1;

        let fragments = self
            .fragments
            .entry(item.content_id.clone())
            .or_insert_with(|| Fragments {
                first_arrival: arrival,
                items: Vec::new(),
            });
        // Same content id and sequence means a replay; the first copy stands.
        if fragments.items.iter().any(|(_, seen)| seen.sequence == item.sequence) {
            return;
        }
        // Plain content only ever resolves to its highest-sequence version.
        if is_plain(&item) && fragments.items.iter().all(|(_, seen)| is_plain(seen)) {
            if fragments.items.iter().any(|(_, seen)| seen.sequence > item.sequence) {
                return;
            }
            fragments.items.clear();
        }
        fragments.items.push((arrival, item));
    }

    /// One collapsed item per `content_id`, with its first arrival index.
    fn collapsed(&self) -> Vec<(u64, ContentItem)> {
        self.fragments
            .values()
            .filter_map(|fragments| Some((fragments.first_arrival, fragments.collapse()?)))
            .collect()
    }

    pub fn message_id(&self) -> &str {
        &self.envelope.message_id
    }

    /// Envelope of the earliest fragment, carrying the group's highest sequence number.
    pub fn envelope(&self) -> MessageEnvelope {
        MessageEnvelope {
            sequence_number: self.max_sequence,
            ..self.envelope.clone()
        }
    }

    pub fn max_sequence(&self) -> u64 {
        self.max_sequence
    }

    /// Deduplicated content in ascending sequence order.
    pub fn contents(&self) -> Vec<ContentItem> {
        let mut items: Vec<ContentItem> = self.collapsed().into_iter().map(|(_, item)| item).collect();
        items.sort_by(|a, b| {
            a.sequence
                .cmp(&b.sequence)
                .then_with(|| a.content_id.cmp(&b.content_id))
        });
        items
    }

    /// Deduplicated content with skill/tool fragments reconciled into aggregates.
    pub fn merged_contents(&self) -> Vec<ContentItem> {
        // `reconcile` takes its input order as arrival order.
        let mut items = self.collapsed();
        items.sort_by_key(|(arrival, _)| *arrival);
        reconcile(items.into_iter().map(|(_, item)| item))
    }

    pub fn to_message(&self) -> GroupedMessage {
        GroupedMessage {
            envelope: self.envelope(),
            contents: self.merged_contents(),
            display: None,
        }
    }
}

fn is_plain(item: &ContentItem) -> bool {
    !matches!(
        item.payload,
        ContentPayload::Skill(_) | ContentPayload::ToolCall(_)
    )
}

/// One logical message after grouping and reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedMessage {
    pub envelope: MessageEnvelope,
    pub contents: Vec<ContentItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<SenderDisplay>,
}

impl GroupedMessage {
    pub fn message_id(&self) -> &str {
        &self.envelope.message_id
    }
}

/// Buckets records by message id, ordered by each bucket's highest sequence number.
pub fn group_records(records: impl IntoIterator<Item = MessageRecord>) -> Vec<MessageGroup> {
    let mut groups: HashMap<String, MessageGroup> = HashMap::new();
    for record in records {
        match groups.get_mut(record.message_id()) {
            Some(group) => group.absorb(record),
            None => {
                groups.insert(record.message_id().to_string(), MessageGroup::new(record));
            }
        }
    }

    let mut groups: Vec<MessageGroup> = groups.into_values().collect();
    groups.sort_by(|a, b| {
        a.max_sequence()
            .cmp(&b.max_sequence())
            .then_with(|| a.message_id().cmp(b.message_id()))
    });
    groups
}

/// Full pipeline over a working set: group, deduplicate, reconcile.
pub fn build_messages(records: impl IntoIterator<Item = MessageRecord>) -> Vec<GroupedMessage> {
    group_records(records)
        .iter()
        .map(MessageGroup::to_message)
        .collect()
}
