//! Skill/tool reconciliation of one message's content list.
//!
//! Folds lifecycle fragments of a run into one aggregate and routes content
//! produced during the run into that aggregate's `child_contents`.

use super::merge::{merge_child, merge_items, same_unit};
use super::model::SkillAggregate;
use crate::content::{ContentItem, ContentPayload};
use std::collections::{HashMap, HashSet};

/// Incremental reconciler over the top-level content of one message.
#[derive(Debug, Clone, Default)]
pub struct ContentReconciler {
    items: Vec<ContentItem>,
}

impl ContentReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one fragment in and returns the `content_id` of the top-level
    /// item that changed.
    pub fn apply(&mut self, item: ContentItem) -> String {
        match item.parent_id.clone() {
            Some(parent_id) if !is_own_run(&item, &parent_id) => {
                self.attach_to_parent(&parent_id, item)
            }
            _ => self.apply_top_level(item, true),
        }
    }

    pub fn contents(&self) -> &[ContentItem] {
        &self.items
    }

    pub fn into_contents(self) -> Vec<ContentItem> {
        self.items
    }

    /// Top-level skill aggregates that have not reached a terminal state.
    pub fn active_runs(&self) -> impl Iterator<Item = &SkillAggregate> {
        self.items
            .iter()
            .filter_map(ContentItem::as_skill)
            .filter(|skill| skill.is_active())
    }

    fn apply_top_level(&mut self, item: ContentItem, allow_legacy: bool) -> String {
        if let Some(pos) = self.items.iter().rposition(|existing| same_unit(existing, &item)) {
            let existing = self.items.remove(pos);
            let merged = merge_items(existing, item);
            let content_id = merged.content_id.clone();
            self.items.insert(pos, merged);
            return content_id;
        }

        if allow_legacy && item.is_tool_fragment() {
            if let Some(pos) = self.legacy_owner(&item) {
                tracing::debug!(
                    "[ContentReconciler] Associating untagged tool fragment '{}' by heuristic",
                    item.content_id
                );
                return self.merge_into_skill(pos, item);
            }
        }

        let content_id = item.content_id.clone();
        self.items.push(item);
        content_id
    }

    fn attach_to_parent(&mut self, parent_id: &str, item: ContentItem) -> String {
        // Owning skill anywhere in the tree.
        for top in self.items.iter_mut() {
            if let Some(skill) = find_run_mut(top, parent_id) {
                merge_child(&mut skill.child_contents, item);
                return top.content_id.clone();
            }
        }

        // Owning tool call: the fragment sits next to it.
        let tool_owner = self.items.iter().position(|top| {
            is_tool_call(top, parent_id)
                || top.as_skill().is_some_and(|skill| {
                    skill
                        .child_contents
                        .iter()
                        .any(|child| is_tool_call(child, parent_id))
                })
        });
        if let Some(pos) = tool_owner {
            if self.items[pos].as_skill().is_some() {
                return self.merge_into_skill(pos, item);
            }
            return self.apply_top_level(item, false);
        }

        // Owner not seen yet: hold the child in a pending placeholder the
        // owner's own fragments will merge into.
        tracing::debug!(
            "[ContentReconciler] Parent '{}' of '{}' not seen yet, creating placeholder",
            parent_id,
            item.content_id
        );
        let mut placeholder = SkillAggregate::new(Some(parent_id.to_string()), "");
        let sequence = item.sequence;
        merge_child(&mut placeholder.child_contents, item);
        let content_id = placeholder_id(parent_id);
        self.items.push(
            ContentItem::new(content_id.clone(), ContentPayload::Skill(placeholder))
                .with_sequence(sequence),
        );
        content_id
    }

    /// Legacy association for tool fragments without an ownership tag: the
    /// active skill whose progress text names the tool, otherwise the most
    /// recent active skill.
    fn legacy_owner(&self, item: &ContentItem) -> Option<usize> {
        let tool_name = item.tool_name()?;
        let active: Vec<usize> = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, c)| c.as_skill().is_some_and(SkillAggregate::is_active))
            .map(|(i, _)| i)
            .collect();

        let named = active.iter().rev().copied().find(|&i| {
            !tool_name.is_empty()
                && self.items[i]
                    .as_skill()
                    .and_then(|s| s.progress_text.as_deref())
                    .is_some_and(|text| text.contains(tool_name))
        });
        named.or_else(|| active.last().copied())
    }

    fn merge_into_skill(&mut self, pos: usize, item: ContentItem) -> String {
        let top = &mut self.items[pos];
        if let Some(skill) = top.as_skill_mut() {
            merge_child(&mut skill.child_contents, item);
        }
        top.content_id.clone()
    }
}

/// Reconciles a full content list given in arrival order.
///
/// Fragments are merged in sequence order, so states, progress and children
/// do not depend on arrival order. Identity does: each skill run and tool call
/// keeps the `content_id` of its first fragment to arrive, so a late fragment
/// with a lower sequence number never renames an aggregate already shown.
pub fn reconcile(items: impl IntoIterator<Item = ContentItem>) -> Vec<ContentItem> {
    let mut items: Vec<ContentItem> = items.into_iter().collect();
    let identities = first_identities(&items);
    items.sort_by_key(|item| item.sequence);

    let mut reconciler = ContentReconciler::new();
    for item in items {
        reconciler.apply(item);
    }
    let mut contents = reconciler.into_contents();
    restamp(&mut contents, &identities, &mut HashSet::new());
    contents
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum UnitKey {
    Run(String),
    ToolCall(String),
}

fn unit_key(item: &ContentItem) -> Option<UnitKey> {
    match &item.payload {
        ContentPayload::Skill(skill) => Some(UnitKey::Run(skill.run_key().to_string())),
        ContentPayload::ToolCall(call) => Some(UnitKey::ToolCall(call.tool_call_id.clone())),
        _ => None,
    }
}

fn first_identities(items: &[ContentItem]) -> HashMap<UnitKey, String> {
    let mut identities = HashMap::new();
    for item in items {
        // A child that shows up before its owner is first rendered inside a
        // placeholder; the owner's aggregate inherits that identity.
        if let Some(parent_id) = item.parent_id.as_deref() {
            let owner_seen = identities.contains_key(&UnitKey::ToolCall(parent_id.to_string()));
            if !is_own_run(item, parent_id) && !owner_seen {
                identities
                    .entry(UnitKey::Run(parent_id.to_string()))
                    .or_insert_with(|| placeholder_id(parent_id));
            }
        }
        if let Some(key) = unit_key(item) {
            identities
                .entry(key)
                .or_insert_with(|| item.content_id.clone());
        }
    }
    identities
}

/// Gives each unit its first-arrived `content_id`. A name-keyed run that was
/// reused yields several aggregates with one key; only the first is renamed.
fn restamp(
    items: &mut [ContentItem],
    identities: &HashMap<UnitKey, String>,
    claimed: &mut HashSet<UnitKey>,
) {
    for item in items {
        if let Some(key) = unit_key(item) {
            if let Some(content_id) = identities.get(&key) {
                if claimed.insert(key) {
                    item.content_id = content_id.clone();
                }
            }
        }
        if let Some(skill) = item.as_skill_mut() {
            restamp(&mut skill.child_contents, identities, claimed);
        }
    }
}

fn placeholder_id(run_id: &str) -> String {
    format!("skill-{}", run_id)
}

fn is_own_run(item: &ContentItem, parent_id: &str) -> bool {
    item.as_skill()
        .is_some_and(|skill| skill.run_id.as_deref() == Some(parent_id))
}

fn is_tool_call(item: &ContentItem, tool_call_id: &str) -> bool {
    item.as_tool_call()
        .is_some_and(|call| call.tool_call_id == tool_call_id)
}

fn find_run_mut<'a>(item: &'a mut ContentItem, run_id: &str) -> Option<&'a mut SkillAggregate> {
    let skill = item.as_skill_mut()?;
    if skill.run_key() == run_id {
        return Some(skill);
    }
    skill
        .child_contents
        .iter_mut()
        .find_map(|child| find_run_mut(child, run_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skill::model::{SkillEvent, SkillState, ToolCall, ToolCallStatus};

    fn skill_event(run: &str, event: SkillEvent, seq: u64) -> ContentItem {
        ContentItem::new(
            format!("skill-{run}-{seq}"),
            ContentPayload::Skill(SkillAggregate::from_event(Some(run.into()), "research", event)),
        )
        .with_sequence(seq)
    }

    fn start(run: &str, seq: u64) -> ContentItem {
        skill_event(
            run,
            SkillEvent::Start {
                description: None,
                input: None,
            },
            seq,
        )
    }

    fn tool(id: &str, name: &str, status: ToolCallStatus, seq: u64) -> ContentItem {
        let mut call = ToolCall::started(id, name, None);
        call.status = status;
        ContentItem::new(format!("tool-{id}-{seq}"), ContentPayload::ToolCall(call))
            .with_sequence(seq)
    }

    #[test]
    fn test_tagged_children_fold_into_run() {
        let items = vec![
            start("run1", 1),
            ContentItem::text("think", "pondering")
                .with_parent("run1")
                .with_sequence(2),
            tool("t1", "web_search", ToolCallStatus::Started, 3).with_parent("run1"),
            tool("t1", "web_search", ToolCallStatus::Completed, 4).with_parent("run1"),
            skill_event("run1", SkillEvent::End { result: Some("ok".into()) }, 5),
            ContentItem::text("answer", "done").with_sequence(6),
        ];

        let result = reconcile(items);
        assert_eq!(result.len(), 2);

        let skill = result[0].as_skill().unwrap();
        assert_eq!(result[0].content_id, "skill-run1-1");
        assert_eq!(skill.state, SkillState::Completed);
        assert_eq!(skill.child_contents.len(), 2);
        assert_eq!(
            skill.child_contents[1].as_tool_call().unwrap().status,
            ToolCallStatus::Completed
        );
        assert_eq!(result[1].content_id, "answer");
    }

    #[test]
    fn test_untagged_tool_matches_progress_text() {
        let mut reconciler = ContentReconciler::new();
        reconciler.apply(start("run-a", 1));
        reconciler.apply(skill_event(
            "run-a",
            SkillEvent::Progress {
                text: Some("running code_search over repo".into()),
                percentage: None,
            },
            2,
        ));
        reconciler.apply(start("run-b", 3));

        let owner = reconciler.apply(tool("t9", "code_search", ToolCallStatus::Started, 4));
        assert_eq!(owner, "skill-run-a-1");

        let owner = reconciler.apply(tool("t10", "calculator", ToolCallStatus::Started, 5));
        assert_eq!(owner, "skill-run-b-3");

        assert_eq!(reconciler.contents().len(), 2);
    }

    #[test]
    fn test_untagged_tool_without_active_run_is_top_level() {
        let mut reconciler = ContentReconciler::new();
        reconciler.apply(start("run1", 1));
        reconciler.apply(skill_event("run1", SkillEvent::End { result: None }, 2));
        reconciler.apply(tool("t1", "grep", ToolCallStatus::Started, 3));

        assert_eq!(reconciler.contents().len(), 2);
        assert_eq!(reconciler.active_runs().count(), 0);
        assert!(reconciler.contents()[1].as_tool_call().is_some());
    }

    #[test]
    fn test_child_before_parent_uses_placeholder() {
        let items = vec![
            ContentItem::text("early", "partial").with_parent("run7").with_sequence(1),
            start("run7", 2),
        ];
        let result = reconcile(items);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].content_id, "skill-run7");
        let skill = result[0].as_skill().unwrap();
        assert_eq!(skill.state, SkillState::InProgress);
        assert_eq!(skill.skill_name, "research");
        assert_eq!(skill.child_contents.len(), 1);
    }

    #[test]
    fn test_first_arrived_fragment_names_the_run() {
        // Arrival order: start (seq 10) before a stale progress (seq 9).
        let items = vec![
            start("run1", 10),
            skill_event(
                "run1",
                SkillEvent::Progress {
                    text: Some("stale".into()),
                    percentage: None,
                },
                9,
            ),
        ];
        let result = reconcile(items.clone());

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].content_id, "skill-run1-10");
        assert_eq!(result[0].as_skill().unwrap().progress_text, None);

        let mut reversed = items;
        reversed.reverse();
        let result = reconcile(reversed);
        assert_eq!(result[0].content_id, "skill-run1-9");
        assert_eq!(result[0].as_skill().unwrap().progress_text, None);
    }

    #[test]
    fn test_late_start_keeps_placeholder_identity() {
        // The child arrives first even though the start has the lower sequence.
        let items = vec![
            ContentItem::text("early", "partial").with_parent("run7").with_sequence(2),
            start("run7", 1),
        ];
        let result = reconcile(items);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].content_id, "skill-run7");
        assert_eq!(result[0].as_skill().unwrap().child_contents.len(), 1);
    }

    #[test]
    fn test_nested_skill_receives_grandchildren() {
        let nested = start("inner", 2).with_parent("outer");
        let items = vec![
            start("outer", 1),
            nested,
            ContentItem::text("deep", "inner work")
                .with_parent("inner")
                .with_sequence(3),
        ];
        let result = reconcile(items);

        assert_eq!(result.len(), 1);
        let outer = result[0].as_skill().unwrap();
        assert_eq!(outer.child_contents.len(), 1);
        let inner = outer.child_contents[0].as_skill().unwrap();
        assert_eq!(inner.child_contents[0].content_id, "deep");
    }

    #[test]
    fn test_tool_response_sits_next_to_its_call() {
        let response = ContentItem::new(
            "resp",
            ContentPayload::ToolResponse(crate::skill::ToolResponse {
                tool_call_id: Some("t1".into()),
                tool_name: "grep".into(),
                output: serde_json::json!("3 matches"),
                is_error: false,
            }),
        )
        .with_parent("t1")
        .with_sequence(2);

        let mut reconciler = ContentReconciler::new();
        reconciler.apply(tool("t1", "grep", ToolCallStatus::Started, 1));
        assert_eq!(reconciler.apply(response.clone()), "resp");
        assert_eq!(reconciler.apply(response), "resp");

        let result = reconciler.into_contents();
        assert_eq!(result.len(), 2);
        assert_eq!(result[1].content_id, "resp");
    }
}
