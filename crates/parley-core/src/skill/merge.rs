//! Priority merge of two fragments describing the same unit.
//!
//! Skills compare by [`SkillState::priority`], tool calls by
//! [`ToolCallStatus::priority`], everything else by sequence number alone.
//! On equal priority the higher sequence number wins; on equal sequence the
//! existing side is kept, which makes merging the same fragment twice a no-op.
//! The result always keeps the existing side's `content_id`.

use crate::content::{ContentItem, ContentPayload};
use crate::skill::model::{SkillAggregate, SkillState, ToolCall, ToolCallStatus};
use std::cmp::Ordering;

/// Whether `incoming` should be folded into `existing` rather than stand alone.
///
/// Skills without a run id match by name, but a finished run's name may be
/// reused: a non-terminal fragment never joins a terminal aggregate keyed by name.
pub fn same_unit(existing: &ContentItem, incoming: &ContentItem) -> bool {
    match (&existing.payload, &incoming.payload) {
        (ContentPayload::Skill(old), ContentPayload::Skill(new)) => match (&old.run_id, &new.run_id)
        {
            (Some(a), Some(b)) => a == b,
            _ => old.skill_name == new.skill_name && runs_may_join(old, new),
        },
        (ContentPayload::ToolCall(old), ContentPayload::ToolCall(new)) => {
            old.tool_call_id == new.tool_call_id
        }
        (ContentPayload::Skill(_), _) | (ContentPayload::ToolCall(_), _) => false,
        (_, ContentPayload::Skill(_)) | (_, ContentPayload::ToolCall(_)) => false,
        _ => existing.content_id == incoming.content_id,
    }
}

fn runs_may_join(old: &SkillAggregate, new: &SkillAggregate) -> bool {
    !old.state.is_terminal() || new.state.is_terminal()
}

/// Merges two fragments of the same unit.
pub fn merge_items(existing: ContentItem, incoming: ContentItem) -> ContentItem {
    match (&existing.payload, &incoming.payload) {
        (ContentPayload::Skill(_), ContentPayload::Skill(_)) => merge_skill(existing, incoming),
        (ContentPayload::ToolCall(_), ContentPayload::ToolCall(_)) => {
            merge_tool_call(existing, incoming)
        }
        _ => merge_latest(existing, incoming),
    }
}

/// Plain content: the higher sequence number wins.
fn merge_latest(existing: ContentItem, incoming: ContentItem) -> ContentItem {
    if incoming.sequence > existing.sequence {
        let content_id = existing.content_id;
        ContentItem {
            content_id,
            ..incoming
        }
    } else {
        existing
    }
}

fn incoming_wins(
    existing_priority: u8,
    incoming_priority: u8,
    existing_seq: u64,
    incoming_seq: u64,
) -> bool {
    match incoming_priority.cmp(&existing_priority) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => incoming_seq > existing_seq,
    }
}

/// Skill fragments: higher state priority becomes the base; within the same
/// state the fresher fragment (by sequence) supplies progress and results.
/// Children of both sides are unioned.
pub fn merge_skill(existing: ContentItem, incoming: ContentItem) -> ContentItem {
    let (old_state, new_state) = match (existing.as_skill(), incoming.as_skill()) {
        (Some(old), Some(new)) => (old.state, new.state),
        _ => return merge_latest(existing, incoming),
    };

    let content_id = existing.content_id.clone();
    let sequence = existing.sequence.max(incoming.sequence);
    let take_incoming = incoming_wins(
        old_state.priority(),
        new_state.priority(),
        existing.sequence,
        incoming.sequence,
    );

    let (mut base, other) = if take_incoming {
        (incoming, existing)
    } else {
        (existing, incoming)
    };

    if let (Some(base_skill), ContentPayload::Skill(other_skill)) =
        (base.as_skill_mut(), other.payload)
    {
        absorb_skill(base_skill, other_skill);
    }

    base.content_id = content_id;
    base.sequence = sequence;
    if base.parent_id.is_none() {
        base.parent_id = other.parent_id;
    }
    base
}

fn absorb_skill(base: &mut SkillAggregate, other: SkillAggregate) {
    if base.run_id.is_none() {
        base.run_id = other.run_id;
    }
    if base.skill_name.is_empty() {
        base.skill_name = other.skill_name;
    }
    fill(&mut base.description, other.description);
    fill(&mut base.input, other.input);
    fill(&mut base.result, other.result);
    fill(&mut base.display, other.display);
    if base.state == SkillState::Error {
        fill(&mut base.error_message, other.error_message);
    }
    // Within one state only the fresher fragment's progress counts; a base
    // that moved past the other's state keeps the last progress it knew about.
    if base.state != other.state {
        fill(&mut base.progress_text, other.progress_text);
        fill(&mut base.progress_percentage, other.progress_percentage);
    }

    for child in other.child_contents {
        merge_child(&mut base.child_contents, child);
    }
}

/// Tool calls: `failed > completed > started`; `tool_input` survives from
/// whichever side carried it.
pub fn merge_tool_call(existing: ContentItem, incoming: ContentItem) -> ContentItem {
    let (old_status, new_status) = match (existing.as_tool_call(), incoming.as_tool_call()) {
        (Some(old), Some(new)) => (old.status, new.status),
        _ => return merge_latest(existing, incoming),
    };

    let content_id = existing.content_id.clone();
    let sequence = existing.sequence.max(incoming.sequence);
    let take_incoming = incoming_wins(
        old_status.priority(),
        new_status.priority(),
        existing.sequence,
        incoming.sequence,
    );

    let (mut base, other) = if take_incoming {
        (incoming, existing)
    } else {
        (existing, incoming)
    };

    if let (ContentPayload::ToolCall(base_call), ContentPayload::ToolCall(other_call)) =
        (&mut base.payload, other.payload)
    {
        absorb_tool_call(base_call, other_call);
    }

    base.content_id = content_id;
    base.sequence = sequence;
    if base.parent_id.is_none() {
        base.parent_id = other.parent_id;
    }
    base
}

fn absorb_tool_call(base: &mut ToolCall, other: ToolCall) {
    if base.tool_name.is_empty() {
        base.tool_name = other.tool_name;
    }
    fill(&mut base.tool_input, other.tool_input);
    fill(&mut base.output, other.output);
    if base.status == ToolCallStatus::Failed {
        fill(&mut base.error, other.error);
    }
}

/// Inserts `item` into a child list, merging with the matching child if any.
/// New children are appended, so the list keeps first-appearance order.
pub fn merge_child(children: &mut Vec<ContentItem>, item: ContentItem) {
    match children.iter().rposition(|child| same_unit(child, &item)) {
        Some(pos) => {
            let existing = children.remove(pos);
            children.insert(pos, merge_items(existing, item));
        }
        None => children.push(item),
    }
}

fn fill<T>(slot: &mut Option<T>, other: Option<T>) {
    if slot.is_none() {
        *slot = other;
    }
}
