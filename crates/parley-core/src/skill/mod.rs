//! Skill and tool execution domain module.
//!
//! - `model`: `SkillAggregate`, `SkillState`, `SkillEvent`, `ToolCall`, `ToolResponse`
//! - `merge`: state-priority merge of two fragments of the same unit
//! - `reconciler`: folding a message's fragments into aggregates and their children

mod merge;
mod model;
mod reconciler;

pub use merge::{merge_child, merge_items, same_unit};
pub use model::{
    SkillAggregate, SkillEvent, SkillState, ToolCall, ToolCallStatus, ToolResponse,
};
pub use reconciler::{ContentReconciler, reconcile};
