//! Content domain module.
//!
//! - `model`: `ContentItem`, the `ContentPayload` tagged union and its payload structs
//! - `factory`: building payloads from a persisted type tag and raw fields

mod factory;
mod model;

pub use factory::{make_content, make_content_typed};
pub use model::{
    ButtonContent, CodeContent, ContentItem, ContentPayload, ContentStatus, ContentType,
    ErrorContent, FileContent, FormContent, FormField, LinkContent, MediaContent, MetadataContent,
    PlanContent, PlanStep, StepStatus, TableContent, TaskItem, TaskListContent, TextContent,
    ThinkingContent, TypingIndicatorContent,
};
