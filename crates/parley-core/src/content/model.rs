//! Content item types.
//!
//! A [`ContentItem`] is one displayable unit inside a message. Its payload is
//! an explicit tagged union; the tag doubles as the persisted `content_type`.

use crate::skill::{SkillAggregate, ToolCall, ToolResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Lifecycle of a single content unit.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContentStatus {
    Creating,
    Updating,
    #[default]
    Completed,
    Failed,
}

/// Tag of a [`ContentPayload`] variant.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContentType {
    Text,
    Thinking,
    Code,
    Table,
    Link,
    Button,
    Form,
    Image,
    Video,
    Audio,
    File,
    Metadata,
    Error,
    ToolCall,
    ToolResponse,
    Skill,
    Plan,
    Step,
    TaskList,
    TypingIndicator,
}

/// Variant-specific payload. Serialized adjacently as
/// `{ content_type: <tag>, data: { ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "content_type", content = "data", rename_all = "snake_case")]
pub enum ContentPayload {
    Text(TextContent),
    Thinking(ThinkingContent),
    Code(CodeContent),
    Table(TableContent),
    Link(LinkContent),
    Button(ButtonContent),
    Form(FormContent),
    Image(MediaContent),
    Video(MediaContent),
    Audio(MediaContent),
    File(FileContent),
    Metadata(MetadataContent),
    Error(ErrorContent),
    ToolCall(ToolCall),
    ToolResponse(ToolResponse),
    Skill(SkillAggregate),
    Plan(PlanContent),
    Step(PlanStep),
    TaskList(TaskListContent),
    TypingIndicator(TypingIndicatorContent),
}

impl ContentPayload {
    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Text(_) => ContentType::Text,
            Self::Thinking(_) => ContentType::Thinking,
            Self::Code(_) => ContentType::Code,
            Self::Table(_) => ContentType::Table,
            Self::Link(_) => ContentType::Link,
            Self::Button(_) => ContentType::Button,
            Self::Form(_) => ContentType::Form,
            Self::Image(_) => ContentType::Image,
            Self::Video(_) => ContentType::Video,
            Self::Audio(_) => ContentType::Audio,
            Self::File(_) => ContentType::File,
            Self::Metadata(_) => ContentType::Metadata,
            Self::Error(_) => ContentType::Error,
            Self::ToolCall(_) => ContentType::ToolCall,
            Self::ToolResponse(_) => ContentType::ToolResponse,
            Self::Skill(_) => ContentType::Skill,
            Self::Plan(_) => ContentType::Plan,
            Self::Step(_) => ContentType::Step,
            Self::TaskList(_) => ContentType::TaskList,
            Self::TypingIndicator(_) => ContentType::TypingIndicator,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextContent { text: text.into() })
    }

    /// Variant-specific fields as they are persisted under `data`.
    pub fn data(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => map.remove("data").unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}

/// One displayable unit within a message.
///
/// `content_id` is stable across updates of the same unit; a re-emission with
/// the same id is an update. `sequence` is the GSN of the fragment that
/// produced this version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub content_id: String,
    #[serde(default)]
    pub status: ContentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub sequence: u64,
    #[serde(flatten)]
    pub payload: ContentPayload,
}

impl ContentItem {
    pub fn new(content_id: impl Into<String>, payload: ContentPayload) -> Self {
        Self {
            content_id: content_id.into(),
            status: ContentStatus::Completed,
            parent_id: None,
            sequence: 0,
            payload,
        }
    }

    pub fn text(content_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(content_id, ContentPayload::text(text))
    }

    pub fn with_status(mut self, status: ContentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn content_type(&self) -> ContentType {
        self.payload.content_type()
    }

    pub fn as_skill(&self) -> Option<&SkillAggregate> {
        match &self.payload {
            ContentPayload::Skill(skill) => Some(skill),
            _ => None,
        }
    }

    pub fn as_skill_mut(&mut self) -> Option<&mut SkillAggregate> {
        match &mut self.payload {
            ContentPayload::Skill(skill) => Some(skill),
            _ => None,
        }
    }

    pub fn as_tool_call(&self) -> Option<&ToolCall> {
        match &self.payload {
            ContentPayload::ToolCall(call) => Some(call),
            _ => None,
        }
    }

    /// Name of the tool this fragment belongs to, for tool calls and responses.
    pub fn tool_name(&self) -> Option<&str> {
        match &self.payload {
            ContentPayload::ToolCall(call) => Some(&call.tool_name),
            ContentPayload::ToolResponse(response) => Some(&response.tool_name),
            _ => None,
        }
    }

    pub fn is_tool_fragment(&self) -> bool {
        self.tool_name().is_some()
    }
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextContent {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThinkingContent {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeContent {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableContent {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkContent {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ButtonContent {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub fields: Vec<FormField>,
    pub submitted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_field_type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

fn default_field_type() -> String {
    "text".to_string()
}

/// Shared payload of image, video and audio items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileContent {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataContent {
    pub values: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorContent {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub steps: Vec<PlanStep>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub title: String,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskListContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub tasks: Vec<TaskItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskItem {
    pub title: String,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypingIndicatorContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_content_type_tags_are_snake_case() {
        assert_eq!(ContentType::ToolCall.to_string(), "tool_call");
        assert_eq!(ContentType::TypingIndicator.as_ref(), "typing_indicator");
        assert_eq!(ContentType::from_str("task_list").unwrap(), ContentType::TaskList);
        assert!(ContentType::from_str("hologram").is_err());
    }

    #[test]
    fn test_serde_tag_matches_strum_tag() {
        for tag in ContentType::iter() {
            let json = serde_json::to_string(&tag).unwrap();
            assert_eq!(json, format!("\"{}\"", tag));
        }
    }

    #[test]
    fn test_item_serializes_flat() {
        let item = ContentItem::text("c1", "Hello").with_sequence(4);
        let value = serde_json::to_value(&item).unwrap();

        assert_eq!(value["content_id"], "c1");
        assert_eq!(value["content_type"], "text");
        assert_eq!(value["data"]["text"], "Hello");
        assert_eq!(value["sequence"], 4);

        let back: ContentItem = serde_json::from_value(value).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_payload_data_extracts_fields() {
        let payload = ContentPayload::Code(CodeContent {
            code: "fn main() {}".to_string(),
            language: Some("rust".to_string()),
        });
        let data = payload.data();
        assert_eq!(data["code"], "fn main() {}");
        assert_eq!(data["language"], "rust");
    }
}
