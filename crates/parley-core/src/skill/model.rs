//! Skill and tool execution payloads.

use crate::content::ContentItem;
use crate::history::SenderDisplay;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

/// State of one skill execution.
///
/// `Completed` and `Error` are terminal. When fragments disagree the higher
/// [`priority`](SkillState::priority) wins.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SkillState {
    #[default]
    Pending,
    InProgress,
    Completed,
    Error,
}

impl SkillState {
    pub fn priority(self) -> u8 {
        match self {
            SkillState::Pending => 1,
            SkillState::InProgress => 2,
            SkillState::Completed => 3,
            SkillState::Error => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SkillState::Completed | SkillState::Error)
    }
}

/// Lifecycle events a skill execution emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SkillEvent {
    Start {
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        input: Option<Value>,
    },
    Progress {
        text: Option<String>,
        percentage: Option<f64>,
    },
    End {
        #[serde(default)]
        result: Option<String>,
    },
    Error {
        message: String,
    },
}

impl SkillEvent {
    /// State a fragment carrying this event represents.
    pub fn state(&self) -> SkillState {
        match self {
            SkillEvent::Start { .. } | SkillEvent::Progress { .. } => SkillState::InProgress,
            SkillEvent::End { .. } => SkillState::Completed,
            SkillEvent::Error { .. } => SkillState::Error,
        }
    }
}

/// Reconciled view of one skill execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillAggregate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub skill_name: String,
    pub state: SkillState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub child_contents: Vec<ContentItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<SenderDisplay>,
}

impl SkillAggregate {
    pub fn new(run_id: Option<String>, skill_name: impl Into<String>) -> Self {
        Self {
            run_id,
            skill_name: skill_name.into(),
            ..Default::default()
        }
    }

    /// Builds the fragment a producer emits for one lifecycle event.
    pub fn from_event(
        run_id: Option<String>,
        skill_name: impl Into<String>,
        event: SkillEvent,
    ) -> Self {
        let mut skill = Self::new(run_id, skill_name);
        skill.state = event.state();
        match event {
            SkillEvent::Start { description, input } => {
                skill.description = description;
                skill.input = input;
            }
            SkillEvent::Progress { text, percentage } => {
                skill.progress_text = text;
                skill.progress_percentage = percentage;
            }
            SkillEvent::End { result } => {
                skill.result = result;
                skill.progress_percentage = Some(100.0);
            }
            SkillEvent::Error { message } => skill.error_message = Some(message),
        }
        skill
    }

    /// Identity used to match fragments: the run id, or the skill name for
    /// fragments that predate run ids.
    pub fn run_key(&self) -> &str {
        self.run_id.as_deref().unwrap_or(&self.skill_name)
    }

    pub fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }
}

/// Status of one tool call. Higher priority wins on merge.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolCallStatus {
    #[default]
    Started,
    Completed,
    Failed,
}

impl ToolCallStatus {
    pub fn priority(self) -> u8 {
        match self {
            ToolCallStatus::Started => 1,
            ToolCallStatus::Completed => 2,
            ToolCallStatus::Failed => 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_call_id: String,
    #[serde(default)]
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<Value>,
    #[serde(default)]
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCall {
    pub fn started(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        tool_input: Option<Value>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            tool_input,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub is_error: bool,
}
