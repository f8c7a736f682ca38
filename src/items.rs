//! Items exchanged with environments: actions in, observations out
//!
//! The action shape follows the OpenAI assistant message (`role`, `content`,
//! `tool_calls`). Observations are ordered messages answering those calls.

use async_openai::types::{ChatCompletionMessageToolCall, ChatCompletionToolType, FunctionCall};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Role in a conversation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    #[default]
    Assistant,
    Tool,
}

/// Free-form diagnostics returned alongside observations.
pub type Info = Map<String, Value>;

/// Options passed to `reset`.
pub type ResetOptions = Map<String, Value>;

/// An assistant turn submitted to an environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Action {
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatCompletionMessageToolCall>>,
}

impl Action {
    /// Assistant turn carrying only text.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            tool_calls: None,
        }
    }

    /// Assistant turn carrying the given tool calls.
    pub fn with_tool_calls(tool_calls: Vec<ChatCompletionMessageToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(tool_calls),
        }
    }

    /// Tool calls in issue order; empty when none were made.
    pub fn tool_calls(&self) -> &[ChatCompletionMessageToolCall] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }
}

/// One observation entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationMessage {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub content: String,
}

impl ObservationMessage {
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            tool_call_id: Some(tool_call_id.into()),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            tool_call_id: None,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            tool_call_id: None,
            content: content.into(),
        }
    }
}

/// Ordered observation entries, one per answered tool call.
pub type Observation = Vec<ObservationMessage>;

/// Build a function-type tool call as it appears in an OpenAI assistant message.
pub fn function_call(
    id: impl Into<String>,
    name: impl Into<String>,
    arguments: impl Into<String>,
) -> ChatCompletionMessageToolCall {
    ChatCompletionMessageToolCall {
        id: id.into(),
        r#type: ChatCompletionToolType::Function,
        function: FunctionCall {
            name: name.into(),
            arguments: arguments.into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn action_decodes_openai_wire_shape() {
        let raw = json!({
            "role": "assistant",
            "content": "thinking",
            "tool_calls": [
                {"id": "call_1", "type": "function", "function": {"name": "move_up", "arguments": "{}"}}
            ]
        });
        let action: Action = serde_json::from_value(raw).unwrap();
        assert_eq!(action.role, Role::Assistant);
        assert_eq!(action.content.as_deref(), Some("thinking"));
        assert_eq!(action.tool_calls().len(), 1);
        assert_eq!(action.tool_calls()[0].function.name, "move_up");
    }

    #[test]
    fn action_without_tool_calls_is_empty() {
        let action: Action = serde_json::from_value(json!({"role": "assistant"})).unwrap();
        assert!(action.tool_calls().is_empty());

        let action: Action =
            serde_json::from_value(json!({"role": "assistant", "tool_calls": null})).unwrap();
        assert!(action.tool_calls().is_empty());
    }

    #[test]
    fn observation_serializes_without_missing_id() {
        let user = serde_json::to_value(ObservationMessage::user("hi")).unwrap();
        assert_eq!(user, json!({"role": "user", "content": "hi"}));

        let tool = serde_json::to_value(ObservationMessage::tool("c1", "ok")).unwrap();
        assert_eq!(
            tool,
            json!({"role": "tool", "tool_call_id": "c1", "content": "ok"})
        );
    }
}
