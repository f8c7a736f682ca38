//! Protocol adapters between tool-calling conventions
//!
//! What this module provides
//! - Tool definitions: generic `ToolSchema` to OpenAI `ChatCompletionTool`
//!   and to Anthropic `{name, description, input_schema}`
//! - Assistant actions: Anthropic content blocks to the canonical
//!   OpenAI-shaped `Action`, and back
//! - Observations: canonical entries to one Anthropic user turn of
//!   `tool_result`/`text` blocks, or to OpenAI request messages
//!
//! Implementation strategy
//! - Pure functions, no shared state; inputs are never mutated
//! - Block and message order is preserved exactly, so tool-call ids line up
//!   with their results on both sides
//!
//! Testing strategy
//! - Golden cases for each direction, including the text-block limit and
//!   ordering of several tool calls
//! - Round trip in `tests/protocol_roundtrip.rs` through a live environment

pub mod anthropic;

use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionToolArgs,
    ChatCompletionToolType, FunctionObjectArgs,
};
use serde_json::Value;

use self::anthropic::{AnthropicMessage, AnthropicRole, AnthropicTool, ContentBlock, MessageContent};
use crate::items::{function_call, Action, ObservationMessage, Role};
use crate::tool::ToolSchema;

#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("invalid tool output without tool_call_id")]
    MissingToolCallId,

    #[error("expected at most one text block, found {0}")]
    MultipleTextBlocks(usize),

    #[error("unexpected '{0}' block in an assistant action")]
    UnexpectedBlock(&'static str),

    #[error("role '{0:?}' cannot be expressed in this direction")]
    UnsupportedRole(Role),

    #[error("arguments of tool call '{id}' are not valid JSON: {source}")]
    InvalidArguments {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("openai type error: {0}")]
    OpenAI(#[from] OpenAIError),
}

/// Wrap each schema as `{type: "function", function: schema}`.
pub fn tools_to_openai(tools: &[ToolSchema]) -> Result<Vec<ChatCompletionTool>, CodecError> {
    tools
        .iter()
        .map(|tool| {
            let function = FunctionObjectArgs::default()
                .name(tool.name.clone())
                .description(tool.description.clone())
                .parameters(tool.parameters.clone())
                .build()?;
            Ok(ChatCompletionToolArgs::default()
                .r#type(ChatCompletionToolType::Function)
                .function(function)
                .build()?)
        })
        .collect()
}

/// Rename `parameters` to `input_schema`.
pub fn tools_to_anthropic(tools: &[ToolSchema]) -> Vec<AnthropicTool> {
    tools
        .iter()
        .map(|tool| AnthropicTool {
            name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: tool.parameters.clone(),
        })
        .collect()
}

/// Convert an Anthropic assistant message into the canonical action.
///
/// At most one text block is accepted; every `tool_use` block becomes a
/// function call with JSON-encoded arguments, in block order. Unmodelled
/// blocks such as `thinking` are dropped.
pub fn anthropic_action_to_openai(message: &AnthropicMessage) -> Result<Action, CodecError> {
    if message.role != AnthropicRole::Assistant {
        return Err(CodecError::UnsupportedRole(Role::User));
    }
    let blocks = message.blocks();

    let texts: Vec<&str> = blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    if texts.len() > 1 {
        return Err(CodecError::MultipleTextBlocks(texts.len()));
    }

    let mut tool_calls = Vec::new();
    for block in &blocks {
        match block {
            ContentBlock::Text { .. } | ContentBlock::Unknown => {}
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(function_call(id.clone(), name.clone(), input.to_string()));
            }
            other => return Err(CodecError::UnexpectedBlock(other.kind())),
        }
    }

    Ok(Action {
        role: Role::Assistant,
        content: texts.first().map(|text| text.to_string()),
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
    })
}

/// Convert a canonical action into an Anthropic assistant message.
pub fn openai_action_to_anthropic(action: &Action) -> Result<AnthropicMessage, CodecError> {
    let mut blocks = Vec::with_capacity(action.tool_calls().len() + 1);
    if let Some(text) = action.content.as_deref().filter(|text| !text.is_empty()) {
        blocks.push(ContentBlock::text(text));
    }
    for call in action.tool_calls() {
        let raw = call.function.arguments.trim();
        let input: Value = if raw.is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(raw).map_err(|source| CodecError::InvalidArguments {
                id: call.id.clone(),
                source,
            })?
        };
        blocks.push(ContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.function.name.clone(),
            input,
        });
    }
    Ok(AnthropicMessage {
        role: AnthropicRole::Assistant,
        content: MessageContent::Blocks(blocks),
    })
}

/// Fold observations into a single Anthropic user turn.
///
/// Tool entries become `tool_result` blocks and user entries `text` blocks,
/// in input order.
pub fn observations_to_anthropic(
    observation: &[ObservationMessage],
) -> Result<AnthropicMessage, CodecError> {
    let blocks = observation
        .iter()
        .map(|entry| match entry.role {
            Role::Tool => {
                let tool_use_id = entry
                    .tool_call_id
                    .clone()
                    .filter(|id| !id.is_empty())
                    .ok_or(CodecError::MissingToolCallId)?;
                Ok(ContentBlock::ToolResult {
                    tool_use_id,
                    content: entry.content.clone(),
                    is_error: None,
                })
            }
            Role::User => Ok(ContentBlock::text(entry.content.clone())),
            role => Err(CodecError::UnsupportedRole(role)),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(AnthropicMessage {
        role: AnthropicRole::User,
        content: MessageContent::Blocks(blocks),
    })
}

/// Convert observations into OpenAI request messages, one per entry.
pub fn observations_to_openai(
    observation: &[ObservationMessage],
) -> Result<Vec<ChatCompletionRequestMessage>, CodecError> {
    observation
        .iter()
        .map(|entry| {
            let message: ChatCompletionRequestMessage = match entry.role {
                Role::Tool => {
                    let id = entry
                        .tool_call_id
                        .clone()
                        .filter(|id| !id.is_empty())
                        .ok_or(CodecError::MissingToolCallId)?;
                    ChatCompletionRequestToolMessageArgs::default()
                        .content(entry.content.clone())
                        .tool_call_id(id)
                        .build()?
                        .into()
                }
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(entry.content.clone())
                    .build()?
                    .into(),
                Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(entry.content.clone())
                    .build()?
                    .into(),
                Role::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(entry.content.clone())
                    .build()?
                    .into(),
            };
            Ok(message)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> Vec<ToolSchema> {
        vec![
            ToolSchema::without_arguments("push_up", "Push the box up"),
            ToolSchema::new(
                "test_equation",
                "Submit an equation",
                json!({"type": "object", "properties": {"equation": {"type": "string"}}, "required": ["equation"]}),
            ),
        ]
    }

    #[test]
    fn openai_tools_wrap_function() {
        let tools = tools_to_openai(&schema()).unwrap();
        let wire = serde_json::to_value(&tools).unwrap();
        assert_eq!(wire[0]["type"], "function");
        assert_eq!(wire[0]["function"]["name"], "push_up");
        assert_eq!(wire[1]["function"]["parameters"]["required"], json!(["equation"]));
    }

    #[test]
    fn anthropic_tools_rename_parameters() {
        let canonical = schema();
        let tools = tools_to_anthropic(&canonical);
        let wire = serde_json::to_value(&tools).unwrap();
        assert_eq!(wire[1]["input_schema"], canonical[1].parameters);
        assert!(wire[1].get("parameters").is_none());
        // The canonical schema is untouched.
        assert_eq!(canonical[1].parameters["type"], "object");
    }

    #[test]
    fn anthropic_action_converts_in_order() {
        let message: AnthropicMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": [
                {"type": "text", "text": "Two moves."},
                {"type": "tool_use", "id": "toolu_a", "name": "move_up", "input": {}},
                {"type": "tool_use", "id": "toolu_b", "name": "test_equation", "input": {"equation": "1+2"}}
            ]
        }))
        .unwrap();
        let action = anthropic_action_to_openai(&message).unwrap();
        assert_eq!(action.content.as_deref(), Some("Two moves."));
        let ids: Vec<_> = action.tool_calls().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["toolu_a", "toolu_b"]);
        let args: Value = serde_json::from_str(&action.tool_calls()[1].function.arguments).unwrap();
        assert_eq!(args, json!({"equation": "1+2"}));

        let back = openai_action_to_anthropic(&action).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn anthropic_action_rejects_two_text_blocks() {
        let message = AnthropicMessage {
            role: AnthropicRole::Assistant,
            content: MessageContent::Blocks(vec![ContentBlock::text("a"), ContentBlock::text("b")]),
        };
        assert!(matches!(
            anthropic_action_to_openai(&message),
            Err(CodecError::MultipleTextBlocks(2))
        ));
    }

    #[test]
    fn anthropic_action_skips_unmodelled_blocks() {
        let message: AnthropicMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": [
                {"type": "thinking", "thinking": "Push right twice.", "signature": "sig"},
                {"type": "text", "text": "Pushing."},
                {"type": "tool_use", "id": "toolu_a", "name": "push_right", "input": {}}
            ]
        }))
        .unwrap();
        assert_eq!(message.blocks()[0], ContentBlock::Unknown);

        let action = anthropic_action_to_openai(&message).unwrap();
        assert_eq!(action.content.as_deref(), Some("Pushing."));
        assert_eq!(action.tool_calls().len(), 1);
        assert_eq!(action.tool_calls()[0].function.name, "push_right");
    }

    #[test]
    fn anthropic_action_rejects_tool_result_block() {
        let message: AnthropicMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": [{"type": "tool_result", "tool_use_id": "toolu_a", "content": "ok"}]
        }))
        .unwrap();
        assert!(matches!(
            anthropic_action_to_openai(&message),
            Err(CodecError::UnexpectedBlock("tool_result"))
        ));
    }

    #[test]
    fn anthropic_action_without_tools_has_no_calls() {
        let message = AnthropicMessage {
            role: AnthropicRole::Assistant,
            content: MessageContent::Text("Done.".into()),
        };
        let action = anthropic_action_to_openai(&message).unwrap();
        assert!(action.tool_calls.is_none());
        assert_eq!(action.content.as_deref(), Some("Done."));
    }

    #[test]
    fn invalid_arguments_surface_call_id() {
        let action = Action::with_tool_calls(vec![function_call("call_9", "echo", "{oops")]);
        match openai_action_to_anthropic(&action) {
            Err(CodecError::InvalidArguments { id, .. }) => assert_eq!(id, "call_9"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn observations_fold_into_one_user_turn() {
        let observation = vec![
            ObservationMessage::tool("call_1", "first"),
            ObservationMessage::user("note"),
            ObservationMessage::tool("call_2", "second"),
        ];
        let turn = observations_to_anthropic(&observation).unwrap();
        assert_eq!(
            serde_json::to_value(&turn).unwrap(),
            json!({
                "role": "user",
                "content": [
                    {"type": "tool_result", "tool_use_id": "call_1", "content": "first"},
                    {"type": "text", "text": "note"},
                    {"type": "tool_result", "tool_use_id": "call_2", "content": "second"}
                ]
            })
        );

        let missing = vec![ObservationMessage {
            role: Role::Tool,
            tool_call_id: None,
            content: "x".into(),
        }];
        assert!(matches!(
            observations_to_anthropic(&missing),
            Err(CodecError::MissingToolCallId)
        ));
    }

    #[test]
    fn observations_to_openai_keeps_roles() {
        let observation = vec![
            ObservationMessage::tool("call_1", "ok"),
            ObservationMessage::user("next"),
        ];
        let messages = observations_to_openai(&observation).unwrap();
        assert!(matches!(messages[0], ChatCompletionRequestMessage::Tool(_)));
        assert!(matches!(messages[1], ChatCompletionRequestMessage::User(_)));
        let wire = serde_json::to_value(&messages).unwrap();
        assert_eq!(wire[0]["tool_call_id"], "call_1");
        assert_eq!(wire[0]["content"], "ok");
    }
}
