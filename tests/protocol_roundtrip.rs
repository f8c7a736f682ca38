//! Anthropic action -> OpenAI action -> environment -> Anthropic observation.

use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower_gym::codec::anthropic::{AnthropicMessage, ContentBlock, MessageContent};
use tower_gym::{
    anthropic_action_to_openai, observations_to_anthropic, observations_to_openai,
    openai_action_to_anthropic, ChatConfig, EnvError, Environment, ObservationMessage, RegistryConfig,
    SchemaFormat, SessionRegistry, ToolChatEnv, ToolConnection, ToolProvider, ToolSchema, ToolSchemas,
};

struct Calculator;

struct CalculatorConnection;

#[async_trait]
impl ToolProvider for Calculator {
    fn name(&self) -> &str {
        "calculator"
    }

    async fn connect(&self) -> tower_gym::Result<Box<dyn ToolConnection>> {
        Ok(Box::new(CalculatorConnection))
    }
}

#[async_trait]
impl ToolConnection for CalculatorConnection {
    async fn list_tools(&mut self) -> tower_gym::Result<Vec<ToolSchema>> {
        let operands = json!({
            "type": "object",
            "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
            "required": ["a", "b"]
        });
        Ok(vec![
            ToolSchema::new("add", "Add two numbers", operands.clone()),
            ToolSchema::new("multiply", "Multiply two numbers", operands),
        ])
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> tower_gym::Result<String> {
        let a = arguments["a"].as_f64().unwrap_or_default();
        let b = arguments["b"].as_f64().unwrap_or_default();
        match name {
            "add" => Ok((a + b).to_string()),
            "multiply" => Ok((a * b).to_string()),
            other => Err(EnvError::ToolProvider(format!("no tool {other}"))),
        }
    }

    async fn close(self: Box<Self>) -> tower_gym::Result<()> {
        Ok(())
    }
}

fn anthropic_turn() -> AnthropicMessage {
    serde_json::from_value(json!({
        "role": "assistant",
        "content": [
            {"type": "text", "text": "Computing both."},
            {"type": "tool_use", "id": "toolu_01", "name": "multiply", "input": {"a": 6, "b": 7}},
            {"type": "tool_use", "id": "toolu_02", "name": "add", "input": {"a": 1, "b": 2}}
        ]
    }))
    .unwrap()
}

#[tokio::test]
async fn tool_call_ids_and_order_survive_the_round_trip() {
    let mut env = ToolChatEnv::new(
        ChatConfig {
            chat_history: vec![ObservationMessage::user("What is 6*7 and 1+2?")],
            task_prompt: "Use the calculator.".into(),
        },
        vec![Arc::new(Calculator) as Arc<dyn ToolProvider>],
    );
    env.reset(None, None).await.unwrap();

    let turn = anthropic_turn();
    let action = anthropic_action_to_openai(&turn).unwrap();
    let ids: Vec<_> = action.tool_calls().iter().map(|c| c.id.clone()).collect();
    assert_eq!(ids, vec!["toolu_01", "toolu_02"]);

    let result = env.step(&action).await.unwrap();
    let observation = observations_to_anthropic(&result.observation).unwrap();
    let MessageContent::Blocks(blocks) = observation.content else {
        panic!("expected content blocks");
    };
    assert_eq!(
        blocks,
        vec![
            ContentBlock::ToolResult {
                tool_use_id: "toolu_01".into(),
                content: "42".into(),
                is_error: None,
            },
            ContentBlock::ToolResult {
                tool_use_id: "toolu_02".into(),
                content: "3".into(),
                is_error: None,
            },
        ]
    );

    let openai_messages = observations_to_openai(&result.observation).unwrap();
    let wire = serde_json::to_value(&openai_messages).unwrap();
    assert_eq!(wire[0]["tool_call_id"], "toolu_01");
    assert_eq!(wire[1]["tool_call_id"], "toolu_02");

    assert_eq!(openai_action_to_anthropic(&action).unwrap(), turn);
}

#[tokio::test]
async fn registered_tool_chat_serves_discovered_schema() {
    let mut registry = SessionRegistry::with_builtin_envs(RegistryConfig::default());
    registry.register("tool_chat", |kwargs| {
        let config: ChatConfig = match kwargs {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| EnvError::InvalidConfig(e.to_string()))?,
            None => ChatConfig::default(),
        };
        Ok(Box::new(ToolChatEnv::new(
            config,
            vec![Arc::new(Calculator) as Arc<dyn ToolProvider>],
        )) as Box<dyn Environment>)
    });

    let id = registry
        .create("tool_chat", None, Some(json!({"task_prompt": "Calculate."})))
        .await
        .unwrap()
        .session_id;
    assert!(registry.allows_parallel_tool_calls(&id).await.unwrap());

    let ToolSchemas::Anthropic(tools) = registry.schema(&id, SchemaFormat::Anthropic).await.unwrap()
    else {
        panic!("expected anthropic tools");
    };
    assert_eq!(tools.len(), 2);
    assert_eq!(tools[0].name, "add");
    assert_eq!(tools[0].input_schema["required"], json!(["a", "b"]));

    let action = anthropic_action_to_openai(&anthropic_turn()).unwrap();
    let step = registry.step(&id, &action).await.unwrap();
    assert_eq!(step.observation.len(), 2);
    assert!(registry.close(&id).await.closed);
}
