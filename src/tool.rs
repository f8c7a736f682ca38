//! Tool schema model
//!
//! A `ToolSchema` is the provider-neutral description of one action an
//! environment accepts. Environments build their tool set once, at
//! construction (or at reset for environments that discover tools), and
//! never mutate it afterwards.

use async_openai::types::ChatCompletionMessageToolCall;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{EnvError, Result};

/// Name, description and JSON-Schema parameters of one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// A tool that takes no arguments.
    pub fn without_arguments(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(
            name,
            description,
            json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        )
    }

    /// A tool whose parameters are derived from a typed argument struct.
    pub fn typed<A: JsonSchema>(name: impl Into<String>, description: impl Into<String>) -> Result<Self> {
        let schema = schemars::schema_for!(A);
        let parameters = serde_json::to_value(schema.schema)?;
        Ok(Self::new(name, description, parameters))
    }
}

/// Decode the JSON-string arguments of a tool call into a typed struct.
pub fn decode_arguments<A: DeserializeOwned>(call: &ChatCompletionMessageToolCall) -> Result<A> {
    let raw = call.function.arguments.trim();
    let raw = if raw.is_empty() { "{}" } else { raw };
    serde_json::from_str(raw).map_err(EnvError::from)
}
