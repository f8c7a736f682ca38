//! Chat environment backed by external tool providers
//!
//! What this module provides
//! - `ToolProvider` / `ToolConnection`: the contract an external tool backend
//!   (a subprocess tool server, a remote service) must satisfy
//! - `ToolChatEnv`: a chat episode whose tool set is discovered from its
//!   providers at reset
//!
//! Connections are scoped: every discovery and every tool call connects,
//! does exactly one thing, and closes again. This costs a connection per call
//! and keeps no long-lived sessions to manage. Timeouts are the provider's
//! business.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use super::{with_error_prefix, Environment, ResetOutcome, StepResult};
use crate::config::ChatConfig;
use crate::error::{EnvError, Result};
use crate::items::{Action, Info, ObservationMessage, ResetOptions};
use crate::tool::ToolSchema;

/// Reset option that forces tool rediscovery.
pub const RESET_TOOL_SERVERS: &str = "reset_tool_servers";

/// A source of tools that can be connected to on demand.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    async fn connect(&self) -> Result<Box<dyn ToolConnection>>;
}

/// One open connection to a tool provider.
#[async_trait]
pub trait ToolConnection: Send {
    async fn list_tools(&mut self) -> Result<Vec<ToolSchema>>;

    /// Run one tool and return its text output.
    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<String>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Chat episode whose tools come from external providers.
pub struct ToolChatEnv {
    config: ChatConfig,
    providers: Vec<Arc<dyn ToolProvider>>,
    tools: Option<Vec<ToolSchema>>,
    routes: HashMap<String, usize>,
}

impl ToolChatEnv {
    pub fn new(config: ChatConfig, providers: Vec<Arc<dyn ToolProvider>>) -> Self {
        Self {
            config,
            providers,
            tools: None,
            routes: HashMap::new(),
        }
    }

    async fn discover(&mut self) -> Result<()> {
        let listings = join_all(self.providers.iter().map(|provider| async move {
            let mut connection = provider.connect().await?;
            let listed = connection.list_tools().await;
            connection.close().await?;
            listed
        }))
        .await;

        let mut tools = Vec::new();
        let mut routes = HashMap::new();
        for (index, listing) in listings.into_iter().enumerate() {
            let provider = self.providers[index].name();
            let listed = listing.map_err(|e| {
                EnvError::ToolProvider(format!("discovery on '{provider}' failed: {e}"))
            })?;
            debug!(provider, count = listed.len(), "Discovered tools");
            for tool in listed {
                if routes.insert(tool.name.clone(), index).is_some() {
                    warn!(provider, tool = %tool.name, "Tool name shadows an earlier provider");
                    tools.retain(|t: &ToolSchema| t.name != tool.name);
                }
                tools.push(tool);
            }
        }
        self.tools = Some(tools);
        self.routes = routes;
        Ok(())
    }

    async fn invoke(&self, name: &str, raw_arguments: &str) -> std::result::Result<String, String> {
        let Some(&index) = self.routes.get(name) else {
            return Err(format!("Unknown tool '{name}'"));
        };
        let raw = raw_arguments.trim();
        let arguments: Value = serde_json::from_str(if raw.is_empty() { "{}" } else { raw })
            .map_err(|e| format!("Invalid arguments for '{name}': {e}"))?;

        let provider = &self.providers[index];
        let mut connection = provider.connect().await.map_err(|e| e.to_string())?;
        let result = connection.call_tool(name, arguments).await;
        if let Err(e) = connection.close().await {
            warn!(provider = provider.name(), error = %e, "Closing tool connection failed");
        }
        result.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl Environment for ToolChatEnv {
    async fn reset(
        &mut self,
        _seed: Option<u64>,
        options: Option<ResetOptions>,
    ) -> Result<ResetOutcome> {
        let rediscover = options
            .as_ref()
            .and_then(|options| options.get(RESET_TOOL_SERVERS))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if rediscover {
            self.tools = None;
            self.routes.clear();
        }
        if self.tools.is_none() {
            self.discover().await?;
        }
        Ok(ResetOutcome {
            observation: self.config.chat_history.clone(),
            info: Info::new(),
        })
    }

    async fn step(&mut self, action: &Action) -> Result<StepResult> {
        let calls = action.tool_calls();
        if calls.is_empty() {
            return Ok(StepResult::finished(Info::new()));
        }

        let mut observation = Vec::with_capacity(calls.len());
        let mut errors = Vec::new();
        for call in calls {
            let name = &call.function.name;
            let content = match self.invoke(name, &call.function.arguments).await {
                Ok(output) => output,
                Err(message) => {
                    warn!(tool = %name, error = %message, "Tool call failed");
                    let body = format!("Tool '{name}' returned no output.");
                    let content = with_error_prefix(Some(message.as_str()), &body);
                    errors.push(message);
                    content
                }
            };
            observation.push(ObservationMessage::tool(call.id.clone(), content));
        }

        let mut info = Info::new();
        if !errors.is_empty() {
            info.insert("error".into(), Value::String(errors.join("\n")));
        }
        Ok(StepResult {
            observation,
            reward: 0.0,
            done: false,
            truncated: false,
            info,
        })
    }

    fn task_prompt(&self) -> String {
        self.config.task_prompt.clone()
    }

    fn action_schema(&self) -> Result<Vec<ToolSchema>> {
        self.tools.clone().ok_or_else(|| {
            EnvError::SchemaUnavailable("tools are discovered at reset; call reset first".into())
        })
    }

    fn allows_parallel_tool_calls(&self) -> bool {
        true
    }

    async fn close(&mut self) -> Result<()> {
        self.tools = None;
        self.routes.clear();
        Ok(())
    }
}
