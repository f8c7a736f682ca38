//! Static single-turn chat
//!
//! `reset` hands back a fixed transcript and the first `step` ends the
//! episode, whatever the assistant said. Useful as a baseline where the
//! reward is computed outside the environment.

use async_trait::async_trait;
use serde_json::Value;

use super::{decode_options, Environment, ResetOutcome, StepResult};
use crate::config::ChatConfig;
use crate::error::Result;
use crate::items::{Action, Info, ResetOptions};
use crate::tool::ToolSchema;

pub struct SingleTurnChatEnv {
    config: ChatConfig,
}

impl SingleTurnChatEnv {
    pub fn new(config: ChatConfig) -> Self {
        Self { config }
    }

    pub fn from_kwargs(kwargs: Option<Value>) -> Result<Self> {
        Ok(Self::new(decode_options(kwargs)?))
    }
}

#[async_trait]
impl Environment for SingleTurnChatEnv {
    async fn reset(
        &mut self,
        _seed: Option<u64>,
        _options: Option<ResetOptions>,
    ) -> Result<ResetOutcome> {
        Ok(ResetOutcome {
            observation: self.config.chat_history.clone(),
            info: Info::new(),
        })
    }

    async fn step(&mut self, _action: &Action) -> Result<StepResult> {
        Ok(StepResult {
            observation: Vec::new(),
            reward: 0.0,
            done: true,
            truncated: true,
            info: Info::new(),
        })
    }

    fn task_prompt(&self) -> String {
        self.config.task_prompt.clone()
    }

    fn action_schema(&self) -> Result<Vec<ToolSchema>> {
        Ok(Vec::new())
    }
}
