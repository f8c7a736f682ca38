//! Environment contract shared by every puzzle type
//!
//! What this module provides
//! - `Environment`: the capability set (`reset`, `step`, `task_prompt`,
//!   `action_schema`, `close`) each environment type implements on its own
//! - `Episode`: the `Uninitialized -> Ready -> Terminal` state machine wrapped
//!   around any environment, so the rules are enforced in one place
//! - `select_single_call`: the one tool-call-per-turn policy used by every
//!   environment that does not accept parallel calls
//!
//! Environments are single-threaded state machines. Callers that share one
//! across tasks wrap it in a `tokio::sync::Mutex` (the session registry does).

use async_openai::types::ChatCompletionMessageToolCall;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EnvError, Result};
use crate::items::{Action, Info, Observation, ObservationMessage, ResetOptions};
use crate::tool::ToolSchema;

pub mod countdown;
pub mod frozen_lake;
pub mod single_turn;
pub mod sokoban;
pub mod tool_chat;

pub use countdown::CountdownEnv;
pub use frozen_lake::FrozenLakeEnv;
pub use single_turn::SingleTurnChatEnv;
pub use sokoban::SokobanEnv;
pub use tool_chat::{ToolChatEnv, ToolConnection, ToolProvider};

/// Observation and diagnostics produced by `reset`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResetOutcome {
    pub observation: Observation,
    pub info: Info,
}

/// Result of one environment step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub observation: Observation,
    pub reward: f64,
    pub done: bool,
    pub truncated: bool,
    pub info: Info,
}

impl StepResult {
    /// Whether the episode reached a terminal state with this step.
    pub fn is_terminal(&self) -> bool {
        self.done || self.truncated
    }

    /// The response given when the agent stops calling tools.
    pub(crate) fn finished(info: Info) -> Self {
        Self {
            observation: Vec::new(),
            reward: 0.0,
            done: true,
            truncated: false,
            info,
        }
    }

    /// Answer a call that was refused without touching the environment state.
    ///
    /// The error opens the observation and is recorded under `info["error"]`.
    pub(crate) fn rejected(
        call_id: impl Into<String>,
        message: String,
        body: &str,
        mut info: Info,
    ) -> Self {
        let content = with_error_prefix(Some(message.as_str()), body);
        info.insert("error".into(), Value::String(message));
        Self {
            observation: vec![ObservationMessage::tool(call_id, content)],
            reward: 0.0,
            done: false,
            truncated: false,
            info,
        }
    }
}

/// Capability interface every environment type implements.
#[async_trait]
pub trait Environment: Send {
    /// (Re)initialize the episode. Deterministic for a given seed.
    async fn reset(
        &mut self,
        seed: Option<u64>,
        options: Option<ResetOptions>,
    ) -> Result<ResetOutcome>;

    /// Advance exactly one turn.
    async fn step(&mut self, action: &Action) -> Result<StepResult>;

    /// Natural-language instructions for the current episode.
    fn task_prompt(&self) -> String;

    /// Tool set accepted by `step`.
    fn action_schema(&self) -> Result<Vec<ToolSchema>>;

    /// Whether one turn may carry several tool calls.
    fn allows_parallel_tool_calls(&self) -> bool {
        false
    }

    /// Release external resources. Safe to call more than once.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Position of an episode in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodePhase {
    Uninitialized,
    Ready,
    Terminal,
}

/// An environment together with its lifecycle phase.
pub struct Episode {
    env: Box<dyn Environment>,
    phase: EpisodePhase,
}

impl Episode {
    pub fn new(env: Box<dyn Environment>) -> Self {
        Self {
            env,
            phase: EpisodePhase::Uninitialized,
        }
    }

    pub fn phase(&self) -> EpisodePhase {
        self.phase
    }

    pub async fn reset(
        &mut self,
        seed: Option<u64>,
        options: Option<ResetOptions>,
    ) -> Result<ResetOutcome> {
        let outcome = self.env.reset(seed, options).await?;
        self.phase = EpisodePhase::Ready;
        Ok(outcome)
    }

    pub async fn step(&mut self, action: &Action) -> Result<StepResult> {
        match self.phase {
            EpisodePhase::Uninitialized => return Err(EnvError::NotReset),
            EpisodePhase::Terminal => return Err(EnvError::EpisodeFinished),
            EpisodePhase::Ready => {}
        }
        let result = self.env.step(action).await?;
        if result.is_terminal() {
            self.phase = EpisodePhase::Terminal;
        }
        Ok(result)
    }

    pub fn task_prompt(&self) -> String {
        self.env.task_prompt()
    }

    pub fn action_schema(&self) -> Result<Vec<ToolSchema>> {
        self.env.action_schema()
    }

    pub fn allows_parallel_tool_calls(&self) -> bool {
        self.env.allows_parallel_tool_calls()
    }

    pub async fn close(&mut self) -> Result<()> {
        self.env.close().await
    }
}

/// Pick the first tool call of a turn. Extra calls are never applied.
///
/// Returns `None` when the turn carries no tool call, otherwise the call and
/// a warning naming the dropped calls, if any.
pub fn select_single_call(
    action: &Action,
) -> Option<(&ChatCompletionMessageToolCall, Option<String>)> {
    let calls = action.tool_calls();
    let first = calls.first()?;
    let warning = (calls.len() > 1).then(|| {
        format!(
            "Only one action can be taken per turn, but {} were submitted. Only the first one ({}) was applied.",
            calls.len(),
            first.function.name
        )
    });
    Some((first, warning))
}

/// Prefix an error message to observation text.
pub(crate) fn with_error_prefix(error: Option<&str>, body: &str) -> String {
    match error {
        Some(message) => format!("An error occurred. The error message is: {message}\n{body}"),
        None => body.to_string(),
    }
}

/// Decode constructor options, falling back to defaults when none are given.
pub(crate) fn decode_options<T>(kwargs: Option<Value>) -> Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    match kwargs {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => {
            serde_json::from_value(value).map_err(|e| EnvError::InvalidConfig(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::function_call;

    struct Counter {
        steps: usize,
        limit: usize,
    }

    #[async_trait]
    impl Environment for Counter {
        async fn reset(
            &mut self,
            _seed: Option<u64>,
            _options: Option<ResetOptions>,
        ) -> Result<ResetOutcome> {
            self.steps = 0;
            Ok(ResetOutcome::default())
        }

        async fn step(&mut self, _action: &Action) -> Result<StepResult> {
            self.steps += 1;
            Ok(StepResult {
                observation: vec![ObservationMessage::user(self.steps.to_string())],
                reward: 0.0,
                done: self.steps >= self.limit,
                truncated: false,
                info: Info::new(),
            })
        }

        fn task_prompt(&self) -> String {
            "count".to_string()
        }

        fn action_schema(&self) -> Result<Vec<ToolSchema>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn episode_enforces_lifecycle() {
        let mut episode = Episode::new(Box::new(Counter { steps: 0, limit: 2 }));
        let action = Action::text("go");

        assert!(matches!(
            episode.step(&action).await,
            Err(EnvError::NotReset)
        ));

        episode.reset(None, None).await.unwrap();
        assert_eq!(episode.phase(), EpisodePhase::Ready);
        assert!(!episode.step(&action).await.unwrap().done);
        assert!(episode.step(&action).await.unwrap().done);
        assert_eq!(episode.phase(), EpisodePhase::Terminal);

        assert!(matches!(
            episode.step(&action).await,
            Err(EnvError::EpisodeFinished)
        ));

        episode.reset(None, None).await.unwrap();
        assert_eq!(episode.phase(), EpisodePhase::Ready);
    }

    #[test]
    fn select_single_call_keeps_first_and_warns() {
        let action = Action::with_tool_calls(vec![
            function_call("a", "move_up", "{}"),
            function_call("b", "move_down", "{}"),
        ]);
        let (call, warning) = select_single_call(&action).unwrap();
        assert_eq!(call.id, "a");
        assert!(warning.unwrap().contains("2 were submitted"));

        let single = Action::with_tool_calls(vec![function_call("c", "move_up", "{}")]);
        let (_, warning) = select_single_call(&single).unwrap();
        assert!(warning.is_none());

        assert!(select_single_call(&Action::text("done")).is_none());
    }

    #[test]
    fn rejected_prefixes_error_and_records_it() {
        let result = StepResult::rejected(
            "call_7",
            "Unknown action 'jump'".into(),
            "Nothing changed.",
            Info::new(),
        );
        assert_eq!(result.observation.len(), 1);
        assert_eq!(result.observation[0].tool_call_id.as_deref(), Some("call_7"));
        assert_eq!(
            result.observation[0].content,
            "An error occurred. The error message is: Unknown action 'jump'\nNothing changed."
        );
        assert_eq!(result.info["error"], "Unknown action 'jump'");
        assert_eq!(result.reward, 0.0);
        assert!(!result.is_terminal());
    }

    #[test]
    fn decode_options_defaults_and_rejects() {
        #[derive(Debug, Default, serde::Deserialize)]
        #[serde(default, deny_unknown_fields)]
        struct Opts {
            size: usize,
        }
        let opts: Opts = decode_options(None).unwrap();
        assert_eq!(opts.size, 0);
        let opts: Opts = decode_options(Some(serde_json::json!({"size": 4}))).unwrap();
        assert_eq!(opts.size, 4);
        assert!(matches!(
            decode_options::<Opts>(Some(serde_json::json!({"sise": 4}))),
            Err(EnvError::InvalidConfig(_))
        ));
    }
}
