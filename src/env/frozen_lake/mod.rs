//! Frozen-lake navigation environment
//!
//! A translation shim: tool calls become moves on the `lake` engine, and the
//! engine state is rendered back as text.

pub mod lake;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use tracing::{debug, warn};

use self::lake::{Lake, LakeAction, LakeMap};
use super::{decode_options, select_single_call, with_error_prefix, Environment, ResetOutcome, StepResult};
use crate::config::FrozenLakeConfig;
use crate::error::{EnvError, Result};
use crate::items::{Action, Info, ObservationMessage, ResetOptions};
use crate::tool::ToolSchema;

/// Grid navigation across a frozen lake.
pub struct FrozenLakeEnv {
    config: FrozenLakeConfig,
    tools: Vec<ToolSchema>,
    rng: StdRng,
    lake: Option<Lake>,
    last_tool_call_id: Option<String>,
}

impl FrozenLakeEnv {
    pub fn new(config: FrozenLakeConfig) -> Result<Self> {
        config.validate()?;
        let tools = [
            ("move_left", "Move left"),
            ("move_right", "Move right"),
            ("move_up", "Move up"),
            ("move_down", "Move down"),
        ]
        .into_iter()
        .map(|(name, description)| ToolSchema::without_arguments(name, description))
        .collect();
        Ok(Self {
            config,
            tools,
            rng: StdRng::from_entropy(),
            lake: None,
            last_tool_call_id: None,
        })
    }

    pub fn from_kwargs(kwargs: Option<Value>) -> Result<Self> {
        Self::new(decode_options(kwargs)?)
    }

    pub fn lake(&self) -> Option<&Lake> {
        self.lake.as_ref()
    }

    fn observation(&self, lake: &Lake, warning: Option<&str>) -> ObservationMessage {
        let (row, col) = lake.position();
        let body = format!(
            "You are at position {row},{col} in the world.\nThe current map of the world is: \n{}",
            lake.render()
        );
        let content = with_error_prefix(warning, &body);
        match &self.last_tool_call_id {
            Some(id) => ObservationMessage::tool(id.clone(), content),
            None => ObservationMessage::user(content),
        }
    }
}

#[async_trait]
impl Environment for FrozenLakeEnv {
    async fn reset(
        &mut self,
        seed: Option<u64>,
        _options: Option<ResetOptions>,
    ) -> Result<ResetOutcome> {
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        let map = LakeMap::generate(self.config.map_size, self.config.frozen_prob, &mut self.rng)?;
        let lake = Lake::new(map, self.config.is_slippery, self.config.max_steps);
        self.last_tool_call_id = None;
        let observation = vec![self.observation(&lake, None)];
        self.lake = Some(lake);
        Ok(ResetOutcome {
            observation,
            info: Info::new(),
        })
    }

    async fn step(&mut self, action: &Action) -> Result<StepResult> {
        let mut lake = self.lake.take().ok_or(EnvError::NotReset)?;

        let Some((call, warning)) = select_single_call(action) else {
            self.lake = Some(lake);
            return Ok(StepResult::finished(Info::new()));
        };
        let Some(movement) = LakeAction::from_tool_name(&call.function.name) else {
            let message = format!(
                "Unknown action '{}'. Available actions: move_left, move_right, move_up, move_down",
                call.function.name
            );
            warn!(error = %message, "Rejected frozen lake action");
            let body = format!("The current map of the world is: \n{}", lake.render());
            self.lake = Some(lake);
            return Ok(StepResult::rejected(call.id.clone(), message, &body, Info::new()));
        };

        self.last_tool_call_id = Some(call.id.clone());
        let outcome = lake.step(movement, &mut self.rng);
        debug!(?movement, taken = ?outcome.taken, position = ?lake.position(), "Frozen lake step");

        let mut info = Info::new();
        if let Some(warning) = &warning {
            info.insert("error".into(), json!(warning));
        }
        let observation = vec![self.observation(&lake, warning.as_deref())];
        self.lake = Some(lake);
        Ok(StepResult {
            observation,
            reward: outcome.reward,
            done: outcome.terminated,
            truncated: outcome.truncated,
            info,
        })
    }

    fn task_prompt(&self) -> String {
        let slippery = self.config.is_slippery;
        let mut prompt = String::from(
            "Welcome, robot player! Your mission is to navigate across the frozen lake to reach the goal.\n\
             The frozen lake is a treacherous path where you must avoid falling into holes while making your way from the start to the goal.\n",
        );
        if slippery {
            prompt.push_str(
                "Be cautious: the icy surface is slippery, and you might not always move in the direction you intend.\n",
            );
        }
        prompt.push_str(&format!(
            "You begin at position [0,0] of the grid and the goal is in the opposite corner, at [{last},{last}] on this {size}x{size} lake.\n\
             Keep moving until you reach the goal or fall into a hole.\n",
            last = self.config.map_size - 1,
            size = self.config.map_size
        ));
        if slippery {
            prompt.push_str(
                "On the slippery lake you move in the intended direction with probability 1/3, and in each of the two perpendicular directions with probability 1/3.\n\
                 For example, moving left from [x,y] may take you to [x,y-1], [x-1,y] or [x+1,y].\n",
            );
        }
        prompt.push_str(
            "Randomly generated worlds always have a path to the goal. \
             After every move you receive the current map of the world, a 2D grid where \
             'P' is your position, 'G' the goal, 'H' a hole and 'F' a frozen cell.\n\n\
             Rewards:\n\
             - 1 point for reaching the goal.\n\
             - 0 points for moving on the ice.\n\
             - 0 points for falling into a hole.\n",
        );
        prompt
    }

    fn action_schema(&self) -> Result<Vec<ToolSchema>> {
        Ok(self.tools.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::{function_call, Role};
    use pretty_assertions::assert_eq;

    fn mv(name: &str) -> Action {
        Action::with_tool_calls(vec![function_call("call_1", name, "{}")])
    }

    #[tokio::test]
    async fn test_reset_is_seeded() {
        let mut a = FrozenLakeEnv::new(FrozenLakeConfig::default()).unwrap();
        let mut b = FrozenLakeEnv::new(FrozenLakeConfig::default()).unwrap();
        let obs_a = a.reset(Some(3), None).await.unwrap().observation;
        let obs_b = b.reset(Some(3), None).await.unwrap().observation;
        assert_eq!(obs_a, obs_b);
        assert_eq!(obs_a[0].role, Role::User);
        assert!(obs_a[0].content.starts_with("You are at position 0,0 in the world."));
    }

    #[tokio::test]
    async fn test_step_answers_tool_call() {
        let mut env = FrozenLakeEnv::new(FrozenLakeConfig::default()).unwrap();
        env.reset(Some(1), None).await.unwrap();
        let result = env.step(&mv("move_up")).await.unwrap();
        // Moving up from the start leaves the player in place.
        assert_eq!(env.lake().unwrap().position(), (0, 0));
        assert_eq!(result.observation[0].role, Role::Tool);
        assert_eq!(result.observation[0].tool_call_id.as_deref(), Some("call_1"));
        assert!(!result.done);
    }

    #[tokio::test]
    async fn test_unknown_move_is_rejected() {
        let mut env = FrozenLakeEnv::new(FrozenLakeConfig::default()).unwrap();
        env.reset(Some(1), None).await.unwrap();
        let result = env.step(&mv("jump")).await.unwrap();
        assert_eq!(
            result.info["error"],
            "Unknown action 'jump'. Available actions: move_left, move_right, move_up, move_down"
        );
        assert_eq!(result.observation[0].tool_call_id.as_deref(), Some("call_1"));
        assert!(result.observation[0]
            .content
            .starts_with("An error occurred. The error message is: Unknown action 'jump'"));
        assert!(!result.done);
        assert_eq!(env.lake().unwrap().steps(), 0);
    }

    #[tokio::test]
    async fn test_no_call_ends_episode() {
        let mut env = FrozenLakeEnv::new(FrozenLakeConfig::default()).unwrap();
        env.reset(Some(1), None).await.unwrap();
        let result = env.step(&Action::text("done")).await.unwrap();
        assert!(result.done);
        assert!(result.observation.is_empty());
    }

    #[test]
    fn test_schema_and_prompt() {
        let env = FrozenLakeEnv::new(FrozenLakeConfig {
            is_slippery: true,
            ..Default::default()
        })
        .unwrap();
        let names: Vec<_> = env
            .action_schema()
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["move_left", "move_right", "move_up", "move_down"]);
        assert!(env.task_prompt().contains("slippery"));
        assert!(env.task_prompt().contains("[7,7]"));
    }
}
