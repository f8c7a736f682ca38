//! Configuration for environments and the session registry
//!
//! Environment configs are decoded from the `kwargs` JSON object handed to
//! `create`. Every field has a default, and unknown fields are rejected so a
//! typo never silently falls back to a default.

use serde::{Deserialize, Serialize};

use crate::env::sokoban::room::RoomSetup;
use crate::error::{EnvError, Result};
use crate::items::Observation;

/// Reward shaping for the box-pushing puzzle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SokobanRewards {
    /// Added every step, usually negative
    pub step_penalty: f64,

    /// Added when the number of boxes on targets goes up
    pub box_on_target: f64,

    /// Added when the number of boxes on targets goes down, usually negative
    pub box_off_target: f64,

    /// Added once when every box is on a target
    pub finished: f64,
}

impl Default for SokobanRewards {
    fn default() -> Self {
        Self {
            step_penalty: -0.1,
            box_on_target: 1.0,
            box_off_target: -1.0,
            finished: 10.0,
        }
    }
}

/// Box-pushing puzzle configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SokobanConfig {
    /// Room size as `[height, width]`
    pub dim_room: (usize, usize),

    /// Steps after which the episode ends
    pub max_steps: usize,

    pub num_boxes: usize,

    /// Length of the generation walks; `1.7 * (height + width)` when unset
    pub num_gen_steps: Option<usize>,

    /// Attempts before generation gives up
    pub max_generation_attempts: usize,

    pub rewards: SokobanRewards,

    /// Fixed room used by the first reset instead of a generated one
    pub room_setup: Option<RoomSetup>,
}

impl Default for SokobanConfig {
    fn default() -> Self {
        Self {
            dim_room: (10, 10),
            max_steps: 120,
            num_boxes: 4,
            num_gen_steps: None,
            max_generation_attempts: 64,
            rewards: SokobanRewards::default(),
            room_setup: None,
        }
    }
}

impl SokobanConfig {
    pub fn validate(&self) -> Result<()> {
        let (height, width) = self.dim_room;
        if height < 3 || width < 3 {
            return Err(EnvError::InvalidConfig(format!(
                "dim_room must be at least 3x3, got {height}x{width}"
            )));
        }
        if self.num_boxes == 0 {
            return Err(EnvError::InvalidConfig("num_boxes must be positive".into()));
        }
        if self.max_steps == 0 {
            return Err(EnvError::InvalidConfig("max_steps must be positive".into()));
        }
        if self.max_generation_attempts == 0 {
            return Err(EnvError::InvalidConfig(
                "max_generation_attempts must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Arithmetic-equation puzzle configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CountdownConfig {
    /// Number of digits handed to the agent
    pub num_operands: usize,

    /// Operators used to build the ground-truth equation
    pub operations: Vec<String>,

    /// Submissions allowed before the episode is truncated
    pub max_attempts: Option<usize>,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            num_operands: 6,
            operations: ["+", "-", "*", "/"].map(String::from).to_vec(),
            max_attempts: None,
        }
    }
}

impl CountdownConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_operands < 2 {
            return Err(EnvError::InvalidConfig(
                "num_operands must be at least 2".into(),
            ));
        }
        if self.operations.is_empty() {
            return Err(EnvError::InvalidConfig("operations must not be empty".into()));
        }
        if let Some(op) = self
            .operations
            .iter()
            .find(|op| !matches!(op.as_str(), "+" | "-" | "*" | "/"))
        {
            return Err(EnvError::InvalidConfig(format!(
                "unsupported operation '{op}'"
            )));
        }
        if self.max_attempts == Some(0) {
            return Err(EnvError::InvalidConfig("max_attempts must be positive".into()));
        }
        Ok(())
    }
}

/// Grid-navigation configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FrozenLakeConfig {
    /// Side length of the square map
    pub map_size: usize,

    /// Probability that a generated cell is frozen rather than a hole
    pub frozen_prob: f64,

    pub is_slippery: bool,

    /// Steps after which the episode is truncated
    pub max_steps: usize,
}

impl Default for FrozenLakeConfig {
    fn default() -> Self {
        Self {
            map_size: 8,
            frozen_prob: 0.8,
            is_slippery: false,
            max_steps: 100,
        }
    }
}

impl FrozenLakeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.map_size < 2 {
            return Err(EnvError::InvalidConfig("map_size must be at least 2".into()));
        }
        if !(self.frozen_prob > 0.0 && self.frozen_prob <= 1.0) {
            return Err(EnvError::InvalidConfig(format!(
                "frozen_prob must be in (0, 1], got {}",
                self.frozen_prob
            )));
        }
        if self.max_steps == 0 {
            return Err(EnvError::InvalidConfig("max_steps must be positive".into()));
        }
        Ok(())
    }
}

/// Configuration shared by the chat environments
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChatConfig {
    /// Transcript returned by `reset`
    pub chat_history: Observation,

    pub task_prompt: String,
}

/// Session registry configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// Upper bound on live sessions; unbounded when unset
    pub max_sessions: Option<usize>,
}

/// Configuration builder
#[derive(Default)]
pub struct ConfigBuilder {
    config: RegistryConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_sessions(mut self, max: usize) -> Self {
        self.config.max_sessions = Some(max);
        self
    }

    pub fn unbounded(mut self) -> Self {
        self.config.max_sessions = None;
        self
    }

    pub fn build(self) -> RegistryConfig {
        self.config
    }
}
