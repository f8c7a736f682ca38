//! # tower-gym
//!
//! Tool-calling puzzle environments for LLM agents, served through a session
//! registry.
//!
//! ## Core Concepts
//!
//! - **Environment**: an episode driven by assistant turns; each turn carries
//!   OpenAI-style tool calls and is answered with tool/user messages
//! - **Episode**: the `Uninitialized -> Ready -> Terminal` guard wrapped around
//!   every environment
//! - **SessionRegistry**: owns live episodes by id; also usable as a
//!   `tower::Service`
//! - **Codec**: conversions between OpenAI, Anthropic and generic wire shapes
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use tower_gym::{function_call, Action, RegistryConfig, SessionRegistry};
//! use serde_json::json;
//!
//! # async fn example() -> tower_gym::Result<()> {
//! let registry = SessionRegistry::with_builtin_envs(RegistryConfig::default());
//!
//! let created = registry
//!     .create("sokoban", Some(42), Some(json!({"dim_room": [7, 7], "num_boxes": 2})))
//!     .await?;
//! println!("{}", created.observation[0].content);
//!
//! let action = Action::with_tool_calls(vec![function_call("call_1", "push_up", "{}")]);
//! let step = registry.step(&created.session_id, &action).await?;
//! println!("reward {} done {}", step.reward, step.done);
//!
//! registry.close(&created.session_id).await;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod env;
pub mod error;
pub mod items;
pub mod sessions;
pub mod tool;

pub use codec::{
    anthropic_action_to_openai, observations_to_anthropic, observations_to_openai,
    openai_action_to_anthropic, tools_to_anthropic, tools_to_openai, CodecError,
};
pub use config::{
    ChatConfig, ConfigBuilder, CountdownConfig, FrozenLakeConfig, RegistryConfig, SokobanConfig,
    SokobanRewards,
};
pub use env::{
    CountdownEnv, Environment, Episode, EpisodePhase, FrozenLakeEnv, ResetOutcome,
    SingleTurnChatEnv, SokobanEnv, StepResult, ToolChatEnv, ToolConnection, ToolProvider,
};
pub use error::{EnvError, Result};
pub use items::{function_call, Action, Info, Observation, ObservationMessage, ResetOptions, Role};
pub use sessions::{
    CloseResponse, CreateResponse, RegistryRequest, RegistryResponse, RegistryService,
    ResetResponse, SchemaFormat, SessionId, SessionRegistry, StepResponse, ToolSchemas,
};
pub use tool::ToolSchema;

// Re-export Tower traits that users need
pub use tower::{Service, ServiceExt};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
