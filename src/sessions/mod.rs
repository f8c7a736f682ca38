//! Session registry: live environment episodes addressed by id
//!
//! What this module provides
//! - `SessionRegistry`: an explicit registry object owning every live session,
//!   with create/step/reset/close/schema/prompt operations
//! - `SessionId`, `Session`, request and response types for each operation
//! - `RegistryService`: the registry as a `tower::Service<RegistryRequest>`, so
//!   an outer transport can stack tower layers on top
//!
//! Implementation strategy
//! - Environment types are registered by name with a factory closure that
//!   decodes the creation `kwargs`; no global state
//! - The session map sits behind a `std::sync::RwLock` that is only taken for
//!   insert, remove and lookup, never across an `.await`
//! - Each session owns a `tokio::sync::Mutex<Episode>`, so calls on one session
//!   are serialized while calls on different sessions run in parallel
//!
//! Testing strategy
//! - Unit tests for the lifecycle, unknown ids and types, double close and
//!   capacity
//! - Concurrency test stepping many sessions at once on a multi-thread runtime
//! - `tests/registry.rs` drives the registry through `RegistryService`

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use std::task::{Context, Poll};

use async_openai::types::ChatCompletionTool;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::Service;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use crate::codec::anthropic::AnthropicTool;
use crate::codec::{tools_to_anthropic, tools_to_openai};
use crate::config::RegistryConfig;
use crate::env::{
    CountdownEnv, Environment, Episode, EpisodePhase, FrozenLakeEnv, ResetOutcome,
    SingleTurnChatEnv, SokobanEnv, StepResult,
};
use crate::error::{EnvError, Result};
use crate::items::{Action, Info, Observation, ResetOptions};
use crate::tool::ToolSchema;

/// Opaque session token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Builds an environment from creation `kwargs`.
pub type EnvFactory = Arc<dyn Fn(Option<Value>) -> Result<Box<dyn Environment>> + Send + Sync>;

/// A live episode owned by the registry.
pub struct Session {
    pub id: SessionId,
    pub env_type: String,
    pub created_at: DateTime<Utc>,
    episode: tokio::sync::Mutex<Episode>,
}

impl Session {
    pub async fn phase(&self) -> EpisodePhase {
        self.episode.lock().await.phase()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("env_type", &self.env_type)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResponse {
    pub message: String,
    pub session_id: SessionId,
    pub observation: Observation,
    pub info: Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResponse {
    pub observation: Observation,
    pub reward: f64,
    pub done: bool,
    pub truncated: bool,
    pub info: Info,
}

impl From<StepResult> for StepResponse {
    fn from(result: StepResult) -> Self {
        Self {
            observation: result.observation,
            reward: result.reward,
            done: result.done,
            truncated: result.truncated,
            info: result.info,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    pub observation: Observation,
    pub info: Info,
}

impl From<ResetOutcome> for ResetResponse {
    fn from(outcome: ResetOutcome) -> Self {
        Self {
            observation: outcome.observation,
            info: outcome.info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseResponse {
    pub message: String,
    pub closed: bool,
}

/// Wire convention for `schema`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaFormat {
    #[default]
    Generic,
    #[serde(rename = "openai")]
    OpenAI,
    Anthropic,
}

/// A tool set in one of the supported conventions.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ToolSchemas {
    Generic(Vec<ToolSchema>),
    OpenAI(Vec<ChatCompletionTool>),
    Anthropic(Vec<AnthropicTool>),
}

impl ToolSchemas {
    pub fn len(&self) -> usize {
        match self {
            ToolSchemas::Generic(tools) => tools.len(),
            ToolSchemas::OpenAI(tools) => tools.len(),
            ToolSchemas::Anthropic(tools) => tools.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn boxed<E: Environment + 'static>(env: E) -> Box<dyn Environment> {
    Box::new(env)
}

/// Owner of every live session.
pub struct SessionRegistry {
    config: RegistryConfig,
    factories: BTreeMap<String, EnvFactory>,
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    /// Registry with no environment types.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            factories: BTreeMap::new(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with `sokoban`, `countdown`, `frozen_lake` and
    /// `single_turn_chat` registered.
    pub fn with_builtin_envs(config: RegistryConfig) -> Self {
        let mut registry = Self::new(config);
        registry.register("sokoban", |kwargs| SokobanEnv::from_kwargs(kwargs).map(boxed));
        registry.register("countdown", |kwargs| CountdownEnv::from_kwargs(kwargs).map(boxed));
        registry.register("frozen_lake", |kwargs| FrozenLakeEnv::from_kwargs(kwargs).map(boxed));
        registry.register("single_turn_chat", |kwargs| {
            SingleTurnChatEnv::from_kwargs(kwargs).map(boxed)
        });
        registry
    }

    /// Register (or replace) an environment type.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(Option<Value>) -> Result<Box<dyn Environment>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Registered environment type names, sorted.
    pub fn env_types(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Look up a live session.
    pub fn get(&self, id: &SessionId) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| EnvError::SessionNotFound(id.clone()))
    }

    fn check_capacity(&self, live: usize) -> Result<()> {
        match self.config.max_sessions {
            Some(max) if live >= max => Err(EnvError::CapacityExceeded { max }),
            _ => Ok(()),
        }
    }

    fn insert(&self, session: Arc<Session>) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        self.check_capacity(sessions.len())?;
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    /// Construct an environment, run its first reset and store the session.
    pub async fn create(
        &self,
        env_type: &str,
        seed: Option<u64>,
        kwargs: Option<Value>,
    ) -> Result<CreateResponse> {
        let factory = self
            .factories
            .get(env_type)
            .cloned()
            .ok_or_else(|| EnvError::UnknownEnvType {
                name: env_type.to_string(),
                available: self.env_types(),
            })?;
        self.check_capacity(self.session_count())?;

        let id = SessionId::generate();
        let span = info_span!("registry.create", session_id = %id, env_type);
        async move {
            let mut episode = Episode::new(factory(kwargs)?);
            let outcome = episode.reset(seed, None).await?;
            let session = Arc::new(Session {
                id: id.clone(),
                env_type: env_type.to_string(),
                created_at: Utc::now(),
                episode: tokio::sync::Mutex::new(episode),
            });
            if let Err(e) = self.insert(session.clone()) {
                if let Err(close_err) = session.episode.lock().await.close().await {
                    warn!(error = %close_err, "Closing rejected session failed");
                }
                return Err(e);
            }
            debug!("Session created");
            Ok(CreateResponse {
                message: format!("Environment '{env_type}' created"),
                session_id: id,
                observation: outcome.observation,
                info: outcome.info,
            })
        }
        .instrument(span)
        .await
    }

    pub async fn step(&self, id: &SessionId, action: &Action) -> Result<StepResponse> {
        let session = self.get(id)?;
        let span = info_span!("registry.step", session_id = %id, env_type = %session.env_type);
        async move {
            let result = session.episode.lock().await.step(action).await?;
            debug!(
                reward = result.reward,
                done = result.done,
                truncated = result.truncated,
                "Step applied"
            );
            Ok(result.into())
        }
        .instrument(span)
        .await
    }

    pub async fn reset(
        &self,
        id: &SessionId,
        seed: Option<u64>,
        options: Option<ResetOptions>,
    ) -> Result<ResetResponse> {
        let session = self.get(id)?;
        let span = info_span!("registry.reset", session_id = %id, env_type = %session.env_type);
        async move {
            let outcome = session.episode.lock().await.reset(seed, options).await?;
            Ok(outcome.into())
        }
        .instrument(span)
        .await
    }

    /// Remove a session and release its resources. Closing an unknown or
    /// already closed id reports `closed: false`.
    pub async fn close(&self, id: &SessionId) -> CloseResponse {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        let Some(session) = removed else {
            return CloseResponse {
                message: format!("Session {id} not found"),
                closed: false,
            };
        };
        let span = info_span!("registry.close", session_id = %id, env_type = %session.env_type);
        async move {
            if let Err(e) = session.episode.lock().await.close().await {
                warn!(error = %e, "Environment close failed");
            }
            CloseResponse {
                message: format!("Session {id} closed"),
                closed: true,
            }
        }
        .instrument(span)
        .await
    }

    /// Tool set of a session in the requested convention.
    pub async fn schema(&self, id: &SessionId, format: SchemaFormat) -> Result<ToolSchemas> {
        let session = self.get(id)?;
        let tools = session.episode.lock().await.action_schema()?;
        Ok(match format {
            SchemaFormat::Generic => ToolSchemas::Generic(tools),
            SchemaFormat::OpenAI => ToolSchemas::OpenAI(tools_to_openai(&tools)?),
            SchemaFormat::Anthropic => ToolSchemas::Anthropic(tools_to_anthropic(&tools)),
        })
    }

    pub async fn prompt(&self, id: &SessionId) -> Result<String> {
        let session = self.get(id)?;
        let prompt = session.episode.lock().await.task_prompt();
        Ok(prompt)
    }

    pub async fn allows_parallel_tool_calls(&self, id: &SessionId) -> Result<bool> {
        let session = self.get(id)?;
        let allowed = session.episode.lock().await.allows_parallel_tool_calls();
        Ok(allowed)
    }

    /// Run one request against the registry.
    pub async fn dispatch(&self, request: RegistryRequest) -> Result<RegistryResponse> {
        Ok(match request {
            RegistryRequest::Create {
                env_type,
                seed,
                kwargs,
            } => RegistryResponse::Created(self.create(&env_type, seed, kwargs).await?),
            RegistryRequest::Step { session_id, action } => {
                RegistryResponse::Stepped(self.step(&session_id, &action).await?)
            }
            RegistryRequest::Reset {
                session_id,
                seed,
                options,
            } => RegistryResponse::Reset(self.reset(&session_id, seed, options).await?),
            RegistryRequest::Close { session_id } => {
                RegistryResponse::Closed(self.close(&session_id).await)
            }
            RegistryRequest::Schema { session_id, format } => {
                RegistryResponse::Schema(self.schema(&session_id, format).await?)
            }
            RegistryRequest::Prompt { session_id } => {
                RegistryResponse::Prompt(self.prompt(&session_id).await?)
            }
            RegistryRequest::AllowsParallelToolCalls { session_id } => {
                RegistryResponse::AllowsParallelToolCalls(
                    self.allows_parallel_tool_calls(&session_id).await?,
                )
            }
        })
    }
}

/// A registry operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RegistryRequest {
    Create {
        env_type: String,
        #[serde(default)]
        seed: Option<u64>,
        #[serde(default)]
        kwargs: Option<Value>,
    },
    Step {
        session_id: SessionId,
        action: Action,
    },
    Reset {
        session_id: SessionId,
        #[serde(default)]
        seed: Option<u64>,
        #[serde(default)]
        options: Option<ResetOptions>,
    },
    Close {
        session_id: SessionId,
    },
    Schema {
        session_id: SessionId,
        #[serde(default)]
        format: SchemaFormat,
    },
    Prompt {
        session_id: SessionId,
    },
    AllowsParallelToolCalls {
        session_id: SessionId,
    },
}

/// Result of a registry operation.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RegistryResponse {
    Created(CreateResponse),
    Stepped(StepResponse),
    Reset(ResetResponse),
    Closed(CloseResponse),
    Schema(ToolSchemas),
    Prompt(String),
    AllowsParallelToolCalls(bool),
}

/// The registry as a tower service.
#[derive(Clone)]
pub struct RegistryService {
    registry: Arc<SessionRegistry>,
}

impl RegistryService {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }
}

impl Service<RegistryRequest> for RegistryService {
    type Response = RegistryResponse;
    type Error = EnvError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: RegistryRequest) -> Self::Future {
        let registry = self.registry.clone();
        Box::pin(async move { registry.dispatch(request).await })
    }
}
