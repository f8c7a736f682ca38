//! Box-pushing puzzle environment
//!
//! What this module provides
//! - `room`: grid layers, push/move physics, serialization
//! - `generate`: reverse-play room generation that guarantees solvability
//! - `SokobanEnv`: the `Environment` implementation with reward shaping and
//!   text rendering
//!
//! Episode rules
//! - One tool call per turn. Extra calls are dropped and reported in the
//!   observation; zero calls is a no-op turn that still costs a step
//! - Reward per step: step penalty, plus the box-on/off-target delta, plus the
//!   completion bonus on the step that places the last box
//! - `done` when every box is on a target or `max_steps` is reached;
//!   `truncated` is always false

pub mod generate;
pub mod room;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use tracing::{debug, warn};

use self::generate::{generate_room, GeneratedRoom, GenerationParams};
use self::room::{Command, Direction, Room, RoomSetup};
use super::{decode_options, select_single_call, with_error_prefix, Environment, ResetOutcome, StepResult};
use crate::config::SokobanConfig;
use crate::error::{EnvError, Result};
use crate::items::{Action, Info, ObservationMessage, ResetOptions};
use crate::tool::ToolSchema;

/// Box-pushing puzzle.
pub struct SokobanEnv {
    config: SokobanConfig,
    tools: Vec<ToolSchema>,
    rng: StdRng,
    room: Option<Room>,
    solution: Vec<Command>,
    pending_setup: Option<RoomSetup>,
    num_steps: usize,
    boxes_on_target: usize,
    last_reward: f64,
    last_tool_call_id: Option<String>,
}

impl SokobanEnv {
    pub fn new(mut config: SokobanConfig) -> Result<Self> {
        config.validate()?;
        let pending_setup = config.room_setup.take();
        Ok(Self {
            config,
            tools: Command::ALL
                .into_iter()
                .map(|command| ToolSchema::without_arguments(command.tool_name(), describe(command)))
                .collect(),
            rng: StdRng::from_entropy(),
            room: None,
            solution: Vec::new(),
            pending_setup,
            num_steps: 0,
            boxes_on_target: 0,
            last_reward: 0.0,
            last_tool_call_id: None,
        })
    }

    /// Build from `create` kwargs.
    pub fn from_kwargs(kwargs: Option<Value>) -> Result<Self> {
        Self::new(decode_options(kwargs)?)
    }

    pub fn config(&self) -> &SokobanConfig {
        &self.config
    }

    /// The current room, once the environment has been reset.
    pub fn room(&self) -> Option<&Room> {
        self.room.as_ref()
    }

    /// Forward solution of the generated room. Empty for rooms loaded from a
    /// setup.
    pub fn solution(&self) -> &[Command] {
        &self.solution
    }

    /// Serialized form of the current room.
    pub fn serialize_room(&self) -> Option<RoomSetup> {
        self.room.as_ref().map(Room::to_setup)
    }

    pub fn steps_taken(&self) -> usize {
        self.num_steps
    }

    pub fn last_reward(&self) -> f64 {
        self.last_reward
    }

    fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            dims: self.config.dim_room,
            num_boxes: self.config.num_boxes,
            num_steps: self
                .config
                .num_gen_steps
                .unwrap_or_else(|| GenerationParams::default_steps(self.config.dim_room)),
            max_attempts: self.config.max_generation_attempts,
        }
    }

    fn observation(&self, room: &Room, error: Option<&str>) -> ObservationMessage {
        let player = room.player();
        let header = match self.last_tool_call_id {
            Some(_) => "After the action, the map of the world is:",
            None => "The current map of the world is:",
        };
        let body = format!(
            "{header} \n{}\n You are at position {},{} in the world.",
            room.render(),
            player.row,
            player.col
        );
        let content = with_error_prefix(error, &body);
        match &self.last_tool_call_id {
            Some(id) => ObservationMessage::tool(id.clone(), content),
            None => ObservationMessage::user(content),
        }
    }

    fn reward(&mut self, room: &Room) -> f64 {
        let rewards = self.config.rewards;
        let mut reward = rewards.step_penalty;
        let current = room.boxes_on_target();
        if current > self.boxes_on_target {
            reward += rewards.box_on_target * (current - self.boxes_on_target) as f64;
        } else if current < self.boxes_on_target {
            reward += rewards.box_off_target * (self.boxes_on_target - current) as f64;
        }
        // Completion pays once, on the step that places the last box.
        if self.boxes_on_target < room.num_boxes() && room.all_boxes_on_target() {
            reward += rewards.finished;
        }
        self.boxes_on_target = current;
        reward
    }

    fn reject(&self, room: &Room, call_id: &str, message: String) -> StepResult {
        warn!(error = %message, "Rejected sokoban action");
        let body = format!("The map of the world is unchanged: \n{}", room.render());
        StepResult::rejected(call_id, message, &body, Info::new())
    }
}

#[async_trait]
impl Environment for SokobanEnv {
    async fn reset(
        &mut self,
        seed: Option<u64>,
        options: Option<ResetOptions>,
    ) -> Result<ResetOutcome> {
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
        }

        let requested = options
            .as_ref()
            .and_then(|options| options.get("room_setup"))
            .filter(|setup| !setup.is_null())
            .map(|setup| serde_json::from_value::<RoomSetup>(setup.clone()))
            .transpose()
            .map_err(|e| EnvError::InvalidRoom(e.to_string()))?;

        let pending = self.pending_setup.take();
        let (room, solution) = match requested.or(pending) {
            Some(setup) => (
                setup.into_room(self.config.dim_room, self.config.num_boxes)?,
                Vec::new(),
            ),
            None => {
                let GeneratedRoom { room, solution } =
                    generate_room(&self.generation_params(), &mut self.rng)?;
                (room, solution)
            }
        };

        self.num_steps = 0;
        self.last_reward = 0.0;
        self.boxes_on_target = room.boxes_on_target();
        self.last_tool_call_id = None;
        self.solution = solution;

        let observation = vec![self.observation(&room, None)];
        self.room = Some(room);
        Ok(ResetOutcome {
            observation,
            info: Info::new(),
        })
    }

    async fn step(&mut self, action: &Action) -> Result<StepResult> {
        let mut room = self.room.take().ok_or(EnvError::NotReset)?;

        let (command, warning) = match select_single_call(action) {
            None => (None, None),
            Some((call, warning)) => match Command::from_tool_name(&call.function.name) {
                Some(command) => {
                    self.last_tool_call_id = Some(call.id.clone());
                    (Some(command), warning)
                }
                None => {
                    let message = format!(
                        "Unknown action '{}'. Available actions: {}",
                        call.function.name,
                        Command::ALL.map(Command::tool_name).join(", ")
                    );
                    let result = self.reject(&room, &call.id, message);
                    self.room = Some(room);
                    return Ok(result);
                }
            },
        };
        if command.is_none() {
            self.last_tool_call_id = None;
        }

        self.num_steps += 1;
        let outcome = command.map(|c| room.apply(c)).unwrap_or_default();
        let reward = self.reward(&room);
        self.last_reward = reward;

        let solved = room.all_boxes_on_target();
        let out_of_steps = self.num_steps >= self.config.max_steps;
        let done = solved || out_of_steps;

        let mut info = Info::new();
        info.insert(
            "action.name".into(),
            json!(command.map_or_else(|| "no_operation".to_string(), Command::tool_name)),
        );
        info.insert("action.moved_player".into(), json!(outcome.moved_player));
        info.insert("action.moved_box".into(), json!(outcome.moved_box));
        if done {
            info.insert("maxsteps_used".into(), json!(out_of_steps));
            info.insert("all_boxes_on_target".into(), json!(solved));
        }
        if let Some(warning) = &warning {
            info.insert("error".into(), json!(warning));
        }

        debug!(
            step = self.num_steps,
            ?command,
            moved_player = outcome.moved_player,
            moved_box = outcome.moved_box,
            reward,
            done,
            "Sokoban step"
        );

        let observation = vec![self.observation(&room, warning.as_deref())];
        self.room = Some(room);
        Ok(StepResult {
            observation,
            reward,
            done,
            truncated: false,
            info,
        })
    }

    fn task_prompt(&self) -> String {
        GUIDE.to_string()
    }

    fn action_schema(&self) -> Result<Vec<ToolSchema>> {
        Ok(self.tools.clone())
    }
}

fn describe(command: Command) -> String {
    let dir = command.direction();
    let axis = match dir {
        Direction::Up => "Up decreases the row index by 1",
        Direction::Down => "Down increases the row index by 1",
        Direction::Left => "Left decreases the column index by 1",
        Direction::Right => "Right increases the column index by 1",
    };
    match command {
        Command::Push(_) => format!(
            "Push the box {d}, if a box is adjacent to the player in the {d} direction and the field behind the box is empty (floor or target without a box). Nothing moves if that field is a wall or holds another box. Without an adjacent box the player simply moves {d}. {axis}.",
            d = dir.as_str()
        ),
        Command::Move(_) => format!(
            "Move the player {d}, if the field is empty (floor or target without a box). The player does not move into walls or boxes, and never pushes. {axis}.",
            d = dir.as_str()
        ),
    }
}

const GUIDE: &str = "
### Box-Pushing Puzzle

Move every box onto a target spot on the grid. Boxes can only be pushed, never pulled, so plan your route before you push.

#### Map symbols
- `_` floor: open space you can walk on and push boxes across
- `#` wall: blocks both you and boxes
- `O` target: a spot where a box must end up
- `X` box: push these onto targets
- `√` box on target: a box already placed
- `P` player: your position
- `S` player on target: you are standing on an empty target

Positions are given as `row,column`, counting from `0,0` in the top left corner. Moving up decreases the row, moving left decreases the column.

#### Actions
Call exactly one function per turn:
- `push_up`, `push_down`, `push_left`, `push_right`: push the adjacent box one field. Without a box in that direction you simply move.
- `move_up`, `move_down`, `move_left`, `move_right`: walk one field without pushing.

#### Rewards
- Every step costs 0.1.
- Each box pushed onto a target earns 1.0; pushing a box off a target costs 1.0.
- Placing the last box earns a further 10.0 and ends the puzzle.

#### Example map
 # \t # \t # \t # \t # \t # \t # \t
 # \t _ \t _ \t # \t # \t # \t # \t
 # \t _ \t # \t # \t # \t O \t # \t
 # \t _ \t _ \t _ \t O \t _ \t # \t
 # \t _ \t X \t X \t _ \t _ \t # \t
 # \t _ \t O \t _ \t X \t P \t # \t
 # \t # \t # \t # \t # \t # \t # \t

#### Tips
1. Never push a box into a corner that is not a target; it can never leave.
2. A box against a wall can only slide along that wall.
";
