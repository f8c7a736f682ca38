//! Solvable room generation by reverse play
//!
//! Implementation strategy
//! - Carve a topology with a random walk that stamps 3x3 floor masks
//! - Drop the player and one target per box on random floor cells, with every
//!   box already on its target (the solved configuration)
//! - Apply random reverse actions (pulls and plain moves). Every reverse
//!   action undoes a legal forward push or move, so the scrambled room can
//!   always be solved by replaying the inverse sequence forward
//! - Keep the most scrambled state seen along the walk, scored as
//!   `box_swaps * sum(manhattan(target, box))`
//!
//! Degenerate attempts (too little floor, nothing scrambled) are discarded and
//! retried, up to `max_attempts` times.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use super::room::{Cell, Command, Direction, Grid, Position, Room, Tile};
use crate::error::{EnvError, Result};

const MASKS: [[[u8; 3]; 3]; 5] = [
    [[0, 0, 0], [1, 1, 1], [0, 0, 0]],
    [[0, 1, 0], [0, 1, 0], [0, 1, 0]],
    [[0, 0, 0], [1, 1, 0], [0, 1, 0]],
    [[0, 0, 0], [1, 1, 0], [1, 1, 0]],
    [[0, 0, 0], [0, 1, 1], [0, 1, 0]],
];

const DIRECTION_CHANGE_PROBABILITY: f64 = 0.35;

/// Inputs to one generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationParams {
    pub dims: (usize, usize),
    pub num_boxes: usize,
    pub num_steps: usize,
    pub max_attempts: usize,
}

impl GenerationParams {
    /// Default walk length: `1.7 * (height + width)`.
    pub fn default_steps(dims: (usize, usize)) -> usize {
        (1.7 * (dims.0 + dims.1) as f64) as usize
    }
}

/// A generated room and a forward action sequence that solves it.
#[derive(Debug, Clone)]
pub struct GeneratedRoom {
    pub room: Room,
    pub solution: Vec<Command>,
}

/// Why a single attempt was thrown away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Degenerate {
    NotEnoughFloor { floor: usize },
    Unscrambled,
}

/// Generate a solvable room, retrying degenerate attempts.
pub fn generate_room<R: Rng>(params: &GenerationParams, rng: &mut R) -> Result<GeneratedRoom> {
    let (height, width) = params.dims;
    if height < 3 || width < 3 {
        return Err(EnvError::InvalidConfig(format!(
            "room must be at least 3x3, got {height}x{width}"
        )));
    }
    if params.num_boxes == 0 {
        return Err(EnvError::InvalidConfig(
            "room needs at least one box".to_string(),
        ));
    }

    for attempt in 1..=params.max_attempts {
        match try_generate(params, rng) {
            Ok(generated) => {
                debug!(
                    attempt,
                    solution_len = generated.solution.len(),
                    "Generated room"
                );
                return Ok(generated);
            }
            Err(reason) => {
                warn!(attempt, ?reason, "Discarding degenerate room, retrying");
            }
        }
    }
    Err(EnvError::GenerationExhausted {
        attempts: params.max_attempts,
    })
}

fn try_generate<R: Rng>(
    params: &GenerationParams,
    rng: &mut R,
) -> std::result::Result<GeneratedRoom, Degenerate> {
    let topology = carve_topology(params.dims, params.num_steps, rng);
    let solved = place_solved(&topology, params.num_boxes, rng)?;
    reverse_play(solved, params.num_steps, rng)
}

fn carve_topology<R: Rng>(dims: (usize, usize), num_steps: usize, rng: &mut R) -> Grid<Tile> {
    let (height, width) = dims;
    let mut grid = Grid::filled(height, width, Tile::Wall);

    let mut row = rng.gen_range(1..height - 1);
    let mut col = rng.gen_range(1..width - 1);
    let mut dir = *Direction::ALL.choose(rng).unwrap_or(&Direction::Up);

    for _ in 0..num_steps {
        if rng.gen::<f64>() < DIRECTION_CHANGE_PROBABILITY {
            dir = *Direction::ALL.choose(rng).unwrap_or(&dir);
        }
        let (dr, dc) = dir.delta();
        row = row.saturating_add_signed(dr).clamp(1, height - 2);
        col = col.saturating_add_signed(dc).clamp(1, width - 2);

        let mask = MASKS.choose(rng).unwrap_or(&MASKS[0]);
        for (mr, mask_row) in mask.iter().enumerate() {
            for (mc, &open) in mask_row.iter().enumerate() {
                if open == 1 {
                    grid.set(Position::new(row + mr - 1, col + mc - 1), Tile::Floor);
                }
            }
        }
    }

    for pos in grid.positions().collect::<Vec<_>>() {
        if pos.row == 0 || pos.col == 0 || pos.row == height - 1 || pos.col == width - 1 {
            grid.set(pos, Tile::Wall);
        }
    }
    grid
}

fn place_solved<R: Rng>(
    topology: &Grid<Tile>,
    num_boxes: usize,
    rng: &mut R,
) -> std::result::Result<Room, Degenerate> {
    let floor: Vec<Position> = topology
        .positions()
        .filter(|pos| topology.get(*pos) == Some(Tile::Floor))
        .collect();
    if floor.len() <= num_boxes + 1 {
        return Err(Degenerate::NotEnoughFloor { floor: floor.len() });
    }

    let picked: Vec<Position> = floor.choose_multiple(rng, num_boxes + 1).copied().collect();
    let (player, targets) = picked.split_at(1);

    let mut fixed = topology.clone();
    let (height, width) = topology.dims();
    let mut state = Grid::filled(height, width, Cell::Wall);
    for pos in topology.positions() {
        if let Some(tile) = topology.get(pos) {
            state.set(pos, tile.empty_cell());
        }
    }
    for &target in targets {
        fixed.set(target, Tile::Target);
        state.set(target, Cell::BoxOnTarget);
    }
    state.set(player[0], Cell::Player);

    let mapping: BTreeMap<Position, Position> = targets.iter().map(|&t| (t, t)).collect();
    Room::from_layers(fixed, state, mapping).map_err(|_| Degenerate::Unscrambled)
}

fn score(room: &Room, box_swaps: usize) -> usize {
    let distance: usize = room
        .box_mapping()
        .iter()
        .map(|(target, start)| target.manhattan(*start))
        .sum();
    box_swaps * distance
}

fn reverse_play<R: Rng>(
    mut room: Room,
    num_steps: usize,
    rng: &mut R,
) -> std::result::Result<GeneratedRoom, Degenerate> {
    let mut best: Option<(usize, Room, usize)> = None;
    let mut forward: Vec<Command> = Vec::with_capacity(num_steps);
    let mut box_swaps = 0;
    let mut last_pulled: Option<Position> = None;

    for _ in 0..num_steps {
        let dir = *Direction::ALL.choose(rng).unwrap_or(&Direction::Up);
        let pull = rng.gen_bool(0.5);

        let Some(dragged) = room.reverse_step(dir, pull) else {
            continue;
        };
        match dragged {
            Some((from, to)) => {
                if last_pulled != Some(from) {
                    box_swaps += 1;
                }
                last_pulled = Some(to);
                forward.push(Command::Push(dir.opposite()));
            }
            None => forward.push(Command::Move(dir.opposite())),
        }

        let current = score(&room, box_swaps);
        if current > best.as_ref().map_or(0, |(s, _, _)| *s) {
            best = Some((current, room.clone(), forward.len()));
        }
    }

    let (_, room, taken) = best.ok_or(Degenerate::Unscrambled)?;
    if room.all_boxes_on_target() {
        return Err(Degenerate::Unscrambled);
    }

    let mut solution: Vec<Command> = forward[..taken].iter().rev().copied().collect();
    // Trailing moves only walk the player away from the solved position.
    while matches!(solution.last(), Some(Command::Move(_))) {
        solution.pop();
    }
    Ok(GeneratedRoom { room, solution })
}
