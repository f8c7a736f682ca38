//! Frozen-lake grid world
//!
//! A square map of frozen cells and holes with the start in the top-left
//! corner and the goal in the bottom-right. Random maps always have a path
//! from start to goal. On a slippery lake the player moves in the intended
//! direction or either perpendicular one, each with probability 1/3.

use rand::Rng;

use crate::error::{EnvError, Result};

const MAX_MAP_DRAWS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LakeTile {
    Start,
    Frozen,
    Hole,
    Goal,
}

impl LakeTile {
    pub fn symbol(self) -> char {
        match self {
            LakeTile::Start => 'S',
            LakeTile::Frozen => 'F',
            LakeTile::Hole => 'H',
            LakeTile::Goal => 'G',
        }
    }
}

/// Movement, numbered so that `i - 1` and `i + 1` (mod 4) are the two
/// perpendicular directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LakeAction {
    Left = 0,
    Down = 1,
    Right = 2,
    Up = 3,
}

impl LakeAction {
    const ALL: [LakeAction; 4] = [
        LakeAction::Left,
        LakeAction::Down,
        LakeAction::Right,
        LakeAction::Up,
    ];

    pub fn from_tool_name(name: &str) -> Option<LakeAction> {
        match name {
            "move_left" => Some(LakeAction::Left),
            "move_down" => Some(LakeAction::Down),
            "move_right" => Some(LakeAction::Right),
            "move_up" => Some(LakeAction::Up),
            _ => None,
        }
    }

    fn rotated(self, by: usize) -> LakeAction {
        Self::ALL[(self as usize + by) % 4]
    }
}

/// Square lake map, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LakeMap {
    size: usize,
    tiles: Vec<LakeTile>,
}

impl LakeMap {
    /// Parse rows of `S`, `F`, `H`, `G`.
    pub fn from_rows(rows: &[&str]) -> Result<Self> {
        let size = rows.len();
        if size < 2 {
            return Err(EnvError::InvalidConfig(
                "lake map needs at least two rows".into(),
            ));
        }
        let mut tiles = Vec::with_capacity(size * size);
        for row in rows {
            if row.chars().count() != size {
                return Err(EnvError::InvalidConfig(format!(
                    "lake map must be square, got row '{row}'"
                )));
            }
            for ch in row.chars() {
                tiles.push(match ch {
                    'S' => LakeTile::Start,
                    'F' => LakeTile::Frozen,
                    'H' => LakeTile::Hole,
                    'G' => LakeTile::Goal,
                    other => {
                        return Err(EnvError::InvalidConfig(format!(
                            "unknown lake tile '{other}'"
                        )))
                    }
                });
            }
        }
        Ok(Self { size, tiles })
    }

    /// Draw random maps until one has a path from start to goal.
    pub fn generate<R: Rng>(size: usize, frozen_prob: f64, rng: &mut R) -> Result<Self> {
        for _ in 0..MAX_MAP_DRAWS {
            let mut tiles: Vec<LakeTile> = (0..size * size)
                .map(|_| {
                    if rng.gen_bool(frozen_prob) {
                        LakeTile::Frozen
                    } else {
                        LakeTile::Hole
                    }
                })
                .collect();
            tiles[0] = LakeTile::Start;
            tiles[size * size - 1] = LakeTile::Goal;
            let map = Self { size, tiles };
            if map.has_path() {
                return Ok(map);
            }
        }
        Err(EnvError::GenerationExhausted {
            attempts: MAX_MAP_DRAWS,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn tile(&self, row: usize, col: usize) -> LakeTile {
        self.tiles[row * self.size + col]
    }

    fn start(&self) -> (usize, usize) {
        let index = self
            .tiles
            .iter()
            .position(|t| *t == LakeTile::Start)
            .unwrap_or(0);
        (index / self.size, index % self.size)
    }

    /// Depth-first search from the start over non-hole cells.
    fn has_path(&self) -> bool {
        let mut seen = vec![false; self.tiles.len()];
        let mut frontier = vec![self.start()];
        while let Some((row, col)) = frontier.pop() {
            let index = row * self.size + col;
            if seen[index] {
                continue;
            }
            seen[index] = true;
            for action in LakeAction::ALL {
                let (r, c) = self.neighbour((row, col), action);
                match self.tile(r, c) {
                    LakeTile::Goal => return true,
                    LakeTile::Hole => {}
                    _ => frontier.push((r, c)),
                }
            }
        }
        false
    }

    /// The cell reached by moving; edges keep the player in place.
    fn neighbour(&self, (row, col): (usize, usize), action: LakeAction) -> (usize, usize) {
        let last = self.size - 1;
        match action {
            LakeAction::Left => (row, col.saturating_sub(1)),
            LakeAction::Down => ((row + 1).min(last), col),
            LakeAction::Right => (row, (col + 1).min(last)),
            LakeAction::Up => (row.saturating_sub(1), col),
        }
    }
}

/// Result of one move on the lake.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LakeStep {
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
    pub taken: LakeAction,
}

/// A lake with a player on it.
#[derive(Debug, Clone)]
pub struct Lake {
    map: LakeMap,
    position: (usize, usize),
    steps: usize,
    max_steps: usize,
    slippery: bool,
}

impl Lake {
    pub fn new(map: LakeMap, slippery: bool, max_steps: usize) -> Self {
        let position = map.start();
        Self {
            map,
            position,
            steps: 0,
            max_steps,
            slippery,
        }
    }

    pub fn map(&self) -> &LakeMap {
        &self.map
    }

    pub fn position(&self) -> (usize, usize) {
        self.position
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn step<R: Rng>(&mut self, action: LakeAction, rng: &mut R) -> LakeStep {
        let taken = if self.slippery {
            // One of: counter-clockwise neighbour, intended, clockwise neighbour.
            action.rotated([3, 0, 1][rng.gen_range(0..3)])
        } else {
            action
        };
        self.position = self.map.neighbour(self.position, taken);
        self.steps += 1;

        let tile = self.map.tile(self.position.0, self.position.1);
        let terminated = matches!(tile, LakeTile::Hole | LakeTile::Goal);
        LakeStep {
            reward: if tile == LakeTile::Goal { 1.0 } else { 0.0 },
            terminated,
            truncated: !terminated && self.steps >= self.max_steps,
            taken,
        }
    }

    /// Map rows with the start drawn as frozen and the player as `P`.
    pub fn render(&self) -> String {
        let size = self.map.size();
        (0..size)
            .map(|row| {
                (0..size)
                    .map(|col| {
                        if (row, col) == self.position {
                            'P'
                        } else {
                            match self.map.tile(row, col) {
                                LakeTile::Start => 'F',
                                tile => tile.symbol(),
                            }
                        }
                    })
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
