//! Room model and push/move physics
//!
//! A room is two layers of the same shape:
//! - the fixed layer (`Tile`): walls, floor and targets, never mutated during
//!   an episode
//! - the state layer (`Cell`): the fixed layer with boxes and the player drawn
//!   on top
//!
//! `RoomSetup` is the serialized form (integer codes plus a string-keyed box
//! mapping) used by evaluation datasets. Turning a setup back into a `Room`
//! re-validates every layer invariant.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::EnvError;

/// Errors raised while building or decoding a room.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("room has no cells")]
    Empty,

    #[error("{layer} layer is not rectangular: row {row} has {found} cells, expected {expected}")]
    Ragged {
        layer: &'static str,
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("{layer} layer is {found:?}, expected {expected:?}")]
    DimensionMismatch {
        layer: &'static str,
        found: (usize, usize),
        expected: (usize, usize),
    },

    #[error("unknown {layer} code {code} at ({row}, {col})")]
    UnknownCode {
        layer: &'static str,
        code: u8,
        row: usize,
        col: usize,
    },

    #[error("state cell {cell:?} at ({row}, {col}) does not fit fixed tile {tile:?}")]
    Inconsistent {
        row: usize,
        col: usize,
        tile: Tile,
        cell: Cell,
    },

    #[error("expected exactly one player, found {0}")]
    PlayerCount(usize),

    #[error("room has {boxes} boxes but {targets} targets")]
    BoxTargetMismatch { boxes: usize, targets: usize },

    #[error("room has {found} boxes, expected {expected}")]
    BoxCount { found: usize, expected: usize },

    #[error("box mapping has {found} entries, expected {expected}")]
    MappingSize { found: usize, expected: usize },

    #[error("malformed box mapping key '{0}'")]
    MappingKey(String),

    #[error("box mapping entry ({row}, {col}) is not a target")]
    MappingNotTarget { row: usize, col: usize },
}

impl From<RoomError> for EnvError {
    fn from(err: RoomError) -> Self {
        EnvError::InvalidRoom(err.to_string())
    }
}

/// Grid coordinate, row first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    pub fn manhattan(self, other: Position) -> usize {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// The four movement directions. Up decreases the row index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn delta(self) -> (isize, isize) {
        match self {
            Direction::Up => (-1, 0),
            Direction::Down => (1, 0),
            Direction::Left => (0, -1),
            Direction::Right => (0, 1),
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

/// One of the eight agent actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "direction", rename_all = "lowercase")]
pub enum Command {
    Push(Direction),
    Move(Direction),
}

impl Command {
    /// Push actions first, then moves, each in `Direction::ALL` order.
    pub const ALL: [Command; 8] = [
        Command::Push(Direction::Up),
        Command::Push(Direction::Down),
        Command::Push(Direction::Left),
        Command::Push(Direction::Right),
        Command::Move(Direction::Up),
        Command::Move(Direction::Down),
        Command::Move(Direction::Left),
        Command::Move(Direction::Right),
    ];

    pub fn direction(self) -> Direction {
        match self {
            Command::Push(dir) | Command::Move(dir) => dir,
        }
    }

    /// Tool name, e.g. `push_up`.
    pub fn tool_name(self) -> String {
        match self {
            Command::Push(dir) => format!("push_{}", dir.as_str()),
            Command::Move(dir) => format!("move_{}", dir.as_str()),
        }
    }

    pub fn from_tool_name(name: &str) -> Option<Command> {
        Command::ALL
            .into_iter()
            .find(|command| command.tool_name() == name)
    }
}

/// Fixed-layer tile. Codes: 0 wall, 1 floor, 2 target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tile {
    Wall,
    Floor,
    Target,
}

impl Tile {
    pub fn code(self) -> u8 {
        match self {
            Tile::Wall => 0,
            Tile::Floor => 1,
            Tile::Target => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Tile> {
        match code {
            0 => Some(Tile::Wall),
            1 => Some(Tile::Floor),
            2 => Some(Tile::Target),
            _ => None,
        }
    }

    /// The state cell shown when nothing stands on this tile.
    pub fn empty_cell(self) -> Cell {
        match self {
            Tile::Wall => Cell::Wall,
            Tile::Floor => Cell::Floor,
            Tile::Target => Cell::Target,
        }
    }

    /// The state cell of a box resting on this tile.
    pub fn box_cell(self) -> Cell {
        match self {
            Tile::Target => Cell::BoxOnTarget,
            _ => Cell::Box,
        }
    }
}

/// State-layer cell. Codes: 0 wall, 1 floor, 2 target, 3 box on target,
/// 4 box, 5 player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cell {
    Wall,
    Floor,
    Target,
    BoxOnTarget,
    Box,
    Player,
}

impl Cell {
    pub fn code(self) -> u8 {
        match self {
            Cell::Wall => 0,
            Cell::Floor => 1,
            Cell::Target => 2,
            Cell::BoxOnTarget => 3,
            Cell::Box => 4,
            Cell::Player => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Cell> {
        match code {
            0 => Some(Cell::Wall),
            1 => Some(Cell::Floor),
            2 => Some(Cell::Target),
            3 => Some(Cell::BoxOnTarget),
            4 => Some(Cell::Box),
            5 => Some(Cell::Player),
            _ => None,
        }
    }

    pub fn is_box(self) -> bool {
        matches!(self, Cell::Box | Cell::BoxOnTarget)
    }

    /// Floor or an unoccupied target.
    pub fn is_free(self) -> bool {
        matches!(self, Cell::Floor | Cell::Target)
    }
}

/// Dense row-major grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Grid<T> {
    height: usize,
    width: usize,
    cells: Vec<T>,
}

impl<T: Copy> Grid<T> {
    pub fn filled(height: usize, width: usize, value: T) -> Self {
        Self {
            height,
            width,
            cells: vec![value; height * width],
        }
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn get(&self, pos: Position) -> Option<T> {
        self.index(pos).map(|i| self.cells[i])
    }

    pub fn set(&mut self, pos: Position, value: T) {
        if let Some(i) = self.index(pos) {
            self.cells[i] = value;
        }
    }

    /// The neighbour of `pos` in `dir`, if it lies inside the grid.
    pub fn step(&self, pos: Position, dir: Direction) -> Option<Position> {
        let (dr, dc) = dir.delta();
        let row = pos.row.checked_add_signed(dr)?;
        let col = pos.col.checked_add_signed(dc)?;
        (row < self.height && col < self.width).then_some(Position::new(row, col))
    }

    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        (0..self.height).flat_map(move |row| (0..self.width).map(move |col| Position::new(row, col)))
    }

    pub fn rows(&self) -> impl Iterator<Item = &[T]> {
        self.cells.chunks(self.width.max(1))
    }

    pub fn count(&self, mut pred: impl FnMut(T) -> bool) -> usize {
        self.cells.iter().filter(|&&cell| pred(cell)).count()
    }

    fn index(&self, pos: Position) -> Option<usize> {
        (pos.row < self.height && pos.col < self.width).then(|| pos.row * self.width + pos.col)
    }
}

/// Result of a push or move attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveOutcome {
    pub moved_player: bool,
    pub moved_box: bool,
}

/// A room: fixed layer, state layer, box mapping and player position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    fixed: Grid<Tile>,
    state: Grid<Cell>,
    box_mapping: BTreeMap<Position, Position>,
    player: Position,
}

impl Room {
    /// Assemble a room from its layers, checking every invariant.
    pub fn from_layers(
        fixed: Grid<Tile>,
        state: Grid<Cell>,
        box_mapping: BTreeMap<Position, Position>,
    ) -> Result<Self, RoomError> {
        if fixed.dims().0 == 0 || fixed.dims().1 == 0 {
            return Err(RoomError::Empty);
        }
        if state.dims() != fixed.dims() {
            return Err(RoomError::DimensionMismatch {
                layer: "state",
                found: state.dims(),
                expected: fixed.dims(),
            });
        }

        let mut players = Vec::new();
        for pos in fixed.positions() {
            let (Some(tile), Some(cell)) = (fixed.get(pos), state.get(pos)) else {
                continue;
            };
            let fits = match cell {
                Cell::Wall => tile == Tile::Wall,
                Cell::Floor => tile == Tile::Floor,
                Cell::Target | Cell::BoxOnTarget => tile == Tile::Target,
                Cell::Box => tile == Tile::Floor,
                Cell::Player => tile != Tile::Wall,
            };
            if !fits {
                return Err(RoomError::Inconsistent {
                    row: pos.row,
                    col: pos.col,
                    tile,
                    cell,
                });
            }
            if cell == Cell::Player {
                players.push(pos);
            }
        }
        let player = match players.as_slice() {
            [only] => *only,
            _ => return Err(RoomError::PlayerCount(players.len())),
        };

        let boxes = state.count(Cell::is_box);
        let targets = fixed.count(|tile| tile == Tile::Target);
        if boxes != targets {
            return Err(RoomError::BoxTargetMismatch { boxes, targets });
        }
        if box_mapping.len() != boxes {
            return Err(RoomError::MappingSize {
                found: box_mapping.len(),
                expected: boxes,
            });
        }
        if let Some(target) = box_mapping
            .keys()
            .find(|target| fixed.get(**target) != Some(Tile::Target))
        {
            return Err(RoomError::MappingNotTarget {
                row: target.row,
                col: target.col,
            });
        }

        Ok(Self {
            fixed,
            state,
            box_mapping,
            player,
        })
    }

    pub fn dims(&self) -> (usize, usize) {
        self.fixed.dims()
    }

    pub fn fixed(&self) -> &Grid<Tile> {
        &self.fixed
    }

    pub fn state(&self) -> &Grid<Cell> {
        &self.state
    }

    /// Target cell to the cell its box started the episode in.
    pub fn box_mapping(&self) -> &BTreeMap<Position, Position> {
        &self.box_mapping
    }

    pub fn player(&self) -> Position {
        self.player
    }

    pub fn num_boxes(&self) -> usize {
        self.state.count(Cell::is_box)
    }

    pub fn boxes_on_target(&self) -> usize {
        self.state.count(|cell| cell == Cell::BoxOnTarget)
    }

    pub fn all_boxes_on_target(&self) -> bool {
        self.boxes_on_target() == self.num_boxes()
    }

    /// Apply one command. A push with no pushable box degrades to a move.
    pub fn apply(&mut self, command: Command) -> MoveOutcome {
        match command {
            Command::Push(dir) => self.push(dir),
            Command::Move(dir) => MoveOutcome {
                moved_player: self.move_player(dir),
                moved_box: false,
            },
        }
    }

    /// Move the player one cell if that cell is free.
    pub fn move_player(&mut self, dir: Direction) -> bool {
        let Some(next) = self.state.step(self.player, dir) else {
            return false;
        };
        if !self.state.get(next).is_some_and(Cell::is_free) {
            return false;
        }
        self.relocate_player(next);
        true
    }

    /// Push the adjacent box one cell, or fall back to a move.
    pub fn push(&mut self, dir: Direction) -> MoveOutcome {
        let Some(next) = self.state.step(self.player, dir) else {
            return MoveOutcome::default();
        };
        if !self.state.get(next).is_some_and(Cell::is_box) {
            return MoveOutcome {
                moved_player: self.move_player(dir),
                moved_box: false,
            };
        }
        // A box against a wall, another box or the grid edge stays put.
        let Some(beyond) = self
            .state
            .step(next, dir)
            .filter(|&pos| self.state.get(pos).is_some_and(Cell::is_free))
        else {
            return MoveOutcome::default();
        };

        self.relocate_player(next);
        if let Some(tile) = self.fixed.get(beyond) {
            self.state.set(beyond, tile.box_cell());
        }
        MoveOutcome {
            moved_player: true,
            moved_box: true,
        }
    }

    /// Inverse of a push or a move, used by the generator: step the player
    /// into a free cell and, when `pull` is set, drag the box behind it.
    ///
    /// Returns `None` when the player cannot move, otherwise the box
    /// movement `(from, to)` if a box was dragged.
    pub(crate) fn reverse_step(
        &mut self,
        dir: Direction,
        pull: bool,
    ) -> Option<Option<(Position, Position)>> {
        let origin = self.player;
        let next = self.state.step(origin, dir)?;
        if !self.state.get(next).is_some_and(Cell::is_free) {
            return None;
        }
        self.relocate_player(next);
        if !pull {
            return Some(None);
        }

        let behind = match self.state.step(origin, dir.opposite()) {
            Some(pos) if self.state.get(pos).is_some_and(Cell::is_box) => pos,
            _ => return Some(None),
        };
        if let (Some(behind_tile), Some(origin_tile)) =
            (self.fixed.get(behind), self.fixed.get(origin))
        {
            self.state.set(behind, behind_tile.empty_cell());
            self.state.set(origin, origin_tile.box_cell());
        }
        for start in self.box_mapping.values_mut() {
            if *start == behind {
                *start = origin;
            }
        }
        Some(Some((behind, origin)))
    }

    fn relocate_player(&mut self, to: Position) {
        if let Some(tile) = self.fixed.get(self.player) {
            self.state.set(self.player, tile.empty_cell());
        }
        self.state.set(to, Cell::Player);
        self.player = to;
    }

    /// Text rendering, one tab-separated symbol per cell.
    pub fn render(&self) -> String {
        let (height, width) = self.dims();
        let lines: Vec<String> = (0..height)
            .map(|row| {
                (0..width)
                    .map(|col| self.symbol(Position::new(row, col)))
                    .collect()
            })
            .collect();
        lines.join("\n").trim_end().to_string()
    }

    fn symbol(&self, pos: Position) -> &'static str {
        let on_target = self.fixed.get(pos) == Some(Tile::Target);
        match self.state.get(pos) {
            Some(Cell::Wall) | None => " # \t",
            Some(Cell::Floor) => " _ \t",
            Some(Cell::Target) => " O \t",
            Some(Cell::Box) => " X \t",
            Some(Cell::BoxOnTarget) => " √ \t",
            Some(Cell::Player) if on_target => " S \t",
            Some(Cell::Player) => " P \t",
        }
    }

    /// Serialized form with integer layer codes.
    pub fn to_setup(&self) -> RoomSetup {
        RoomSetup {
            room_fixed: self
                .fixed
                .rows()
                .map(|row| row.iter().map(|tile| tile.code()).collect())
                .collect(),
            room_state: self
                .state
                .rows()
                .map(|row| row.iter().map(|cell| cell.code()).collect())
                .collect(),
            box_mapping: self
                .box_mapping
                .iter()
                .map(|(target, start)| (target.to_string(), [start.row, start.col]))
                .collect(),
        }
    }
}

/// Serialized room as stored in evaluation datasets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSetup {
    pub room_fixed: Vec<Vec<u8>>,
    pub room_state: Vec<Vec<u8>>,
    /// `"(r, c)"` of a target to `[r, c]` of the cell its box starts in.
    pub box_mapping: BTreeMap<String, [usize; 2]>,
}

impl RoomSetup {
    /// Rebuild and validate a room, checking it against the configured shape
    /// and box count.
    pub fn into_room(self, dims: (usize, usize), num_boxes: usize) -> Result<Room, RoomError> {
        let fixed = decode_layer(&self.room_fixed, "fixed", dims, Tile::from_code)?;
        let state = decode_layer(&self.room_state, "state", dims, Cell::from_code)?;

        let found = state.count(Cell::is_box);
        if found != num_boxes {
            return Err(RoomError::BoxCount {
                found,
                expected: num_boxes,
            });
        }

        let mut mapping = BTreeMap::new();
        for (key, [row, col]) in self.box_mapping {
            let target = parse_position(&key).ok_or(RoomError::MappingKey(key))?;
            mapping.insert(target, Position::new(row, col));
        }
        Room::from_layers(fixed, state, mapping)
    }
}

fn decode_layer<T: Copy>(
    rows: &[Vec<u8>],
    layer: &'static str,
    dims: (usize, usize),
    decode: impl Fn(u8) -> Option<T>,
) -> Result<Grid<T>, RoomError> {
    let width = rows.first().map_or(0, Vec::len);
    if rows.is_empty() || width == 0 {
        return Err(RoomError::Empty);
    }
    if let Some((row, cells)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
        return Err(RoomError::Ragged {
            layer,
            row,
            found: cells.len(),
            expected: width,
        });
    }
    if (rows.len(), width) != dims {
        return Err(RoomError::DimensionMismatch {
            layer,
            found: (rows.len(), width),
            expected: dims,
        });
    }

    let mut cells = Vec::with_capacity(rows.len() * width);
    for (row, codes) in rows.iter().enumerate() {
        for (col, &code) in codes.iter().enumerate() {
            let value = decode(code).ok_or(RoomError::UnknownCode {
                layer,
                code,
                row,
                col,
            })?;
            cells.push(value);
        }
    }
    Ok(Grid {
        height: rows.len(),
        width,
        cells,
    })
}

fn parse_position(key: &str) -> Option<Position> {
    let inner = key.trim().strip_prefix('(')?.strip_suffix(')')?;
    let (row, col) = inner.split_once(',')?;
    Some(Position::new(row.trim().parse().ok()?, col.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // # # # # #
    // # P X O #
    // # _ _ _ #
    // # # # # #
    fn corridor() -> Room {
        RoomSetup {
            room_fixed: vec![
                vec![0, 0, 0, 0, 0],
                vec![0, 1, 1, 2, 0],
                vec![0, 1, 1, 1, 0],
                vec![0, 0, 0, 0, 0],
            ],
            room_state: vec![
                vec![0, 0, 0, 0, 0],
                vec![0, 5, 4, 2, 0],
                vec![0, 1, 1, 1, 0],
                vec![0, 0, 0, 0, 0],
            ],
            box_mapping: BTreeMap::from([("(1, 3)".to_string(), [1, 2])]),
        }
        .into_room((4, 5), 1)
        .unwrap()
    }

    #[test]
    fn push_moves_box_onto_target() {
        let mut room = corridor();
        let outcome = room.push(Direction::Right);
        assert_eq!(
            outcome,
            MoveOutcome {
                moved_player: true,
                moved_box: true
            }
        );
        assert_eq!(room.player(), Position::new(1, 2));
        assert_eq!(room.state().get(Position::new(1, 3)), Some(Cell::BoxOnTarget));
        assert!(room.all_boxes_on_target());
    }

    #[test]
    fn push_against_wall_changes_nothing() {
        let mut room = corridor();
        room.push(Direction::Right);
        let before = room.clone();
        let outcome = room.push(Direction::Right);
        assert_eq!(outcome, MoveOutcome::default());
        assert_eq!(room, before);
    }

    #[test]
    fn push_without_box_degrades_to_move() {
        let mut room = corridor();
        let outcome = room.push(Direction::Down);
        assert_eq!(
            outcome,
            MoveOutcome {
                moved_player: true,
                moved_box: false
            }
        );
        assert_eq!(room.player(), Position::new(2, 1));
    }

    #[test]
    fn push_toward_edge_floor_degrades_to_move() {
        // # # # #
        // # _ P _
        // # X O #
        // # # # #
        let mut room = RoomSetup {
            room_fixed: vec![
                vec![0, 0, 0, 0],
                vec![0, 1, 1, 1],
                vec![0, 1, 2, 0],
                vec![0, 0, 0, 0],
            ],
            room_state: vec![
                vec![0, 0, 0, 0],
                vec![0, 1, 5, 1],
                vec![0, 4, 2, 0],
                vec![0, 0, 0, 0],
            ],
            box_mapping: BTreeMap::from([("(2, 2)".to_string(), [2, 1])]),
        }
        .into_room((4, 4), 1)
        .unwrap();

        let outcome = room.push(Direction::Right);
        assert_eq!(
            outcome,
            MoveOutcome {
                moved_player: true,
                moved_box: false
            }
        );
        assert_eq!(room.player(), Position::new(1, 3));
    }

    #[test]
    fn push_into_another_box_changes_nothing() {
        // # # # # # #
        // # P X X O #
        // # _ _ _ O #
        // # # # # # #
        let mut room = RoomSetup {
            room_fixed: vec![
                vec![0, 0, 0, 0, 0, 0],
                vec![0, 1, 1, 1, 2, 0],
                vec![0, 1, 1, 1, 2, 0],
                vec![0, 0, 0, 0, 0, 0],
            ],
            room_state: vec![
                vec![0, 0, 0, 0, 0, 0],
                vec![0, 5, 4, 4, 2, 0],
                vec![0, 1, 1, 1, 2, 0],
                vec![0, 0, 0, 0, 0, 0],
            ],
            box_mapping: BTreeMap::from([
                ("(1, 4)".to_string(), [1, 2]),
                ("(2, 4)".to_string(), [1, 3]),
            ]),
        }
        .into_room((4, 6), 2)
        .unwrap();
        let before = room.clone();

        assert_eq!(room.push(Direction::Right), MoveOutcome::default());
        assert_eq!(room.player(), Position::new(1, 1));
        assert_eq!(room, before);
    }

    #[test]
    fn move_never_pushes() {
        let mut room = corridor();
        assert!(!room.move_player(Direction::Right));
        assert_eq!(room.player(), Position::new(1, 1));
        assert!(!room.move_player(Direction::Up));
    }

    #[test]
    fn reverse_pull_drags_box_and_updates_mapping() {
        let mut room = corridor();
        room.push(Direction::Right);
        // Player at (1, 2), box on (1, 3). Pull it back to the left.
        let moved = room.reverse_step(Direction::Left, true);
        assert_eq!(moved, Some(Some((Position::new(1, 3), Position::new(1, 2)))));
        assert_eq!(room.player(), Position::new(1, 1));
        assert_eq!(room.box_mapping()[&Position::new(1, 3)], Position::new(1, 2));
    }

    #[test]
    fn render_uses_cell_symbols() {
        let room = corridor();
        let rendered = room.render();
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], " # \t P \t X \t O \t # \t");
    }

    #[test]
    fn render_shows_player_on_target() {
        let mut room = corridor();
        room.move_player(Direction::Down);
        room.move_player(Direction::Right);
        room.move_player(Direction::Right);
        room.move_player(Direction::Up);
        assert_eq!(room.player(), Position::new(1, 3));
        assert!(room.render().contains(" S \t"));
    }

    #[test]
    fn setup_round_trip_is_identical() {
        let room = corridor();
        let setup = room.to_setup();
        assert_eq!(setup.box_mapping["(1, 3)"], [1, 2]);
        let json = serde_json::to_string(&setup).unwrap();
        let decoded: RoomSetup = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.into_room((4, 5), 1).unwrap(), room);
    }

    #[test]
    fn setup_validation_fails_loudly() {
        let setup = corridor().to_setup();
        assert!(matches!(
            setup.clone().into_room((5, 5), 1),
            Err(RoomError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            setup.clone().into_room((4, 5), 2),
            Err(RoomError::BoxCount { found: 1, expected: 2 })
        ));

        let mut two_players = setup.clone();
        two_players.room_state[2][1] = 5;
        assert_eq!(
            two_players.into_room((4, 5), 1),
            Err(RoomError::PlayerCount(2))
        );

        let mut bad_key = setup.clone();
        bad_key.box_mapping = BTreeMap::from([("1-3".to_string(), [1, 2])]);
        assert!(matches!(
            bad_key.into_room((4, 5), 1),
            Err(RoomError::MappingKey(_))
        ));

        let mut box_in_wall = setup;
        box_in_wall.room_state[0][0] = 4;
        box_in_wall.room_state[1][2] = 1;
        assert!(matches!(
            box_in_wall.into_room((4, 5), 1),
            Err(RoomError::Inconsistent { .. })
        ));
    }
}
