//! Battlefield grid
//!
//! Fixed-size grid of cells, each with a terrain kind and an optional
//! obstacle. Storage is row-major `cells[y][x]`; on the wire the grid keeps
//! the column-major `terrain[x][y]` / `objects[x][y]` string layout clients
//! already consume.

use std::collections::HashSet;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Feet represented by one grid cell
pub const FEET_PER_CELL: i32 = 5;

/// Default battlefield dimensions
pub const DEFAULT_WIDTH: i32 = 10;
pub const DEFAULT_HEIGHT: i32 = 10;

/// A grid coordinate; serialized as `[x, y]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    /// Sentinel for combatants removed from play
    pub const OFF_GRID: Position = Position { x: -1, y: -1 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Whether this is the removed-from-play sentinel
    pub fn is_off_grid(&self) -> bool {
        *self == Self::OFF_GRID
    }

    /// Manhattan distance in cells
    pub fn manhattan(&self, other: Position) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    /// Chebyshev (king-move) distance in cells
    pub fn chebyshev(&self, other: Position) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

impl From<[i32; 2]> for Position {
    fn from([x, y]: [i32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Position> for [i32; 2] {
    fn from(pos: Position) -> Self {
        [pos.x, pos.y]
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{}]", self.x, self.y)
    }
}

/// Ground type of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Terrain {
    #[default]
    Normal,
    Difficult,
    Water,
    Trap,
}

impl FromStr for Terrain {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(Terrain::Normal),
            "difficult" => Ok(Terrain::Difficult),
            "water" => Ok(Terrain::Water),
            "trap" => Ok(Terrain::Trap),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Terrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Terrain::Normal => "normal",
            Terrain::Difficult => "difficult",
            Terrain::Water => "water",
            Terrain::Trap => "trap",
        };
        write!(f, "{}", s)
    }
}

/// Object standing in a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Obstacle {
    #[default]
    None,
    Wall,
    Tree,
    Rock,
}

impl Obstacle {
    /// Whether this obstacle stops movement
    pub fn blocks_movement(&self) -> bool {
        matches!(self, Obstacle::Wall | Obstacle::Tree | Obstacle::Rock)
    }
}

impl FromStr for Obstacle {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "" => Ok(Obstacle::None),
            "wall" => Ok(Obstacle::Wall),
            "tree" => Ok(Obstacle::Tree),
            "rock" => Ok(Obstacle::Rock),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Obstacle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Obstacle::None => "none",
            Obstacle::Wall => "wall",
            Obstacle::Tree => "tree",
            Obstacle::Rock => "rock",
        };
        write!(f, "{}", s)
    }
}

/// One grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cell {
    pub terrain: Terrain,
    pub obstacle: Obstacle,
}

/// Why a movement path was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("movement requires a path")]
    Empty,
    #[error("movement path exceeds speed (max: {max} squares)")]
    TooLong { max: usize },
    #[error("movement path goes out of bounds at {0}")]
    OutOfBounds(Position),
    #[error("movement path is blocked by an obstacle at {0}")]
    Blocked(Position),
    #[error("movement path is blocked by another combatant at {0}")]
    Occupied(Position),
    #[error("invalid movement: can only move to adjacent squares ({from} -> {to})")]
    NotAdjacent { from: Position, to: Position },
    #[error("invalid movement: diagonal step {from} -> {to} cuts a blocked corner")]
    CornerBlocked { from: Position, to: Position },
}

/// The combat battlefield
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Battlefield {
    width: i32,
    height: i32,
    cells: Vec<Vec<Cell>>,
}

impl Battlefield {
    /// Create an open battlefield of the given size
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            cells: vec![vec![Cell::default(); width as usize]; height as usize],
        }
    }

    /// Build the standard battlefield for an environment tag
    pub fn for_environment(environment: &str) -> Self {
        let mut field = Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT);

        match environment {
            "forest" => {
                for (x, y) in [(1, 1), (3, 4), (6, 7), (8, 2)] {
                    field.set_obstacle(Position::new(x, y), Obstacle::Tree);
                }
                for (x, y) in [(2, 2), (2, 3), (3, 2), (3, 3)] {
                    field.set_terrain(Position::new(x, y), Terrain::Difficult);
                }
            }
            "dungeon" => {
                for x in 0..=3 {
                    field.set_obstacle(Position::new(x, 5), Obstacle::Wall);
                }
                field.set_terrain(Position::new(5, 5), Terrain::Trap);
            }
            "cave" => {
                field.set_obstacle(Position::new(2, 3), Obstacle::Rock);
                field.set_obstacle(Position::new(7, 6), Obstacle::Rock);
                for (x, y) in [(4, 4), (4, 5), (5, 4), (5, 5)] {
                    field.set_terrain(Position::new(x, y), Terrain::Water);
                }
            }
            _ => {}
        }

        field
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.x < self.width && pos.y >= 0 && pos.y < self.height
    }

    /// Get a cell, or None when out of bounds
    pub fn cell(&self, pos: Position) -> Option<&Cell> {
        if !self.in_bounds(pos) {
            return None;
        }
        Some(&self.cells[pos.y as usize][pos.x as usize])
    }

    fn cell_mut(&mut self, pos: Position) -> Option<&mut Cell> {
        if !self.in_bounds(pos) {
            return None;
        }
        Some(&mut self.cells[pos.y as usize][pos.x as usize])
    }

    pub fn terrain(&self, pos: Position) -> Option<Terrain> {
        self.cell(pos).map(|c| c.terrain)
    }

    pub fn obstacle(&self, pos: Position) -> Option<Obstacle> {
        self.cell(pos).map(|c| c.obstacle)
    }

    /// Set terrain; out-of-bounds positions are ignored
    pub fn set_terrain(&mut self, pos: Position, terrain: Terrain) {
        if let Some(cell) = self.cell_mut(pos) {
            cell.terrain = terrain;
        }
    }

    /// Set an obstacle; out-of-bounds positions are ignored
    pub fn set_obstacle(&mut self, pos: Position, obstacle: Obstacle) {
        if let Some(cell) = self.cell_mut(pos) {
            cell.obstacle = obstacle;
        }
    }

    /// True if an in-bounds cell holds a movement-blocking obstacle
    pub fn is_blocked(&self, pos: Position) -> bool {
        self.cell(pos)
            .is_some_and(|c| c.obstacle.blocks_movement())
    }

    /// Manhattan distance in cells, used for range checks
    pub fn distance(&self, a: Position, b: Position) -> i32 {
        a.manhattan(b)
    }

    /// Validate a movement path starting from `start`.
    ///
    /// Every step must be a king move onto an in-bounds, unblocked cell not
    /// held by anyone in `occupied`, and the path may not exceed
    /// `speed / FEET_PER_CELL` cells.
    pub fn validate_path(
        &self,
        start: Position,
        path: &[Position],
        speed: i32,
        occupied: &HashSet<Position>,
    ) -> Result<(), PathError> {
        if path.is_empty() {
            return Err(PathError::Empty);
        }

        let max = (speed.max(0) / FEET_PER_CELL) as usize;
        if path.len() > max {
            return Err(PathError::TooLong { max });
        }

        let mut current = start;
        for &pos in path {
            if !self.in_bounds(pos) {
                return Err(PathError::OutOfBounds(pos));
            }
            if self.is_blocked(pos) {
                return Err(PathError::Blocked(pos));
            }
            if occupied.contains(&pos) {
                return Err(PathError::Occupied(pos));
            }
            if current.chebyshev(pos) != 1 {
                return Err(PathError::NotAdjacent {
                    from: current,
                    to: pos,
                });
            }
            if current.x != pos.x
                && current.y != pos.y
                && (self.is_blocked(Position::new(pos.x, current.y))
                    || self.is_blocked(Position::new(current.x, pos.y)))
            {
                return Err(PathError::CornerBlocked {
                    from: current,
                    to: pos,
                });
            }
            current = pos;
        }

        Ok(())
    }
}

impl Default for Battlefield {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

/// Wire shape: `terrain[x][y]` and `objects[x][y]` string grids
#[derive(Serialize, Deserialize)]
struct BattlefieldWire {
    width: i32,
    height: i32,
    terrain: Vec<Vec<String>>,
    objects: Vec<Vec<String>>,
}

impl Serialize for Battlefield {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut terrain: Vec<Vec<String>> = Vec::with_capacity(self.width as usize);
        let mut objects: Vec<Vec<String>> = Vec::with_capacity(self.width as usize);
        for x in 0..self.width as usize {
            terrain.push(self.cells.iter().map(|row| row[x].terrain.to_string()).collect());
            objects.push(self.cells.iter().map(|row| row[x].obstacle.to_string()).collect());
        }

        let wire = BattlefieldWire {
            width: self.width,
            height: self.height,
            terrain,
            objects,
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Battlefield {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = BattlefieldWire::deserialize(deserializer)?;
        if wire.width <= 0 || wire.height <= 0 {
            return Err(D::Error::custom("battlefield dimensions must be positive"));
        }

        let mut field = Battlefield::new(wire.width, wire.height);
        for (x, column) in wire.terrain.iter().enumerate() {
            for (y, tag) in column.iter().enumerate() {
                let terrain = tag
                    .parse()
                    .map_err(|_| D::Error::custom(format!("unknown terrain: {}", tag)))?;
                field.set_terrain(Position::new(x as i32, y as i32), terrain);
            }
        }
        for (x, column) in wire.objects.iter().enumerate() {
            for (y, tag) in column.iter().enumerate() {
                let obstacle = tag
                    .parse()
                    .map_err(|_| D::Error::custom(format!("unknown object: {}", tag)))?;
                field.set_obstacle(Position::new(x as i32, y as i32), obstacle);
            }
        }
        Ok(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(cells: &[(i32, i32)]) -> Vec<Position> {
        cells.iter().map(|&(x, y)| Position::new(x, y)).collect()
    }

    #[test]
    fn test_bounds_and_blocking() {
        let field = Battlefield::for_environment("dungeon");
        assert!(field.in_bounds(Position::new(0, 0)));
        assert!(field.in_bounds(Position::new(9, 9)));
        assert!(!field.in_bounds(Position::new(10, 0)));
        assert!(!field.in_bounds(Position::new(0, -1)));

        assert!(field.is_blocked(Position::new(2, 5)));
        assert!(!field.is_blocked(Position::new(4, 5)));
        // Traps are terrain, not obstacles
        assert!(!field.is_blocked(Position::new(5, 5)));
        assert_eq!(field.terrain(Position::new(5, 5)), Some(Terrain::Trap));
        // Out of bounds is not "blocked"
        assert!(!field.is_blocked(Position::new(-1, -1)));
    }

    #[test]
    fn test_environment_presets() {
        let forest = Battlefield::for_environment("forest");
        assert_eq!(forest.obstacle(Position::new(3, 4)), Some(Obstacle::Tree));
        assert_eq!(forest.terrain(Position::new(2, 3)), Some(Terrain::Difficult));

        let cave = Battlefield::for_environment("cave");
        assert_eq!(cave.obstacle(Position::new(7, 6)), Some(Obstacle::Rock));
        assert_eq!(cave.terrain(Position::new(4, 5)), Some(Terrain::Water));

        let plains = Battlefield::for_environment("plains");
        assert_eq!(plains, Battlefield::default());
    }

    #[test]
    fn test_distance_is_manhattan() {
        let field = Battlefield::default();
        assert_eq!(field.distance(Position::new(0, 0), Position::new(3, 4)), 7);
        assert_eq!(field.distance(Position::new(2, 2), Position::new(3, 3)), 2);
    }

    #[test]
    fn test_valid_path_with_diagonal() {
        let field = Battlefield::default();
        let occupied = HashSet::new();
        let steps = path(&[(3, 2), (4, 3), (4, 4)]);
        assert_eq!(
            field.validate_path(Position::new(2, 2), &steps, 30, &occupied),
            Ok(())
        );
    }

    #[test]
    fn test_path_rejections() {
        let field = Battlefield::for_environment("forest");
        let mut occupied = HashSet::new();
        occupied.insert(Position::new(5, 5));
        let start = Position::new(4, 4);

        assert_eq!(
            field.validate_path(start, &[], 30, &occupied),
            Err(PathError::Empty)
        );
        assert_eq!(
            field.validate_path(start, &path(&[(4, 6)]), 30, &occupied),
            Err(PathError::NotAdjacent {
                from: start,
                to: Position::new(4, 6)
            })
        );
        assert_eq!(
            field.validate_path(start, &path(&[(4, 4)]), 30, &occupied),
            Err(PathError::NotAdjacent { from: start, to: start })
        );
        assert_eq!(
            field.validate_path(start, &path(&[(3, 4)]), 30, &occupied),
            Err(PathError::Blocked(Position::new(3, 4)))
        );
        assert_eq!(
            field.validate_path(start, &path(&[(5, 5)]), 30, &occupied),
            Err(PathError::Occupied(Position::new(5, 5)))
        );

        let edge = Position::new(9, 0);
        assert_eq!(
            field.validate_path(edge, &path(&[(10, 0)]), 30, &occupied),
            Err(PathError::OutOfBounds(Position::new(10, 0)))
        );
    }

    #[test]
    fn test_diagonal_cannot_cut_corners() {
        let mut field = Battlefield::default();
        field.set_obstacle(Position::new(1, 0), Obstacle::Wall);
        field.set_obstacle(Position::new(0, 1), Obstacle::Wall);
        let occupied = HashSet::new();
        let origin = Position::new(0, 0);

        assert_eq!(
            field.validate_path(origin, &path(&[(1, 1)]), 30, &occupied),
            Err(PathError::CornerBlocked {
                from: origin,
                to: Position::new(1, 1)
            })
        );

        // A single wall on either side is enough
        field.set_obstacle(Position::new(0, 1), Obstacle::None);
        assert!(field
            .validate_path(origin, &path(&[(1, 1)]), 30, &occupied)
            .is_err());

        // Orthogonal steps around the wall are fine
        assert_eq!(
            field.validate_path(origin, &path(&[(0, 1), (1, 1)]), 30, &occupied),
            Ok(())
        );
    }

    #[test]
    fn test_path_length_limit() {
        let field = Battlefield::default();
        let occupied = HashSet::new();
        let steps = path(&[(1, 0), (2, 0), (3, 0)]);

        // 15 ft = 3 squares
        assert!(field
            .validate_path(Position::new(0, 0), &steps, 15, &occupied)
            .is_ok());
        assert_eq!(
            field.validate_path(Position::new(0, 0), &steps, 14, &occupied),
            Err(PathError::TooLong { max: 2 })
        );
    }

    #[test]
    fn test_wire_layout() {
        let mut field = Battlefield::new(3, 2);
        field.set_obstacle(Position::new(2, 1), Obstacle::Wall);
        field.set_terrain(Position::new(0, 1), Terrain::Water);

        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(json["width"], 3);
        assert_eq!(json["objects"][2][1], "wall");
        assert_eq!(json["terrain"][0][1], "water");
        assert_eq!(json["terrain"][1][0], "normal");

        let back: Battlefield = serde_json::from_value(json).unwrap();
        assert_eq!(back, field);
    }

    #[test]
    fn test_position_serializes_as_pair() {
        let json = serde_json::to_string(&Position::new(3, 7)).unwrap();
        assert_eq!(json, "[3,7]");
        let pos: Position = serde_json::from_str("[-1,-1]").unwrap();
        assert!(pos.is_off_grid());
    }
}
