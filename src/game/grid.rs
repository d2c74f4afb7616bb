//! Board geometry and placement of spawns and food

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan(&self, other: &Position) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

/// Heading of a snake, one cell per tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Accepts only the four unit vectors
    pub fn from_vector(x: i32, y: i32) -> Option<Self> {
        match (x, y) {
            (1, 0) => Some(Self::Right),
            (-1, 0) => Some(Self::Left),
            (0, 1) => Some(Self::Down),
            (0, -1) => Some(Self::Up),
            _ => None,
        }
    }

    pub fn vector(self) -> (i32, i32) {
        match self {
            Self::Right => (1, 0),
            Self::Left => (-1, 0),
            Self::Down => (0, 1),
            Self::Up => (0, -1),
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Right => Self::Left,
            Self::Left => Self::Right,
            Self::Down => Self::Up,
            Self::Up => Self::Down,
        }
    }
}

/// Toroidal board dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Board {
    pub width: i32,
    pub height: i32,
}

impl Board {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// One step from `pos`, wrapping around both edges
    pub fn wrap(&self, pos: Position, direction: Direction) -> Position {
        let (dx, dy) = direction.vector();
        Position {
            x: (pos.x + dx).rem_euclid(self.width),
            y: (pos.y + dy).rem_euclid(self.height),
        }
    }

    pub fn contains(&self, pos: Position) -> bool {
        (0..self.width).contains(&pos.x) && (0..self.height).contains(&pos.y)
    }

    pub fn random_position<R: Rng>(&self, rng: &mut R) -> Position {
        Position {
            x: rng.gen_range(0..self.width),
            y: rng.gen_range(0..self.height),
        }
    }
}

/// Result of a spawn search
#[derive(Debug, Clone)]
pub struct SpawnPlan {
    /// Head first, body trailing towards -x
    pub body: Vec<Position>,
    /// No safe placement was found and the body was dropped at random
    pub degraded: bool,
}

/// Read-only view of every cell currently taken on the board
pub struct Occupancy<'a> {
    bodies: Vec<&'a [Position]>,
    food: &'a [Position],
}

impl<'a> Occupancy<'a> {
    pub fn new(bodies: impl IntoIterator<Item = &'a [Position]>, food: &'a [Position]) -> Self {
        Self {
            bodies: bodies.into_iter().collect(),
            food,
        }
    }

    pub fn is_occupied(&self, pos: Position) -> bool {
        self.bodies.iter().any(|body| body.contains(&pos)) || self.food.contains(&pos)
    }

    /// Manhattan distance to the closest snake segment, `u32::MAX` on an empty board
    pub fn min_distance_to_snakes(&self, pos: Position) -> u32 {
        self.bodies
            .iter()
            .flat_map(|body| body.iter())
            .map(|segment| pos.manhattan(segment))
            .min()
            .unwrap_or(u32::MAX)
    }

    pub fn is_safe_spawn_position(&self, pos: Position, min_distance: u32) -> bool {
        !self.is_occupied(pos) && self.min_distance_to_snakes(pos) >= min_distance
    }

    /// Best effort: after `attempts` misses an arbitrary, possibly occupied,
    /// cell is returned.
    pub fn random_free_position<R: Rng>(&self, board: &Board, rng: &mut R, attempts: u32) -> Position {
        for _ in 0..attempts {
            let pos = board.random_position(rng);
            if !self.is_occupied(pos) {
                return pos;
            }
        }
        board.random_position(rng)
    }

    /// Search for a head position whose whole straight body stays on the
    /// board without wrapping and keeps `min_distance` from every snake.
    pub fn plan_spawn<R: Rng>(
        &self,
        board: &Board,
        rng: &mut R,
        length: usize,
        min_distance: u32,
        attempts: u32,
    ) -> SpawnPlan {
        for _ in 0..attempts {
            let head = board.random_position(rng);
            let body = straight_body(head, length);
            let valid = body.iter().all(|segment| {
                (0..board.width).contains(&segment.x)
                    && self.is_safe_spawn_position(*segment, min_distance)
            });
            if valid {
                return SpawnPlan {
                    body,
                    degraded: false,
                };
            }
        }

        let head = board.random_position(rng);
        let body = straight_body(head, length)
            .into_iter()
            .map(|segment| Position::new(segment.x.rem_euclid(board.width), segment.y))
            .collect();
        SpawnPlan {
            body,
            degraded: true,
        }
    }
}

fn straight_body(head: Position, length: usize) -> Vec<Position> {
    (0..length as i32)
        .map(|i| Position::new(head.x - i, head.y))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn wrap_crosses_every_edge() {
        let board = Board::new(48, 33);
        assert_eq!(board.wrap(Position::new(47, 5), Direction::Right), Position::new(0, 5));
        assert_eq!(board.wrap(Position::new(0, 5), Direction::Left), Position::new(47, 5));
        assert_eq!(board.wrap(Position::new(3, 32), Direction::Down), Position::new(3, 0));
        assert_eq!(board.wrap(Position::new(3, 0), Direction::Up), Position::new(3, 32));
    }

    #[test]
    fn wrapped_heads_stay_on_board() {
        let board = Board::new(7, 4);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let directions = [Direction::Up, Direction::Down, Direction::Left, Direction::Right];
        let mut pos = Position::new(0, 0);
        for i in 0..500 {
            let dir = directions[(i * 7 + rng.gen_range(0..4)) % 4];
            pos = board.wrap(pos, dir);
            assert!(board.contains(pos), "{:?} escaped the board", pos);
        }
    }

    #[test]
    fn only_unit_vectors_are_directions() {
        assert_eq!(Direction::from_vector(1, 0), Some(Direction::Right));
        assert_eq!(Direction::from_vector(0, -1), Some(Direction::Up));
        assert_eq!(Direction::from_vector(1, 1), None);
        assert_eq!(Direction::from_vector(2, 0), None);
        assert_eq!(Direction::from_vector(0, 0), None);
        assert_eq!(Direction::Left.opposite(), Direction::Right);
    }

    #[test]
    fn safe_spawn_respects_manhattan_distance() {
        let body = [Position::new(10, 10), Position::new(9, 10)];
        let food = [Position::new(20, 20)];
        let occupancy = Occupancy::new([&body[..]], &food);

        assert!(!occupancy.is_safe_spawn_position(Position::new(10, 10), 3));
        assert!(!occupancy.is_safe_spawn_position(Position::new(20, 20), 3));
        assert!(!occupancy.is_safe_spawn_position(Position::new(11, 11), 3));
        assert!(occupancy.is_safe_spawn_position(Position::new(12, 11), 3));
        assert_eq!(occupancy.min_distance_to_snakes(Position::new(9, 14)), 4);
    }

    #[test]
    fn empty_board_distance_is_unbounded() {
        let occupancy = Occupancy::new(std::iter::empty(), &[]);
        assert_eq!(occupancy.min_distance_to_snakes(Position::new(1, 1)), u32::MAX);
    }

    #[test]
    fn free_position_avoids_taken_cells() {
        let board = Board::new(3, 1);
        let body = [Position::new(0, 0), Position::new(1, 0)];
        let occupancy = Occupancy::new([&body[..]], &[]);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..20 {
            assert_eq!(
                occupancy.random_free_position(&board, &mut rng, 100),
                Position::new(2, 0)
            );
        }
    }

    #[test]
    fn free_position_falls_back_when_full() {
        let board = Board::new(2, 1);
        let food = [Position::new(0, 0), Position::new(1, 0)];
        let occupancy = Occupancy::new(std::iter::empty(), &food);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let pos = occupancy.random_free_position(&board, &mut rng, 100);
        assert!(board.contains(pos));
    }

    #[test]
    fn spawn_body_trails_left_without_wrapping() {
        let board = Board::new(48, 33);
        let occupancy = Occupancy::new(std::iter::empty(), &[]);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..50 {
            let plan = occupancy.plan_spawn(&board, &mut rng, 3, 3, 200);
            assert!(!plan.degraded);
            assert_eq!(plan.body.len(), 3);
            let head = plan.body[0];
            for (i, segment) in plan.body.iter().enumerate() {
                assert_eq!(*segment, Position::new(head.x - i as i32, head.y));
                assert!(board.contains(*segment));
            }
        }
    }

    #[test]
    fn spawn_degrades_on_a_crowded_board() {
        let board = Board::new(4, 1);
        let body = [Position::new(0, 0)];
        let occupancy = Occupancy::new([&body[..]], &[]);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let plan = occupancy.plan_spawn(&board, &mut rng, 3, 3, 200);
        assert!(plan.degraded);
        assert_eq!(plan.body.len(), 3);
        assert!(plan.body.iter().all(|p| board.contains(*p)));
    }
}
