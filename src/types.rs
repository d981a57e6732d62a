use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Ordered list of real-valued controller parameters.
pub type Genes = Vec<f64>;

/// Action chosen by a controller for one move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    None,
    Left,
    Right,
    Forward,
}

impl Action {
    /// Maps a controller output index (0 none, 1 left, 2 right, 3 forward).
    pub fn from_index(index: usize) -> Self {
        match index {
            1 => Action::Left,
            2 => Action::Right,
            3 => Action::Forward,
            _ => Action::None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Action::None => 0,
            Action::Left => 1,
            Action::Right => 2,
            Action::Forward => 3,
        }
    }
}

/// Count of each action type taken during one trail run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveStats {
    pub left: u32,
    pub right: u32,
    pub forward: u32,
    pub none: u32,
}

impl MoveStats {
    pub fn record(&mut self, action: Action) {
        match action {
            Action::Left => self.left += 1,
            Action::Right => self.right += 1,
            Action::Forward => self.forward += 1,
            Action::None => self.none += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.left + self.right + self.forward + self.none
    }
}

/// Objective tuple assigned after evaluation.
///
/// Ordering is lexicographic on weighted objectives: more food is better, and
/// among equal food fewer moves is better. `a > b` means `a` is the fitter one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fitness {
    pub food: u32,
    pub moves: u32,
}

impl Fitness {
    pub fn new(food: u32, moves: u32) -> Self {
        Self { food, moves }
    }

    /// Objectives as floats, in (food, moves) order.
    pub fn objectives(&self) -> [f64; 2] {
        [self.food as f64, self.moves as f64]
    }
}

impl Ord for Fitness {
    fn cmp(&self, other: &Self) -> Ordering {
        self.food
            .cmp(&other.food)
            .then_with(|| other.moves.cmp(&self.moves))
    }
}

impl PartialOrd for Fitness {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Fitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "food={} moves={}", self.food, self.moves)
    }
}

/// A gene vector plus its fitness. `fitness == None` means invalid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    pub genes: Genes,
    pub fitness: Option<Fitness>,
}

impl Individual {
    pub fn new(genes: Genes) -> Self {
        Self {
            genes,
            fitness: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.fitness.is_some()
    }

    pub fn invalidate(&mut self) {
        self.fitness = None;
    }
}
