//! Toroidal grid trail with food cells.
//!
//! A [`TrailBlueprint`] is the immutable description of a trail (grid, agent
//! start and heading). A [`Trail`] is a live simulation instantiated from a
//! blueprint; every evaluation builds its own so runs never share state.

use crate::error::{EvolveError, Result};
use crate::types::{Action, MoveStats};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Grid cell contents. Numeric codes match the trail file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cell {
    Empty,
    Food,
    Agent,
    Optimal,
    End,
    History,
}

impl Cell {
    fn from_code(code: u8) -> Option<(Cell, Option<Heading>)> {
        match code {
            0 => Some((Cell::Empty, None)),
            1 => Some((Cell::Food, None)),
            2 => Some((Cell::Agent, Some(Heading::North))),
            3 => Some((Cell::Agent, Some(Heading::East))),
            4 => Some((Cell::Agent, Some(Heading::South))),
            5 => Some((Cell::Agent, Some(Heading::West))),
            7 => Some((Cell::Optimal, None)),
            8 => Some((Cell::End, None)),
            9 => Some((Cell::History, None)),
            _ => None,
        }
    }

    /// The end marker of the optimal route is edible too.
    pub fn is_food(self) -> bool {
        matches!(self, Cell::Food | Cell::End)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Heading {
    North,
    East,
    South,
    West,
}

impl Heading {
    pub fn from_degrees(degrees: i32) -> Result<Self> {
        match degrees.rem_euclid(360) {
            0 => Ok(Heading::North),
            90 => Ok(Heading::East),
            180 => Ok(Heading::South),
            270 => Ok(Heading::West),
            other => Err(EvolveError::Trail(format!(
                "initial rotation must be a multiple of 90, got {}",
                other
            ))),
        }
    }

    pub fn turn_left(self) -> Self {
        match self {
            Heading::North => Heading::West,
            Heading::West => Heading::South,
            Heading::South => Heading::East,
            Heading::East => Heading::North,
        }
    }

    pub fn turn_right(self) -> Self {
        match self {
            Heading::North => Heading::East,
            Heading::East => Heading::South,
            Heading::South => Heading::West,
            Heading::West => Heading::North,
        }
    }

    fn delta(self) -> (isize, isize) {
        match self {
            Heading::North => (0, -1),
            Heading::East => (1, 0),
            Heading::South => (0, 1),
            Heading::West => (-1, 0),
        }
    }
}

/// On-disk trail description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailFile {
    pub name: String,
    #[serde(default)]
    pub init_rot: i32,
    pub grid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailBlueprint {
    name: String,
    width: usize,
    height: usize,
    cells: Vec<Cell>,
    start: (usize, usize),
    heading: Heading,
    food_total: u32,
}

impl TrailBlueprint {
    /// Parses a grid of cell codes. Rows are separated by newlines or `;`,
    /// codes by whitespace or commas. The initial rotation overrides the
    /// heading implied by the agent code.
    pub fn parse(name: &str, grid: &str, init_rot: i32) -> Result<Self> {
        let heading = Heading::from_degrees(init_rot)?;

        let mut rows: Vec<Vec<u8>> = Vec::new();
        for line in grid.split(|c| c == '\n' || c == ';') {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let row = line
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|tok| !tok.is_empty())
                .map(|tok| {
                    tok.parse::<u8>().map_err(|_| {
                        let message = format!("invalid cell code '{}' in trail '{}'", tok, name);
                        EvolveError::Trail(message)
                    })
                })
                .collect::<Result<Vec<u8>>>()?;
            rows.push(row);
        }

        let height = rows.len();
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        if height == 0 || width == 0 {
            return Err(EvolveError::Trail(format!("trail '{}' has an empty grid", name)));
        }
        if let Some(bad) = rows.iter().position(|r| r.len() != width) {
            return Err(EvolveError::Trail(format!(
                "trail '{}' row {} has {} cells, expected {}",
                name,
                bad,
                rows[bad].len(),
                width
            )));
        }

        let mut cells = Vec::with_capacity(width * height);
        let mut start = None;
        for (y, row) in rows.iter().enumerate() {
            for (x, &code) in row.iter().enumerate() {
                let (cell, agent) = Cell::from_code(code).ok_or_else(|| {
                    EvolveError::Trail(format!("unknown cell code {} in trail '{}'", code, name))
                })?;
                if agent.is_some() {
                    if start.is_some() {
                        return Err(EvolveError::Trail(format!(
                            "trail '{}' contains more than one agent",
                            name
                        )));
                    }
                    start = Some((x, y));
                }
                cells.push(cell);
            }
        }

        let start = start
            .ok_or_else(|| EvolveError::Trail(format!("trail '{}' has no agent", name)))?;
        let food_total = cells.iter().filter(|c| c.is_food()).count() as u32;
        if food_total == 0 {
            log::warn!("Trail '{}' has no food in it", name);
        }

        Ok(Self {
            name: name.to_string(),
            width,
            height,
            cells,
            start,
            heading,
            food_total,
        })
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: TrailFile = toml::from_str(contents)?;
        Self::parse(&file.name, &file.grid, file.init_rot)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            EvolveError::Trail(format!(
                "failed to read trail {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn food_total(&self) -> u32 {
        self.food_total
    }
}

/// Live simulation of one agent on a trail.
#[derive(Debug, Clone)]
pub struct Trail {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
    x: usize,
    y: usize,
    heading: Heading,
    food_total: u32,
    food_consumed: u32,
    moves: MoveStats,
}

impl Trail {
    pub fn new(blueprint: &TrailBlueprint) -> Self {
        let mut cells = blueprint.cells.clone();
        let (x, y) = blueprint.start;
        cells[y * blueprint.width + x] = Cell::Agent;
        Self {
            width: blueprint.width,
            height: blueprint.height,
            cells,
            x,
            y,
            heading: blueprint.heading,
            food_total: blueprint.food_total,
            food_consumed: 0,
            moves: MoveStats::default(),
        }
    }

    /// Restores the simulation to the blueprint's initial state.
    pub fn reset(&mut self, blueprint: &TrailBlueprint) {
        *self = Self::new(blueprint);
    }

    fn wrap(&self, x: usize, y: usize, (dx, dy): (isize, isize)) -> (usize, usize) {
        let nx = (x as isize + dx).rem_euclid(self.width as isize) as usize;
        let ny = (y as isize + dy).rem_euclid(self.height as isize) as usize;
        (nx, ny)
    }

    fn square_ahead(&self) -> (usize, usize) {
        self.wrap(self.x, self.y, self.heading.delta())
    }

    pub fn is_food_ahead(&self) -> bool {
        let (x, y) = self.square_ahead();
        self.cells[y * self.width + x].is_food()
    }

    pub fn apply(&mut self, action: Action) {
        match action {
            Action::Left => self.heading = self.heading.turn_left(),
            Action::Right => self.heading = self.heading.turn_right(),
            Action::Forward => self.move_forward(),
            Action::None => {}
        }
        self.moves.record(action);
    }

    fn move_forward(&mut self) {
        let (nx, ny) = self.square_ahead();
        self.cells[self.y * self.width + self.x] = Cell::History;
        self.x = nx;
        self.y = ny;

        let idx = ny * self.width + nx;
        if self.cells[idx].is_food() {
            self.food_consumed += 1;
        }
        self.cells[idx] = Cell::Agent;
    }

    pub fn position(&self) -> (usize, usize) {
        (self.x, self.y)
    }

    pub fn heading(&self) -> Heading {
        self.heading
    }

    pub fn food_consumed(&self) -> u32 {
        self.food_consumed
    }

    pub fn food_remaining(&self) -> u32 {
        self.food_total - self.food_consumed
    }

    pub fn moves_taken(&self) -> u32 {
        self.moves.total()
    }

    pub fn move_stats(&self) -> MoveStats {
        self.moves
    }
}
