use rand::Rng;

/// Reward for reaching the goal terminal.
pub const GOAL_REWARD: f64 = 10.0;
/// Reward for falling into the trap terminal.
pub const TRAP_REWARD: f64 = -10.0;
/// Per-step living cost for every other cell.
pub const STEP_REWARD: f64 = -0.1;

/// A grid coordinate as (row, col), row 0 at the top.
pub type Cell = (usize, usize);

/// The four move actions, in canonical order.
///
/// The order matters: argmax tie-breaks keep the first action in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Up,
    Down,
    Left,
    Right,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Up, Action::Down, Action::Left, Action::Right];

    pub fn label(&self) -> &'static str {
        match self {
            Action::Up => "UP",
            Action::Down => "DOWN",
            Action::Left => "LEFT",
            Action::Right => "RIGHT",
        }
    }
}

/// Static grid layout: dimensions, terminal cells, start cell, and obstacles.
///
/// The goal and trap sit in the top-right corner column and are fixed for the
/// process lifetime. Obstacles are the only part that changes, via
/// [`Layout::regenerate_obstacles`].
#[derive(Debug, Clone)]
pub struct Layout {
    pub rows: usize,
    pub cols: usize,
    /// Terminal cell worth +10.
    pub goal: Cell,
    /// Terminal cell worth -10.
    pub trap: Cell,
    /// Fixed agent start cell, never covered by an obstacle.
    pub start: Cell,
    pub obstacles: Vec<Cell>,
}

impl Layout {
    /// Build a layout with no obstacles. The goal sits at (0, cols-1) and the
    /// trap directly below it at (1, cols-1).
    pub fn new(rows: usize, cols: usize) -> Layout {
        Layout {
            rows,
            cols,
            goal: (0, cols - 1),
            trap: (1, cols - 1),
            start: (0, 0),
            obstacles: Vec::new(),
        }
    }

    pub fn is_terminal(&self, cell: Cell) -> bool {
        cell == self.goal || cell == self.trap
    }

    pub fn is_obstacle(&self, cell: Cell) -> bool {
        self.obstacles.contains(&cell)
    }

    /// True for cells skipped by every Bellman sweep.
    pub fn is_special(&self, cell: Cell) -> bool {
        self.is_terminal(cell) || self.is_obstacle(cell)
    }

    pub fn terminal_count(&self) -> usize {
        2
    }

    /// Immediate reward for occupying a cell.
    pub fn reward(&self, cell: Cell) -> f64 {
        if cell == self.goal {
            GOAL_REWARD
        } else if cell == self.trap {
            TRAP_REWARD
        } else {
            STEP_REWARD
        }
    }

    /// Intended next cell for an action: one step in the action's direction,
    /// clipped to the grid bounds. A move onto an obstacle is blocked and the
    /// agent stays in place.
    pub fn next_cell(&self, cell: Cell, action: Action) -> Cell {
        let (r, c) = cell;
        let next = match action {
            Action::Up => (r.saturating_sub(1), c),
            Action::Down => ((r + 1).min(self.rows - 1), c),
            Action::Left => (r, c.saturating_sub(1)),
            Action::Right => (r, (c + 1).min(self.cols - 1)),
        };
        if self.is_obstacle(next) {
            cell
        } else {
            next
        }
    }

    /// Re-randomize the obstacle set.
    ///
    /// Picks a target count uniformly from [2, 6], then rejection-samples
    /// uniform cells until that many valid ones are collected. A cell is
    /// valid iff it is not a terminal, not the start cell, and not already
    /// chosen. Each call draws from a fresh thread RNG; there is no seeding
    /// or determinism guarantee.
    pub fn regenerate_obstacles(&mut self) {
        let mut rng = rand::thread_rng();
        let target = rng.gen_range(2..=6);
        self.obstacles.clear();
        while self.obstacles.len() < target {
            let cell = (rng.gen_range(0..self.rows), rng.gen_range(0..self.cols));
            if !self.is_terminal(cell) && cell != self.start && !self.is_obstacle(cell) {
                self.obstacles.push(cell);
            }
        }
    }
}
