use ndarray::Array2;

use crate::grid::{Action, Cell, Layout, GOAL_REWARD, TRAP_REWARD};

/// Discount factor applied when a step request omits one.
pub const DEFAULT_GAMMA: f64 = 0.9;

/// Probability the environment honors the chosen action.
const PROB_SUCCESS: f64 = 0.8;
/// Probability mass spread uniformly over all four moves (noise).
const PROB_RANDOM: f64 = 0.2;
/// Policy-evaluation convergence threshold.
const EVAL_THETA: f64 = 0.001;

/// One entry of the policy table: a move action, or a sentinel marking a
/// terminal or obstacle cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Move(Action),
    Term,
    Obs,
}

impl Label {
    pub fn label(&self) -> &'static str {
        match self {
            Label::Move(action) => action.label(),
            Label::Term => "TERM",
            Label::Obs => "OBS",
        }
    }
}

/// Grid-world MDP planner.
///
/// Owns the static layout plus the mutable planning state: the value table
/// `v`, the policy table, and the discount factor. One instance per process;
/// the command surface passes it by `&mut` into each operation. All
/// operations are total over a well-formed grid and raise no errors.
///
/// The policy table is only ever mutated by
/// [`GridSolver::policy_iteration_step`]; value iteration derives a display
/// policy on demand from `v` instead (see [`GridSolver::derived_policy`]).
#[derive(Debug, Clone)]
pub struct GridSolver {
    pub layout: Layout,
    pub gamma: f64,
    pub v: Array2<f64>,
    pub policy: Array2<Label>,
}

impl GridSolver {
    /// Build a solver and randomize its first environment.
    pub fn new(rows: usize, cols: usize, gamma: f64) -> GridSolver {
        let mut solver = GridSolver {
            layout: Layout::new(rows, cols),
            gamma,
            v: Array2::zeros((rows, cols)),
            policy: Array2::from_elem((rows, cols), Label::Move(Action::Up)),
        };
        solver.reset_env();
        solver
    }

    /// Regenerate the obstacle set, then reset the planning state.
    pub fn reset_env(&mut self) {
        self.layout.regenerate_obstacles();
        self.reset_values();
    }

    /// Reset the planning state while keeping the current map.
    ///
    /// Every value goes to 0 except the terminals, which are pinned to their
    /// fixed rewards and never touched by any sweep. The policy table goes
    /// back to `UP` everywhere, with sentinels on terminal and obstacle
    /// cells.
    pub fn reset_values(&mut self) {
        self.v.fill(0.0);
        self.v[self.layout.goal] = GOAL_REWARD;
        self.v[self.layout.trap] = TRAP_REWARD;
        self.policy.fill(Label::Move(Action::Up));
        self.policy[self.layout.goal] = Label::Term;
        self.policy[self.layout.trap] = Label::Term;
        for &cell in &self.layout.obstacles {
            self.policy[cell] = Label::Obs;
        }
    }

    /// Expected next-state value for a state-action pair under the fixed
    /// noise model: 80% the intended move, 20% spread evenly over all four
    /// moves. The intended move's outcome appears in both terms; the
    /// double-count is part of the model, not a bug to correct.
    pub fn expected_value(&self, cell: Cell, action: Action) -> f64 {
        let intended = self.v[self.layout.next_cell(cell, action)];
        let mut random_sum = 0.0;
        for a in Action::ALL {
            random_sum += self.v[self.layout.next_cell(cell, a)];
        }
        PROB_SUCCESS * intended + PROB_RANDOM * (random_sum / 4.0)
    }

    /// One-step action value: R(cell) + gamma * EV(cell, action).
    fn q_value(&self, cell: Cell, action: Action) -> f64 {
        self.layout.reward(cell) + self.gamma * self.expected_value(cell, action)
    }

    /// Greedy action and its Q-value. Ties keep the first action in
    /// canonical order (strict improvement required to switch).
    fn best_action(&self, cell: Cell) -> (Action, f64) {
        let mut best_a = Action::Up;
        let mut max_q = f64::NEG_INFINITY;
        for a in Action::ALL {
            let q = self.q_value(cell, a);
            if q > max_q {
                max_q = q;
                best_a = a;
            }
        }
        (best_a, max_q)
    }

    /// One synchronous Bellman optimality sweep (value iteration).
    ///
    /// Every non-terminal, non-obstacle cell gets the max over actions of
    /// its one-step lookahead, computed against a frozen snapshot of the
    /// previous value table and committed together at the end of the sweep.
    /// Returns the max absolute per-cell change; one call advances exactly
    /// one sweep, convergence is the caller's judgement.
    pub fn value_iteration_step(&mut self) -> f64 {
        let mut new_v = self.v.clone();
        let mut delta = 0.0_f64;
        for r in 0..self.layout.rows {
            for c in 0..self.layout.cols {
                if self.layout.is_special((r, c)) {
                    continue;
                }
                let (_, best_q) = self.best_action((r, c));
                delta = delta.max((best_q - self.v[[r, c]]).abs());
                new_v[[r, c]] = best_q;
            }
        }
        self.v = new_v;
        delta
    }

    /// One full policy-iteration cycle: evaluation to convergence, then one
    /// improvement pass.
    ///
    /// Evaluation sweeps update `v` in place under the current policy action
    /// (Gauss-Seidel: updates are read within the same sweep) until the max
    /// change over a full sweep drops below 0.001. The loop carries no sweep
    /// cap; the grid is small and gamma < 1, so it converges geometrically.
    ///
    /// Returns 0.0 if the improvement pass changed no cell's action (policy
    /// stable), 1.0 otherwise. A boolean signal, not a magnitude like value
    /// iteration's delta.
    pub fn policy_iteration_step(&mut self) -> f64 {
        loop {
            let mut delta = 0.0_f64;
            for r in 0..self.layout.rows {
                for c in 0..self.layout.cols {
                    if self.layout.is_special((r, c)) {
                        continue;
                    }
                    if let Label::Move(action) = self.policy[[r, c]] {
                        let old_v = self.v[[r, c]];
                        let updated = self.q_value((r, c), action);
                        self.v[[r, c]] = updated;
                        delta = delta.max((old_v - updated).abs());
                    }
                }
            }
            if delta < EVAL_THETA {
                break;
            }
        }

        let mut stable = true;
        for r in 0..self.layout.rows {
            for c in 0..self.layout.cols {
                if self.layout.is_special((r, c)) {
                    continue;
                }
                let (best_a, _) = self.best_action((r, c));
                if self.policy[[r, c]] != Label::Move(best_a) {
                    stable = false;
                }
                self.policy[[r, c]] = Label::Move(best_a);
            }
        }
        if stable {
            0.0
        } else {
            1.0
        }
    }

    /// Display policy derived from the value table (value iteration keeps no
    /// policy of its own).
    ///
    /// Terminal and obstacle cells always report their sentinel. While the
    /// table is effectively all-zero (nonzero cells no more numerous than
    /// the terminals, so nothing has propagated yet) every other cell
    /// reports the default `UP`; afterwards each reports its one-step
    /// lookahead argmax.
    pub fn derived_policy(&self) -> Array2<Label> {
        let nonzero = self.v.iter().filter(|&&x| x != 0.0).count();
        let cold = nonzero <= self.layout.terminal_count();
        let mut derived = Array2::from_elem(self.v.dim(), Label::Move(Action::Up));
        for r in 0..self.layout.rows {
            for c in 0..self.layout.cols {
                derived[[r, c]] = if self.layout.is_terminal((r, c)) {
                    Label::Term
                } else if self.layout.is_obstacle((r, c)) {
                    Label::Obs
                } else if cold {
                    Label::Move(Action::Up)
                } else {
                    Label::Move(self.best_action((r, c)).0)
                };
            }
        }
        derived
    }
}
