//! Grid-world MDP planning for interactive teaching demos.
//!
//! A [`solver::GridSolver`] owns one small grid world (terminals, random
//! obstacles, value and policy tables) and advances it one value-iteration
//! or policy-iteration step at a time. The [`surface`] module maps JSON
//! requests onto the solver; the binary serves them line by line.

pub mod grid;
pub mod solver;
pub mod surface;
