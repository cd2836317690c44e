use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::solver::{GridSolver, Label, DEFAULT_GAMMA};

/// Which stepping algorithm a request wants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    #[default]
    Value,
    Policy,
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Algorithm::Value => write!(f, "value"),
            Algorithm::Policy => write!(f, "policy"),
        }
    }
}

/// A command against the solver, tagged by its `op` field.
///
/// Omitted step parameters fall back to gamma 0.9 and value iteration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    GetState,
    Step {
        #[serde(default = "default_gamma")]
        gamma: f64,
        #[serde(default)]
        algorithm: Algorithm,
    },
    ClearValues,
    ResetEnv,
}

fn default_gamma() -> f64 {
    DEFAULT_GAMMA
}

/// Full view of the planning state: the value table, a policy table of
/// action labels, and the convergence signal of the operation that produced
/// it (0 for plain queries).
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub values: Vec<Vec<f64>>,
    pub policy: Vec<Vec<String>>,
    pub delta: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Response {
    State(Snapshot),
    Ack { status: &'static str },
    Error { status: &'static str, message: String },
}

impl Response {
    pub fn success() -> Response {
        Response::Ack { status: "success" }
    }

    pub fn error(message: String) -> Response {
        Response::Error {
            status: "error",
            message,
        }
    }
}

/// Failures of the transport layer. The solver itself never errors; anything
/// here was rejected before reaching it.
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("malformed request: {0}")]
    BadRequest(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Run one request against the solver and build its response.
pub fn dispatch(solver: &mut GridSolver, request: Request) -> Response {
    match request {
        Request::GetState => {
            let policy = solver.derived_policy();
            Response::State(snapshot(solver, &policy, 0.0))
        }
        Request::Step { gamma, algorithm } => {
            solver.gamma = gamma;
            let (delta, policy) = match algorithm {
                Algorithm::Value => {
                    let delta = solver.value_iteration_step();
                    (delta, solver.derived_policy())
                }
                Algorithm::Policy => {
                    let delta = solver.policy_iteration_step();
                    (delta, solver.policy.clone())
                }
            };
            Response::State(snapshot(solver, &policy, delta))
        }
        Request::ClearValues => {
            solver.reset_values();
            Response::success()
        }
        Request::ResetEnv => {
            solver.reset_env();
            Response::success()
        }
    }
}

/// Flatten the tables into the row-major wire shape.
pub fn snapshot(solver: &GridSolver, policy: &Array2<Label>, delta: f64) -> Snapshot {
    Snapshot {
        values: solver
            .v
            .rows()
            .into_iter()
            .map(|row| row.to_vec())
            .collect(),
        policy: policy
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|l| l.label().to_string()).collect())
            .collect(),
        delta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn fixed_solver() -> GridSolver {
        let mut solver = GridSolver::new(6, 6, DEFAULT_GAMMA);
        solver.layout.obstacles = vec![(3, 3), (2, 1)];
        solver.reset_values();
        solver
    }

    #[test]
    fn step_request_defaults_gamma_and_algorithm() {
        // Act
        let request: Request = serde_json::from_str(r#"{"op":"step"}"#).unwrap();
        // Assert
        assert_eq!(
            request,
            Request::Step {
                gamma: 0.9,
                algorithm: Algorithm::Value
            }
        );
    }

    #[test_case(r#"{"op":"get_state"}"#, Request::GetState; "state query")]
    #[test_case(r#"{"op":"clear_values"}"#, Request::ClearValues; "clear values")]
    #[test_case(r#"{"op":"reset_env"}"#, Request::ResetEnv; "reset environment")]
    #[test_case(
        r#"{"op":"step","gamma":0.5,"algorithm":"policy"}"#,
        Request::Step { gamma: 0.5, algorithm: Algorithm::Policy };
        "explicit step parameters"
    )]
    fn requests_parse(json: &str, expected: Request) {
        assert_eq!(serde_json::from_str::<Request>(json).unwrap(), expected);
    }

    #[test_case(r#"{"op":"shutdown"}"#; "unknown op")]
    #[test_case(r#"{"op":"step","gamma":"fast"}"#; "non numeric gamma")]
    #[test_case(r#"{"#; "truncated json")]
    fn malformed_requests_are_rejected(json: &str) {
        assert!(serde_json::from_str::<Request>(json).is_err());
    }

    #[test]
    fn get_state_reports_zero_delta_and_sentinels() {
        // Arrange
        let mut solver = fixed_solver();
        // Act
        let response = dispatch(&mut solver, Request::GetState);
        // Assert
        let Response::State(snap) = response else {
            panic!("expected a snapshot");
        };
        assert_eq!(snap.delta, 0.0);
        assert_eq!(snap.values.len(), 6);
        assert_eq!(snap.values[0].len(), 6);
        assert_eq!(snap.values[0][5], 10.0);
        assert_eq!(snap.values[1][5], -10.0);
        assert_eq!(snap.policy[0][5], "TERM");
        assert_eq!(snap.policy[1][5], "TERM");
        assert_eq!(snap.policy[3][3], "OBS");
        assert_eq!(snap.policy[0][0], "UP");
    }

    #[test]
    fn value_step_applies_requested_gamma() {
        // Arrange
        let mut solver = fixed_solver();
        // Act
        let response = dispatch(
            &mut solver,
            Request::Step {
                gamma: 0.5,
                algorithm: Algorithm::Value,
            },
        );
        // Assert: gamma sticks on the solver and the delta reflects the
        // halved lookahead: -0.1 + 0.5 * 8.5 = 4.15 beside the goal.
        assert_eq!(solver.gamma, 0.5);
        let Response::State(snap) = response else {
            panic!("expected a snapshot");
        };
        assert!((snap.delta - 4.15).abs() < 1e-9);
        assert!((snap.values[0][4] - 4.15).abs() < 1e-9);
    }

    #[test]
    fn policy_step_surfaces_the_stored_policy() {
        // Arrange
        let mut solver = fixed_solver();
        // Act
        let response = dispatch(
            &mut solver,
            Request::Step {
                gamma: 0.9,
                algorithm: Algorithm::Policy,
            },
        );
        // Assert: the first cycle always changes some action.
        let Response::State(snap) = response else {
            panic!("expected a snapshot");
        };
        assert_eq!(snap.delta, 1.0);
        assert_eq!(snap.policy[0][4], solver.policy[[0, 4]].label());
        assert_eq!(snap.policy[0][4], "RIGHT");
    }

    #[test]
    fn clear_values_acknowledges_and_keeps_obstacles() {
        // Arrange
        let mut solver = fixed_solver();
        dispatch(
            &mut solver,
            Request::Step {
                gamma: 0.9,
                algorithm: Algorithm::Value,
            },
        );
        let obstacles = solver.layout.obstacles.clone();
        // Act
        let response = dispatch(&mut solver, Request::ClearValues);
        // Assert
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"status":"success"}"#);
        assert_eq!(solver.layout.obstacles, obstacles);
        assert_eq!(solver.v[[0, 4]], 0.0);
    }

    #[test]
    fn reset_env_acknowledges_and_reshuffles() {
        // Arrange
        let mut solver = fixed_solver();
        // Act
        let response = dispatch(&mut solver, Request::ResetEnv);
        // Assert
        assert!(matches!(response, Response::Ack { status: "success" }));
        let n = solver.layout.obstacles.len();
        assert!((2..=6).contains(&n));
    }

    #[test]
    fn snapshot_serializes_to_the_wire_shape() {
        // Arrange
        let mut solver = fixed_solver();
        let Response::State(snap) = dispatch(&mut solver, Request::GetState) else {
            panic!("expected a snapshot");
        };
        // Act
        let value = serde_json::to_value(&snap).unwrap();
        // Assert
        assert_eq!(value["delta"], 0.0);
        assert_eq!(value["values"][0][5], 10.0);
        assert_eq!(value["policy"][1][5], "TERM");
        assert_eq!(value["policy"][0][0], "UP");
    }

    #[test]
    fn error_response_carries_status_and_message() {
        // Act
        let json = serde_json::to_string(&Response::error("bad line".into())).unwrap();
        // Assert
        assert_eq!(json, r#"{"status":"error","message":"bad line"}"#);
    }
}
