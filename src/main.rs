use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use config_file::FromConfigFile;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use gridmdp::solver::{GridSolver, DEFAULT_GAMMA};
use gridmdp::surface::{self, Algorithm, Request, Response, SurfaceError};

/// Command line argument parser.
#[derive(Parser, Debug)]
#[command(about = "Interactive grid-world MDP planning solver", long_about = None)]
pub struct Args {
    /// Path to grid configuration TOML file (built-in 6x6 defaults if omitted).
    #[arg(long)]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer JSON requests line by line over stdin/stdout.
    Serve,
    /// Print one snapshot of the fresh grid.
    Show,
    /// Step the chosen algorithm until it converges, then print the result.
    Solve {
        #[arg(value_enum, default_value_t = Algorithm::Value)]
        algorithm: Algorithm,
        /// Discount factor.
        #[arg(long, default_value_t = DEFAULT_GAMMA)]
        gamma: f64,
        /// Stop after this many steps even if not converged.
        #[arg(long, default_value_t = 500)]
        max_steps: u32,
        /// Write the final value table to this CSV file.
        #[arg(long)]
        csv_out: Option<PathBuf>,
    },
}

/// Values read from the TOML configuration file.
#[derive(Deserialize, Debug)]
pub struct GridConfig {
    pub rows: usize,
    pub cols: usize,
    pub gamma: f64,
}

impl Default for GridConfig {
    fn default() -> GridConfig {
        GridConfig {
            rows: 6,
            cols: 6,
            gamma: DEFAULT_GAMMA,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("unable to read configuration file: {0}")]
    Config(#[from] config_file::ConfigFileError),
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error("unable to write CSV output: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn main() -> Result<(), CliError> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = match &args.config_path {
        Some(path) => {
            info!(path = %path.display(), "reading configuration");
            GridConfig::from_config_file(path)?
        }
        None => GridConfig::default(),
    };
    let mut solver = GridSolver::new(config.rows, config.cols, config.gamma);
    info!(
        rows = config.rows,
        cols = config.cols,
        obstacles = solver.layout.obstacles.len(),
        "grid initialized"
    );

    match args.command {
        Commands::Serve => serve(&mut solver)?,
        Commands::Show => {
            let Response::State(snap) = surface::dispatch(&mut solver, Request::GetState) else {
                unreachable!("state query always returns a snapshot");
            };
            println!("{}", serde_json::to_string_pretty(&snap).map_err(SurfaceError::from)?);
        }
        Commands::Solve {
            algorithm,
            gamma,
            max_steps,
            csv_out,
        } => {
            solver.gamma = gamma;
            let steps = run_to_convergence(&mut solver, algorithm, max_steps);
            print_tables(&solver, algorithm);
            if let Some(path) = csv_out {
                write_values_csv(&solver, &path)?;
                info!(path = %path.display(), "value table written");
            }
            info!(steps, "solve finished");
        }
    }
    Ok(())
}

/// JSON-lines request/response loop: one request per stdin line, one
/// response per stdout line. Malformed lines get an error response and never
/// reach the solver.
fn serve(solver: &mut GridSolver) -> Result<(), SurfaceError> {
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                debug!(?request, "dispatching");
                surface::dispatch(solver, request)
            }
            Err(err) => {
                warn!(error = %err, "rejected request");
                Response::error(err.to_string())
            }
        };
        let encoded = serde_json::to_string(&response)?;
        writeln!(stdout, "{encoded}")?;
        stdout.flush()?;
    }
    Ok(())
}

/// Step until the algorithm's own convergence signal goes quiet: delta below
/// the evaluation threshold for value iteration, a stable policy (0.0) for
/// policy iteration.
fn run_to_convergence(solver: &mut GridSolver, algorithm: Algorithm, max_steps: u32) -> u32 {
    let mut steps = 0;
    while steps < max_steps {
        steps += 1;
        let delta = match algorithm {
            Algorithm::Value => solver.value_iteration_step(),
            Algorithm::Policy => solver.policy_iteration_step(),
        };
        debug!(steps, delta, "step");
        let converged = match algorithm {
            Algorithm::Value => delta < 0.001,
            Algorithm::Policy => delta == 0.0,
        };
        if converged {
            break;
        }
    }
    steps
}

fn print_tables(solver: &GridSolver, algorithm: Algorithm) {
    let policy = match algorithm {
        Algorithm::Value => solver.derived_policy(),
        Algorithm::Policy => solver.policy.clone(),
    };
    println!("Values:");
    for row in solver.v.rows() {
        let cells: Vec<String> = row.iter().map(|v| format!("{v:7.2}")).collect();
        println!("{}", cells.join(" "));
    }
    println!("Policy:");
    for row in policy.rows() {
        let cells: Vec<String> = row.iter().map(|l| format!("{:>5}", l.label())).collect();
        println!("{}", cells.join(" "));
    }
}

fn write_values_csv(solver: &GridSolver, path: &Path) -> Result<(), CliError> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in solver.v.rows() {
        writer.write_record(row.iter().map(|v| format!("{v:.4}")))?;
    }
    writer.flush()?;
    Ok(())
}
