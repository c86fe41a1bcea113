//! CLI for the autonomous cell-biology screening agent.

#![forbid(unsafe_code)]

pub mod fixtures;

use std::path::PathBuf;

use cellassay_core::RunConfig;
use cellassay_loop::{LoopOrchestrator, RunContext};
use cellassay_vm::BiologyVm;
use clap::{Parser, Subcommand};

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Agent(#[from] cellassay_core::error::Error),
    #[error("self-test failed: {0}")]
    SelfTestFailed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CliResult<T> = Result<T, CliError>;

#[derive(Parser, Debug)]
#[command(name = "cellassay", version, about = "Autonomous microplate-screen design agent")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one episode of the loop orchestrator.
    Run {
        /// Master seed for every RNG stream this episode derives.
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Initial well budget.
        #[arg(long, default_value_t = 960)]
        budget: u32,
        /// Maximum cycles before the episode is forced to terminate.
        #[arg(long, default_value_t = 200)]
        max_cycles: u64,
        /// Directory the six JSONL ledgers and the episode summary are written to.
        #[arg(long, default_value = "cellassay-out")]
        out: PathBuf,
    },
    /// Verify RNG-stream isolation and a handful of cheap deterministic
    /// self-checks without running a full episode.
    #[command(name = "self-test")]
    SelfTest,
}

pub fn run() -> i32 {
    init_tracing();
    let cli = Cli::parse();
    match execute(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            match err {
                CliError::Agent(ref agent_err) => agent_err.exit_code(),
                CliError::SelfTestFailed(_) => 1,
                CliError::Io(_) | CliError::Serialization(_) => 1,
            }
        }
    }
}

fn init_tracing() {
    static TRACING_INIT: std::sync::Once = std::sync::Once::new();
    TRACING_INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    });
}

fn execute(cli: Cli) -> CliResult<i32> {
    match cli.command {
        Commands::Run {
            seed,
            budget,
            max_cycles,
            out,
        } => handle_run(seed, budget, max_cycles, &out),
        Commands::SelfTest => handle_self_test(),
    }
}

/// Exit codes: 0 clean termination, 2 epistemic deadlock, 3 budget
/// exhausted without deadlock, 1 any contract violation (caught above).
fn handle_run(seed: u64, budget: u32, max_cycles: u64, out: &std::path::Path) -> CliResult<i32> {
    let config = RunConfig::new(seed, budget, max_cycles);
    config.validate()?;
    let ctx = RunContext::new(seed, config, fixtures::default_params());
    let orchestrator = LoopOrchestrator::new(ctx);
    let summary = orchestrator.run(out)?;

    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(match summary.terminal_reason.as_str() {
        "epistemic_deadlock" => 2,
        "budget_exhausted" => 3,
        _ => 0,
    })
}

fn handle_self_test() -> CliResult<i32> {
    let params = fixtures::default_params();
    let mut vm = BiologyVm::new(
        42,
        params,
        cellassay_core::CommitmentDelayConfig::default(),
        cellassay_core::MeasurementConfig::default(),
    );
    vm.seed_vessel("self_test", "HeLa", 10_000, 0.95)?;
    vm.treat_with_compound("self_test", "paclitaxel", 1.0)?;
    vm.advance_time("self_test", 24.0)?;

    let (growth_before, treatment_before, _) = vm.rng_fingerprints();
    let _ = vm.measure("self_test", "cell_painting")?;
    let (growth_after, treatment_after, _) = vm.rng_fingerprints();

    if growth_before != growth_after {
        return Err(CliError::SelfTestFailed(
            "measure() perturbed the growth RNG stream".to_string(),
        ));
    }
    if treatment_before != treatment_after {
        return Err(CliError::SelfTestFailed(
            "measure() perturbed the treatment RNG stream".to_string(),
        ));
    }

    let misuse = vm.measure("ghost_vessel", "cell_painting");
    if misuse.is_ok() {
        return Err(CliError::SelfTestFailed(
            "measuring an unknown vessel unexpectedly succeeded".to_string(),
        ));
    }

    println!("self-test OK: physics RNG streams untouched by measure()");
    Ok(0)
}
