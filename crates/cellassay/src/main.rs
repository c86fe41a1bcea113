//! Autonomous cell-biology screening agent.
//!
//! This is a thin entry point; all argument parsing and dispatch lives in
//! `cellassay-cli`.

fn main() {
    std::process::exit(cellassay_cli::run());
}
