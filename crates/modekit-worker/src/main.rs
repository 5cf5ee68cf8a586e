//! Worker process: runs the bracket linter over framed stdin/stdout.
//!
//! Logs go to stderr, where the host forwards them to its own log.

use anyhow::Context;
use modekit_worker::{BracketLinter, WorkerRuntime, serve_stdio};
use std::io::{self, BufReader};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let linter = BracketLinter::new().context("failed to build the coffee tokenizer")?;
    log::info!("modekit-worker {} ready", env!("CARGO_PKG_VERSION"));
    serve_stdio(
        WorkerRuntime::new(linter),
        BufReader::new(io::stdin()),
        io::stdout().lock(),
    )
    .context("worker transport failed")?;
    log::info!("host closed the connection");
    Ok(())
}
