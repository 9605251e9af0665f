// src/cli.rs
use anyhow::{Result, anyhow};
use clap::{Arg, Command};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::core::config::{self, DirectoryContext, Settings};
use crate::core::execution;
use crate::reporting::{JsonReport, console, write_json_report};

/// Environment variable holding the diagnostic log filter.
const LOG_ENV: &str = "SUBTEST_LOG";

fn build_cli() -> Command {
    Command::new("sub-test")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Compiles, runs and checks every test in the current directory")
        .arg(
            Arg::new("compiler")
                .help("Path to the compiler under test")
                .value_name("COMPILER")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
}

/// Diagnostics go to standard error so they never mix with the records.
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Runs the current directory against the compiler named on the command line.
/// A malformed command line exits with status 2 before anything runs.
pub async fn run() -> Result<()> {
    let matches = build_cli().get_matches();
    let compiler = matches
        .get_one::<PathBuf>("compiler")
        .cloned()
        .ok_or_else(|| anyhow!("missing compiler argument"))?;

    init_logging();
    console::init_color();

    let env = config::env_snapshot();
    let settings = Settings::load(&env)?;
    let cwd = std::env::current_dir()?;
    tracing::debug!(compiler = %compiler.display(), dir = %cwd.display(), "starting directory run");
    let ctx = DirectoryContext::build(&compiler, &cwd, settings, env).await?;

    let summary = execution::run_directory(&ctx).await?;
    if let Some(path) = &ctx.settings.json_report {
        let report = JsonReport::new(
            &ctx.localdir,
            &ctx.compiler,
            summary.started,
            summary.elapsed.as_secs_f64(),
            &summary.records,
        );
        write_json_report(&report, path)?;
    }
    Ok(())
}
