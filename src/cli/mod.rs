//! The `seqdrive` command line.
//!
//! Loads configuration, applies flag overrides, runs (or lists) the fixture and
//! turns the outcome into an exit status.

use std::fs;
use std::io::{self, Write};
use std::process;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::args::DriverArgs;
use crate::config::DriverConfig;
use crate::diagnostics::{DriverError, Result};
use crate::pipeline::{Pipeline, EXIT_ABORTED, EXIT_OK};
use crate::report::{to_json, ReportOptions, Reporter};

pub mod args;
pub mod output;

/// Entry point of the binary. Never returns.
pub fn run() {
    let args = DriverArgs::parse();
    init_tracing(args.verbose);

    let code = match execute(&args) {
        Ok(code) => code,
        Err(e) => {
            output::print_error(miette::Report::new(e));
            EXIT_ABORTED
        }
    };
    process::exit(code);
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn execute(args: &DriverArgs) -> Result<i32> {
    let mut config = DriverConfig::load(args.config.as_deref())?;
    apply_overrides(&mut config, args);
    info!(?config, "configuration resolved");

    let colors = config.colors_enabled();
    let options = ReportOptions {
        show_diffs: colors || args.verbose > 0,
        ..ReportOptions::default()
    };
    let mut reporter = Reporter::new(output::stdout(colors), options);
    let pipeline = Pipeline::new(&config);

    if args.list {
        pipeline.list(&mut reporter)?;
        let _ = reporter.into_inner().flush();
        return Ok(EXIT_OK);
    }

    let summary = pipeline.run(&mut reporter)?;
    let _ = reporter.into_inner().flush();

    if let Some(path) = &args.json {
        let text = to_json(&summary).map_err(|e| DriverError::io(path, io::Error::from(e)))?;
        fs::write(path, text).map_err(|e| DriverError::io(path, e))?;
        output::print_note(colors, &format!("JSON report written to {}", path.display()));
    }

    Ok(summary.exit_code(args.strict))
}

/// Flags win over the configuration file.
fn apply_overrides(config: &mut DriverConfig, args: &DriverArgs) {
    if let Some(fixture) = &args.fixture {
        config.fixture = fixture.clone();
    }
    if let Some(scratch) = &args.scratch {
        config.scratch_dir = scratch.clone();
    }
    if let Some(engine) = &args.engine {
        config.engine_source = engine.clone();
    }
    if args.no_color {
        config.use_colors = Some(false);
    }
}
