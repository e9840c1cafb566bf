//! Command-line arguments for `seqdrive`.
//!
//! Every flag here overrides the matching field of the YAML configuration.

use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "seqdrive",
    version,
    about = "Runs fixture cases through a sequence-learning engine, one compiled episode per case."
)]
pub struct DriverArgs {
    /// Fixture of `input -> expected` lines. Defaults to `test_input.txt`.
    pub fixture: Option<PathBuf>,

    /// YAML configuration file. Defaults to `seqdrive.yaml` when present.
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory for the per-case source and binary.
    #[arg(long, value_name = "DIR")]
    pub scratch: Option<PathBuf>,

    /// Engine source file linked into every case program.
    #[arg(long, value_name = "PATH")]
    pub engine: Option<PathBuf>,

    /// Print the tiers and cases without building anything.
    #[arg(long)]
    pub list: bool,

    /// Treat mismatched outputs as failures in the exit status.
    #[arg(long)]
    pub strict: bool,

    /// Also write the full report as JSON.
    #[arg(long, value_name = "PATH")]
    pub json: Option<PathBuf>,

    /// Disable colored output.
    #[arg(long)]
    pub no_color: bool,

    /// More logging on stderr (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}
