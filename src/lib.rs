//! `seqdrive` drives a sequence-learning engine through a fixture of
//! `input -> expected` cases: every case becomes its own small C program,
//! built against the engine and run once, and the results are collected into
//! a tiered report.

pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod fixture;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod synth;
pub mod template;
pub mod tiers;

pub use crate::config::DriverConfig;
pub use crate::diagnostics::{DriverError, ErrorType, Result};
pub use crate::engine::{CaseFailure, CompiledEngine, EpisodeEngine, EpisodeReport};
pub use crate::fixture::{parse_fixture, parse_fixture_str, TestCase};
pub use crate::pipeline::{run_cases, CaseStage, Pipeline};
pub use crate::report::{CaseOutcome, CaseRecord, OutcomeKind, ReportOptions, Reporter, RunSummary};
pub use crate::runner::{BuildCommand, RunOutcome, Runner, Scratch};
pub use crate::synth::{EngineContract, ProgramSynthesizer, SynthesizedProgram};
pub use crate::tiers::{classify, Tier, TierPolicy};
