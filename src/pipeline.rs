//! Sequential orchestration.
//!
//! One run parses the fixture, classifies it into tiers, and then drives every
//! case through `Parsed -> Synthesized -> Built -> Executed -> Reported`,
//! strictly in order. A case that fails at any stage is recorded and the run
//! moves on to the next one.

use std::fmt;
use std::io;

use serde::Serialize;
use termcolor::WriteColor;
use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::diagnostics::{DriverError, Result};
use crate::engine::{CompiledEngine, EpisodeEngine};
use crate::fixture::{parse_fixture, TestCase};
use crate::report::{CaseOutcome, CaseRecord, Reporter, RunSummary};
use crate::runner::{Runner, Scratch};
use crate::synth::ProgramSynthesizer;
use crate::tiers::{classify, Tier};

/// Every case executed; mismatches alone do not fail a run.
pub const EXIT_OK: i32 = 0;
/// At least one case failed to synthesize, build or execute (or, when strict,
/// mismatched).
pub const EXIT_CASE_FAILURES: i32 = 1;
/// The run never got going: bad fixture, bad config, or IO trouble.
pub const EXIT_ABORTED: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStage {
    Parsed,
    Synthesized,
    Built,
    Executed,
    Reported,
}

impl CaseStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStage::Parsed => "PARSED",
            CaseStage::Synthesized => "SYNTHESIZED",
            CaseStage::Built => "BUILT",
            CaseStage::Executed => "EXECUTED",
            CaseStage::Reported => "REPORTED",
        }
    }
}

impl fmt::Display for CaseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RunSummary {
    pub fn exit_code(&self, strict: bool) -> i32 {
        if self.has_failures() || (strict && self.has_mismatches()) {
            EXIT_CASE_FAILURES
        } else {
            EXIT_OK
        }
    }
}

// =============================================================================
// CASE LOOP
// =============================================================================

/// Runs every case of every tier through `engine`, reporting each one as soon
/// as it finishes. Only reporter IO errors stop the loop.
pub fn run_cases<E, W>(
    engine: &mut E,
    tiers: &[Tier<'_>],
    reporter: &mut Reporter<W>,
) -> io::Result<Vec<CaseRecord>>
where
    E: EpisodeEngine,
    W: WriteColor,
{
    let mut records = Vec::with_capacity(tiers.iter().map(Tier::len).sum());

    for tier in tiers {
        info!(tier = %tier.name, cases = tier.len(), "starting tier");
        reporter.tier_header(tier)?;
        for case in tier.cases {
            debug!(ordinal = case.ordinal, line = case.line, stage = %CaseStage::Parsed, "case");
            let record = run_case(engine, &tier.name, case);
            reporter.case_line(&record)?;
            debug!(ordinal = case.ordinal, stage = %CaseStage::Reported, "case");
            records.push(record);
        }
    }
    Ok(records)
}

fn run_case<E: EpisodeEngine>(engine: &mut E, tier: &str, case: &TestCase) -> CaseRecord {
    let result = engine.run_episode(case);
    match &result {
        Ok(report) => debug!(
            ordinal = case.ordinal,
            episode = report.episode,
            stage = %CaseStage::Executed,
            error_rate = report.error_rate,
            "case"
        ),
        Err(failure) => warn!(
            ordinal = case.ordinal,
            failed_stage = %failure.failed_stage(),
            "case failed: {failure}"
        ),
    }

    CaseRecord {
        tier: tier.to_string(),
        case: case.clone(),
        outcome: CaseOutcome::from_episode(result),
        program_digest: engine.program_digest(),
    }
}

// =============================================================================
// PIPELINE
// =============================================================================

pub struct Pipeline<'c> {
    config: &'c DriverConfig,
}

impl<'c> Pipeline<'c> {
    pub fn new(config: &'c DriverConfig) -> Self {
        Self { config }
    }

    /// Parses, classifies and runs the whole fixture.
    ///
    /// Errors returned here abort the run. Per-case failures end up in the
    /// summary instead.
    pub fn run<W: WriteColor>(&self, reporter: &mut Reporter<W>) -> Result<RunSummary> {
        let config = self.config;
        let cases = parse_fixture(&config.fixture)?;
        let tiers = classify(&config.tiers, &cases);
        info!(
            fixture = %config.fixture.display(),
            cases = cases.len(),
            tiers = tiers.len(),
            "fixture loaded"
        );
        reporter
            .banner(&config.fixture, cases.len())
            .map_err(stdout_error)?;

        let mut scratch = Scratch::new(&config.scratch_dir)?;
        let runner = Runner::new(
            config.build.clone(),
            config.engine_source.clone(),
            config.build_timeout(),
            config.run_timeout(),
        );
        let mut engine = CompiledEngine::new(
            ProgramSynthesizer::new(config.contract.clone()),
            runner,
            &mut scratch,
        );
        engine.configure(config.contract.input_channel, config.contract.output_channel);

        let records = run_cases(&mut engine, &tiers, reporter).map_err(stdout_error)?;
        let names: Vec<String> = tiers.iter().map(|t| t.name.clone()).collect();
        let summary = RunSummary::from_records(records, &names);
        reporter.summary(&summary).map_err(stdout_error)?;
        Ok(summary)
    }

    /// Prints the tiers without building or running anything. Returns the
    /// number of cases.
    pub fn list<W: WriteColor>(&self, reporter: &mut Reporter<W>) -> Result<usize> {
        let cases = parse_fixture(&self.config.fixture)?;
        let tiers = classify(&self.config.tiers, &cases);
        reporter
            .banner(&self.config.fixture, cases.len())
            .map_err(stdout_error)?;
        reporter.listing(&tiers).map_err(stdout_error)?;
        Ok(cases.len())
    }
}

fn stdout_error(e: io::Error) -> DriverError {
    DriverError::io("<stdout>", e)
}
