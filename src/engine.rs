//! The learning engine as a capability.
//!
//! The driver only ever sees the engine through [`EpisodeEngine`]: configure
//! the channels, run one episode per case, read back the last error rate.
//! Handle creation is construction and destruction is `Drop`.
//! [`CompiledEngine`] implements it by synthesizing a host program per case,
//! building it against the engine's source, and parsing the line it prints.

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::diagnostics::DriverError;
use crate::fixture::TestCase;
use crate::pipeline::CaseStage;
use crate::runner::{
    BuildFailure, RunOutcome, Runner, RuntimeFailure, RuntimeFailureKind, Scratch,
};
use crate::synth::{EpisodeCounter, ProgramSynthesizer};

/// What one episode produced, parsed from the host program's report line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeReport {
    pub episode: u64,
    pub input: String,
    pub output: String,
    pub expected: String,
    pub error_rate: f64,
}

impl EpisodeReport {
    pub fn is_correct(&self) -> bool {
        self.output == self.expected
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum CaseFailure {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Synthesis(#[from] DriverError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Build(#[from] BuildFailure),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Runtime(#[from] RuntimeFailure),
}

impl CaseFailure {
    /// The stage that did not complete.
    pub fn failed_stage(&self) -> CaseStage {
        match self {
            CaseFailure::Synthesis(_) => CaseStage::Synthesized,
            CaseFailure::Build(_) => CaseStage::Built,
            CaseFailure::Runtime(_) => CaseStage::Executed,
        }
    }
}

pub trait EpisodeEngine {
    /// Selects the input and output channels used by subsequent episodes.
    fn configure(&mut self, input_channel: u32, output_channel: u32);

    /// Runs one episode for `case`.
    fn run_episode(&mut self, case: &TestCase) -> Result<EpisodeReport, CaseFailure>;

    /// Error rate reported by the most recent successful episode.
    fn error_rate(&self) -> Option<f64>;

    /// Fingerprint of whatever the last episode executed, if the engine has one.
    fn program_digest(&self) -> Option<String> {
        None
    }
}

/// Engine adapter that shells out to a freshly compiled host program per case.
pub struct CompiledEngine<'s> {
    synthesizer: ProgramSynthesizer,
    runner: Runner,
    scratch: &'s mut Scratch,
    episodes: EpisodeCounter,
    last_error_rate: Option<f64>,
    last_digest: Option<String>,
}

impl<'s> CompiledEngine<'s> {
    pub fn new(synthesizer: ProgramSynthesizer, runner: Runner, scratch: &'s mut Scratch) -> Self {
        Self {
            synthesizer,
            runner,
            scratch,
            episodes: EpisodeCounter::new(),
            last_error_rate: None,
            last_digest: None,
        }
    }
}

impl EpisodeEngine for CompiledEngine<'_> {
    fn configure(&mut self, input_channel: u32, output_channel: u32) {
        self.synthesizer.set_channels(input_channel, output_channel);
    }

    fn run_episode(&mut self, case: &TestCase) -> Result<EpisodeReport, CaseFailure> {
        let episode = self.episodes.next_episode();
        self.last_digest = None;

        let program = self.synthesizer.synthesize(case, episode)?;
        self.last_digest = Some(program.digest());
        debug!(episode, ordinal = case.ordinal, stage = %CaseStage::Synthesized, "program ready");

        let session = self.scratch.session();
        let result = match self.runner.build_and_run(&session, &program) {
            RunOutcome::Executed(result) => result,
            RunOutcome::BuildFailure(failure) => return Err(failure.into()),
            RunOutcome::RuntimeFailure(failure) => return Err(failure.into()),
        };
        drop(session);

        let report = parse_report_line(&result.raw_stdout, episode, &case.input, &case.expected)
            .ok_or_else(|| RuntimeFailure {
                kind: RuntimeFailureKind::MissingReport,
                detail: format!("no `Ep {episode} | ...` line in the program's stdout"),
                result: result.clone(),
            })?;
        self.last_error_rate = Some(report.error_rate);
        Ok(report)
    }

    fn error_rate(&self) -> Option<f64> {
        self.last_error_rate
    }

    fn program_digest(&self) -> Option<String> {
        self.last_digest.clone()
    }
}

/// Finds the report line for `episode` in `stdout`.
///
/// The input and expected text are known, so the produced output is whatever
/// lies between them; it may itself contain `|`, `->` or newlines.
pub fn parse_report_line(
    stdout: &str,
    episode: u64,
    input: &str,
    expected: &str,
) -> Option<EpisodeReport> {
    let prefix = format!("Ep {episode} | Input: {input} -> Output: ");
    let marker = format!(" | Expected: {expected} | Error: ");

    let start = stdout.find(&prefix)? + prefix.len();
    let rest = &stdout[start..];
    let split = rest.rfind(&marker)?;
    let output = &rest[..split];
    let rate = rest[split + marker.len()..].lines().next()?.trim();

    Some(EpisodeReport {
        episode,
        input: input.to_string(),
        output: output.to_string(),
        expected: expected.to_string(),
        error_rate: rate.parse().ok()?,
    })
}
