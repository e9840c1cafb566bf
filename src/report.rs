//! Result aggregation and reporting.
//!
//! The [`Reporter`] renders a deterministic, human-readable report as cases
//! complete: a banner, one header per tier, one line per case in fixture order,
//! and a summary. Failures are printed inline; they never stop the report.
//! [`RunSummary`] holds every record and can be exported as JSON.

use std::io;
use std::path::Path;

use difference::{Changeset, Difference};
use serde::Serialize;
use termcolor::{Color, ColorSpec, WriteColor};
use unicode_width::UnicodeWidthStr;

use crate::engine::{CaseFailure, EpisodeReport};
use crate::fixture::TestCase;
use crate::runner::RuntimeFailureKind;
use crate::tiers::Tier;

/// Column width used for input and expected text, like `%-15s`.
const FIELD_WIDTH: usize = 15;
/// Cases whose input or expected text is longer than this are "complex".
pub const COMPLEX_THRESHOLD: usize = 5;
const DEFAULT_DIAGNOSTIC_LINES: usize = 6;

// =============================================================================
// OUTCOMES AND RECORDS
// =============================================================================

#[derive(Debug)]
pub enum CaseOutcome {
    Passed(EpisodeReport),
    Mismatch(EpisodeReport),
    Failed(CaseFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Passed,
    Mismatch,
    SynthesisFailed,
    BuildFailed,
    RuntimeFailed,
}

impl OutcomeKind {
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            OutcomeKind::SynthesisFailed | OutcomeKind::BuildFailed | OutcomeKind::RuntimeFailed
        )
    }
}

impl CaseOutcome {
    pub fn from_episode(result: Result<EpisodeReport, CaseFailure>) -> Self {
        match result {
            Ok(report) if report.is_correct() => CaseOutcome::Passed(report),
            Ok(report) => CaseOutcome::Mismatch(report),
            Err(failure) => CaseOutcome::Failed(failure),
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            CaseOutcome::Passed(_) => OutcomeKind::Passed,
            CaseOutcome::Mismatch(_) => OutcomeKind::Mismatch,
            CaseOutcome::Failed(CaseFailure::Synthesis(_)) => OutcomeKind::SynthesisFailed,
            CaseOutcome::Failed(CaseFailure::Build(_)) => OutcomeKind::BuildFailed,
            CaseOutcome::Failed(CaseFailure::Runtime(_)) => OutcomeKind::RuntimeFailed,
        }
    }

    pub fn episode(&self) -> Option<&EpisodeReport> {
        match self {
            CaseOutcome::Passed(report) | CaseOutcome::Mismatch(report) => Some(report),
            CaseOutcome::Failed(_) => None,
        }
    }
}

/// Difficulty class by text length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Complex,
}

impl Complexity {
    pub fn of(case: &TestCase) -> Self {
        if case.input.len() > COMPLEX_THRESHOLD || case.expected.len() > COMPLEX_THRESHOLD {
            Complexity::Complex
        } else {
            Complexity::Simple
        }
    }
}

#[derive(Debug)]
pub struct CaseRecord {
    pub tier: String,
    pub case: TestCase,
    pub outcome: CaseOutcome,
    /// SHA-256 of the synthesized program, when synthesis got that far.
    pub program_digest: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub correct: usize,
    pub total: usize,
}

impl Tally {
    fn add(&mut self, correct: bool) {
        self.total += 1;
        if correct {
            self.correct += 1;
        }
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.correct as f64 * 100.0 / self.total as f64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierTally {
    pub name: String,
    #[serde(flatten)]
    pub tally: Tally,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub passed: usize,
    pub mismatched: usize,
    pub synthesis_failed: usize,
    pub build_failed: usize,
    pub runtime_failed: usize,
}

impl OutcomeCounts {
    fn add(&mut self, kind: OutcomeKind) {
        match kind {
            OutcomeKind::Passed => self.passed += 1,
            OutcomeKind::Mismatch => self.mismatched += 1,
            OutcomeKind::SynthesisFailed => self.synthesis_failed += 1,
            OutcomeKind::BuildFailed => self.build_failed += 1,
            OutcomeKind::RuntimeFailed => self.runtime_failed += 1,
        }
    }

    pub fn failures(&self) -> usize {
        self.synthesis_failed + self.build_failed + self.runtime_failed
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub records: Vec<CaseRecord>,
    pub tiers: Vec<TierTally>,
    pub simple: Tally,
    pub complex: Tally,
    pub counts: OutcomeCounts,
    /// Error rate from the last case that reported one.
    pub final_error_rate: Option<f64>,
}

impl RunSummary {
    /// Aggregates `records`. `tier_names` fixes the order (and includes empty
    /// tiers) of the per-tier tallies.
    pub fn from_records(records: Vec<CaseRecord>, tier_names: &[String]) -> Self {
        let mut tiers: Vec<TierTally> = tier_names
            .iter()
            .map(|name| TierTally {
                name: name.clone(),
                tally: Tally::default(),
            })
            .collect();
        let mut simple = Tally::default();
        let mut complex = Tally::default();
        let mut counts = OutcomeCounts::default();
        let mut final_error_rate = None;

        for record in &records {
            let kind = record.outcome.kind();
            let correct = kind == OutcomeKind::Passed;
            counts.add(kind);
            match Complexity::of(&record.case) {
                Complexity::Simple => simple.add(correct),
                Complexity::Complex => complex.add(correct),
            }
            if let Some(tier) = tiers.iter_mut().find(|t| t.name == record.tier) {
                tier.tally.add(correct);
            }
            if let Some(report) = record.outcome.episode() {
                final_error_rate = Some(report.error_rate);
            }
        }

        Self {
            records,
            tiers,
            simple,
            complex,
            counts,
            final_error_rate,
        }
    }

    pub fn total(&self) -> usize {
        self.records.len()
    }

    /// True when any case failed to synthesize, build or execute.
    pub fn has_failures(&self) -> bool {
        self.counts.failures() > 0
    }

    pub fn has_mismatches(&self) -> bool {
        self.counts.mismatched > 0
    }
}

// =============================================================================
// JSON EXPORT
// =============================================================================

#[derive(Serialize)]
struct JsonReport<'a> {
    total: usize,
    counts: &'a OutcomeCounts,
    tiers: &'a [TierTally],
    simple: &'a Tally,
    complex: &'a Tally,
    final_error_rate: Option<f64>,
    cases: Vec<JsonCase<'a>>,
}

#[derive(Serialize)]
struct JsonCase<'a> {
    tier: &'a str,
    ordinal: usize,
    line: usize,
    complexity: Complexity,
    input: &'a str,
    expected: &'a str,
    outcome: OutcomeKind,
    output: Option<&'a str>,
    error_rate: Option<f64>,
    episode: Option<u64>,
    exit_code: Option<i32>,
    runtime_failure: Option<RuntimeFailureKind>,
    failure: Option<String>,
    program_digest: Option<&'a str>,
}

impl<'a> JsonCase<'a> {
    fn new(record: &'a CaseRecord) -> Self {
        let report = record.outcome.episode();
        let (exit_code, runtime_failure, failure) = match &record.outcome {
            CaseOutcome::Failed(CaseFailure::Build(b)) => {
                (Some(b.exit_code), None, Some(format!("{b}\n{}", b.diagnostics)))
            }
            CaseOutcome::Failed(CaseFailure::Runtime(r)) => {
                (Some(r.result.exit_code), Some(r.kind), Some(r.to_string()))
            }
            CaseOutcome::Failed(CaseFailure::Synthesis(e)) => (None, None, Some(e.to_string())),
            CaseOutcome::Passed(_) | CaseOutcome::Mismatch(_) => (Some(0), None, None),
        };
        Self {
            tier: &record.tier,
            ordinal: record.case.ordinal,
            line: record.case.line,
            complexity: Complexity::of(&record.case),
            input: &record.case.input,
            expected: &record.case.expected,
            outcome: record.outcome.kind(),
            output: report.map(|r| r.output.as_str()),
            error_rate: report.map(|r| r.error_rate),
            episode: report.map(|r| r.episode),
            exit_code,
            runtime_failure,
            failure,
            program_digest: record.program_digest.as_deref(),
        }
    }
}

/// Pretty JSON document with the summary and one entry per case.
pub fn to_json(summary: &RunSummary) -> serde_json::Result<String> {
    let doc = JsonReport {
        total: summary.total(),
        counts: &summary.counts,
        tiers: &summary.tiers,
        simple: &summary.simple,
        complex: &summary.complex,
        final_error_rate: summary.final_error_rate,
        cases: summary.records.iter().map(JsonCase::new).collect(),
    };
    serde_json::to_string_pretty(&doc)
}

// =============================================================================
// TEXT REPORT
// =============================================================================

#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Print a character diff under mismatched cases.
    pub show_diffs: bool,
    /// How many lines of compiler/runtime output to show per failure.
    pub diagnostic_lines: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            show_diffs: false,
            diagnostic_lines: DEFAULT_DIAGNOSTIC_LINES,
        }
    }
}

pub struct Reporter<W: WriteColor> {
    out: W,
    options: ReportOptions,
}

impl<W: WriteColor> Reporter<W> {
    pub fn new(out: W, options: ReportOptions) -> Self {
        Self { out, options }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn banner(&mut self, fixture: &Path, cases: usize) -> io::Result<()> {
        self.colored(Color::Cyan, true, "Sequence engine episode run")?;
        writeln!(self.out)?;
        writeln!(self.out, "{}", "=".repeat(60))?;
        writeln!(self.out, "Fixture: {} ({} cases)", fixture.display(), cases)?;
        writeln!(self.out)
    }

    pub fn tier_header(&mut self, tier: &Tier<'_>) -> io::Result<()> {
        let title = format!("=== {} TESTS ===", tier.name.to_uppercase());
        self.colored(Color::Yellow, true, &title)?;
        writeln!(self.out)?;
        if tier.is_empty() {
            writeln!(self.out, "(no cases)")?;
        }
        Ok(())
    }

    /// Prints the tiers without running anything.
    pub fn listing(&mut self, tiers: &[Tier<'_>]) -> io::Result<()> {
        for tier in tiers {
            self.tier_header(tier)?;
            for (i, case) in tier.cases.iter().enumerate() {
                writeln!(
                    self.out,
                    "Test {}: '{}' -> '{}'",
                    i + 1,
                    display_text(&case.input),
                    display_text(&case.expected)
                )?;
            }
            writeln!(self.out)?;
        }
        Ok(())
    }

    pub fn case_line(&mut self, record: &CaseRecord) -> io::Result<()> {
        let case = &record.case;
        write!(
            self.out,
            "Test {:>2} | Input: {} -> ",
            case.ordinal,
            pad(&display_text(&case.input), FIELD_WIDTH)
        )?;

        match &record.outcome {
            CaseOutcome::Passed(report) | CaseOutcome::Mismatch(report) => {
                let correct = report.is_correct();
                write!(
                    self.out,
                    "Output: {} | Expected: {} | ",
                    display_text(&report.output),
                    pad(&display_text(&case.expected), FIELD_WIDTH)
                )?;
                if correct {
                    self.colored(Color::Green, true, "✓")?;
                } else {
                    self.colored(Color::Red, true, "✗")?;
                }
                writeln!(self.out, " | Error: {:.3}", report.error_rate)?;
                if !correct && self.options.show_diffs {
                    self.diff(&case.expected, &report.output)?;
                }
            }
            CaseOutcome::Failed(failure) => {
                let (label, details) = failure_text(failure);
                self.colored(Color::Red, true, &label)?;
                writeln!(self.out, " | Expected: {}", display_text(&case.expected))?;
                for line in details
                    .lines()
                    .filter(|l| !l.trim().is_empty())
                    .take(self.options.diagnostic_lines)
                {
                    writeln!(self.out, "    {line}")?;
                }
            }
        }
        Ok(())
    }

    pub fn summary(&mut self, summary: &RunSummary) -> io::Result<()> {
        writeln!(self.out)?;
        self.colored(Color::Cyan, true, "=== SUMMARY ===")?;
        writeln!(self.out)?;

        let width = summary
            .tiers
            .iter()
            .map(|t| t.name.width())
            .max()
            .unwrap_or(0);
        for tier in &summary.tiers {
            writeln!(
                self.out,
                "{} : {}",
                pad(&tier.name, width),
                tally_text(&tier.tally)
            )?;
        }
        writeln!(self.out, "Simple cases: {}", tally_text(&summary.simple))?;
        writeln!(self.out, "Complex cases: {}", tally_text(&summary.complex))?;

        let c = &summary.counts;
        writeln!(
            self.out,
            "Total cases: {} (passed {}, mismatched {}, synthesis failed {}, build failed {}, runtime failed {})",
            summary.total(),
            c.passed,
            c.mismatched,
            c.synthesis_failed,
            c.build_failed,
            c.runtime_failed
        )?;
        match summary.final_error_rate {
            Some(rate) => writeln!(self.out, "Final error rate: {rate:.3}"),
            None => writeln!(self.out, "Final error rate: n/a"),
        }
    }

    fn diff(&mut self, expected: &str, actual: &str) -> io::Result<()> {
        let changeset = Changeset::new(expected, actual, "");
        write!(self.out, "    diff: ")?;
        for diff in &changeset.diffs {
            match diff {
                Difference::Same(x) => write!(self.out, "{}", display_text(x))?,
                Difference::Rem(x) => {
                    self.colored(Color::Red, false, &format!("[-{}-]", display_text(x)))?
                }
                Difference::Add(x) => {
                    self.colored(Color::Green, false, &format!("{{+{}+}}", display_text(x)))?
                }
            }
        }
        writeln!(self.out)
    }

    fn colored(&mut self, color: Color, bold: bool, text: &str) -> io::Result<()> {
        self.out
            .set_color(ColorSpec::new().set_fg(Some(color)).set_bold(bold))?;
        write!(self.out, "{text}")?;
        self.out.reset()
    }
}

fn failure_text(failure: &CaseFailure) -> (String, String) {
    match failure {
        CaseFailure::Synthesis(err) => ("SYNTHESIS FAILED".to_string(), err.to_string()),
        CaseFailure::Build(build) => (
            "BUILD FAILED".to_string(),
            format!("{build}\n{}", build.diagnostics),
        ),
        CaseFailure::Runtime(runtime) => {
            let mut details = runtime.detail.clone();
            for stream in [&runtime.result.raw_stderr, &runtime.result.raw_stdout] {
                if !stream.trim().is_empty() {
                    details.push('\n');
                    details.push_str(stream);
                }
            }
            (format!("RUNTIME FAILED ({})", runtime.kind), details)
        }
    }
}

fn tally_text(tally: &Tally) -> String {
    format!(
        "{}/{} correct ({:.1}%)",
        tally.correct,
        tally.total,
        tally.percent()
    )
}

/// Makes control characters visible so every case stays on one line.
pub fn display_text(text: &str) -> String {
    text.chars()
        .flat_map(|c| {
            if c.is_control() {
                c.escape_default().collect::<Vec<_>>()
            } else {
                vec![c]
            }
        })
        .collect()
}

/// Left-aligns `text` to `width` display columns.
fn pad(text: &str, width: usize) -> String {
    let shown = text.width();
    if shown >= width {
        text.to_string()
    } else {
        format!("{text}{}", " ".repeat(width - shown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{BuildFailure, ExecutionResult, RuntimeFailure};
    use termcolor::Buffer;

    fn case(ordinal: usize, input: &str, expected: &str) -> TestCase {
        TestCase {
            ordinal,
            line: ordinal,
            input: input.into(),
            expected: expected.into(),
        }
    }

    fn episode(input: &str, output: &str, expected: &str, rate: f64) -> EpisodeReport {
        EpisodeReport {
            episode: 1,
            input: input.into(),
            output: output.into(),
            expected: expected.into(),
            error_rate: rate,
        }
    }

    fn record(tier: &str, case: TestCase, outcome: CaseOutcome) -> CaseRecord {
        CaseRecord {
            tier: tier.into(),
            case,
            outcome,
            program_digest: None,
        }
    }

    fn render(f: impl FnOnce(&mut Reporter<Buffer>) -> io::Result<()>) -> String {
        let mut reporter = Reporter::new(
            Buffer::no_color(),
            ReportOptions {
                show_diffs: true,
                ..ReportOptions::default()
            },
        );
        f(&mut reporter).unwrap();
        String::from_utf8(reporter.into_inner().into_inner()).unwrap()
    }

    #[test]
    fn passed_line_shows_all_fields() {
        let r = record(
            "simple",
            case(1, "hello", "HELLO"),
            CaseOutcome::Passed(episode("hello", "HELLO", "HELLO", 0.25)),
        );
        let text = render(|rep| rep.case_line(&r));
        assert_eq!(
            text,
            "Test  1 | Input: hello           -> Output: HELLO | Expected: HELLO           | ✓ | Error: 0.250\n"
        );
    }

    #[test]
    fn mismatch_shows_cross_and_diff() {
        let r = record(
            "simple",
            case(2, "ab", "cd"),
            CaseOutcome::Mismatch(episode("ab", "ce", "cd", 0.5)),
        );
        let text = render(|rep| rep.case_line(&r));
        assert!(text.contains("| ✗ |"));
        assert!(text.contains("diff: c[-d-]{+e+}"));
    }

    #[test]
    fn failures_are_reported_inline() {
        let build = record(
            "simple",
            case(3, "x", "y"),
            CaseOutcome::Failed(CaseFailure::Build(BuildFailure {
                command: "cc case.c".into(),
                exit_code: 1,
                diagnostics: "case.c:1: error: boom".into(),
            })),
        );
        let runtime = record(
            "simple",
            case(4, "x", "y"),
            CaseOutcome::Failed(CaseFailure::Runtime(RuntimeFailure {
                kind: RuntimeFailureKind::Timeout,
                detail: "no exit within 10ms".into(),
                result: ExecutionResult::default(),
            })),
        );
        let text = render(|rep| {
            rep.case_line(&build)?;
            rep.case_line(&runtime)
        });
        assert!(text.contains("Test  3 | Input: x               -> BUILD FAILED | Expected: y"));
        assert!(text.contains("    case.c:1: error: boom"));
        assert!(text.contains("RUNTIME FAILED (timeout)"));
        assert!(text.contains("    no exit within 10ms"));
    }

    #[test]
    fn control_characters_stay_on_one_line() {
        assert_eq!(display_text("a\nb\tc"), "a\\nb\\tc");
        assert_eq!(display_text("caf\u{e9}"), "caf\u{e9}");
    }

    #[test]
    fn padding_uses_display_width() {
        assert_eq!(pad("\u{4f60}\u{597d}", 6), "\u{4f60}\u{597d}  ");
        assert_eq!(pad("toolong", 3), "toolong");
    }

    #[test]
    fn summary_tallies_tiers_complexity_and_outcomes() {
        let records = vec![
            record(
                "simple",
                case(1, "a", "b"),
                CaseOutcome::Passed(episode("a", "b", "b", 0.5)),
            ),
            record(
                "simple",
                case(2, "abcdef", "b"),
                CaseOutcome::Mismatch(episode("abcdef", "x", "b", 0.75)),
            ),
            record(
                "pattern",
                case(3, "a", "b"),
                CaseOutcome::Failed(CaseFailure::Build(BuildFailure {
                    command: "cc".into(),
                    exit_code: 1,
                    diagnostics: String::new(),
                })),
            ),
        ];
        let names = vec!["simple".to_string(), "pattern".to_string(), "complex".to_string()];
        let summary = RunSummary::from_records(records, &names);

        assert_eq!(summary.total(), 3);
        assert_eq!(summary.tiers[0].tally, Tally { correct: 1, total: 2 });
        assert_eq!(summary.tiers[1].tally, Tally { correct: 0, total: 1 });
        assert_eq!(summary.tiers[2].tally, Tally::default());
        assert_eq!(summary.simple, Tally { correct: 1, total: 2 });
        assert_eq!(summary.complex, Tally { correct: 0, total: 1 });
        assert_eq!(summary.counts.build_failed, 1);
        assert_eq!(summary.final_error_rate, Some(0.75));
        assert!(summary.has_failures());
        assert!(summary.has_mismatches());

        let text = render(|rep| rep.summary(&summary));
        assert!(text.contains("simple  : 1/2 correct (50.0%)"));
        assert!(text.contains("complex : 0/0 correct (0.0%)"));
        assert!(text.contains("Total cases: 3 (passed 1, mismatched 1"));
        assert!(text.contains("Final error rate: 0.750"));

        let json: serde_json::Value = serde_json::from_str(&to_json(&summary).unwrap()).unwrap();
        assert_eq!(json["total"], 3);
        assert_eq!(json["cases"][1]["outcome"], "mismatch");
        assert_eq!(json["cases"][1]["complexity"], "complex");
        assert_eq!(json["cases"][2]["outcome"], "build_failed");
        assert_eq!(json["tiers"][0]["correct"], 1);
    }

    #[test]
    fn empty_tier_header_says_so() {
        let tier = Tier {
            name: "context".into(),
            start: 9,
            cases: &[],
        };
        let text = render(|rep| rep.tier_header(&tier));
        assert_eq!(text, "=== CONTEXT TESTS ===\n(no cases)\n");
    }

    #[test]
    fn listing_numbers_cases_within_tier() {
        let cases = vec![case(6, "ab", "ba"), case(7, "say \"hi\"", "ok")];
        let tier = Tier {
            name: "pattern".into(),
            start: 5,
            cases: &cases,
        };
        let text = render(|rep| rep.listing(std::slice::from_ref(&tier)));
        assert!(text.contains("Test 1: 'ab' -> 'ba'\n"));
        assert!(text.contains("Test 2: 'say \"hi\"' -> 'ok'\n"));
    }
}
