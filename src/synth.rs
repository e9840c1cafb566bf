//! Per-case host program synthesis.
//!
//! Each case becomes a small, self-contained C program that drives exactly one
//! episode of the engine and prints one report line. The program declares the
//! engine's entry points itself (against an opaque handle type), so it links
//! with the engine's translation unit without including it.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::diagnostics::{DriverError, Result};
use crate::fixture::TestCase;
use crate::template::{Binding, Bindings, Template};

const HOST_PROGRAM: &str = r#"/* seqdrive episode {{episode}}; regenerated for every case */
#include <stdint.h>
#include <stdio.h>

static const char input[] = {{input}};
static const uint32_t input_len = {{input_len}};
static const char expected[] = {{expected}};
static const uint32_t expected_len = {{expected_len}};

typedef struct engine_handle engine_handle;

extern engine_handle *{{fn_create}}(void);
extern void {{fn_set_input_channel}}(engine_handle *engine, uint32_t channel);
extern void {{fn_set_output_channel}}(engine_handle *engine, uint32_t channel);
extern void {{fn_run_episode}}(engine_handle *engine,
                               const uint8_t *input, uint32_t input_len,
                               const uint8_t *expected, uint32_t expected_len);
extern void {{fn_get_output}}(engine_handle *engine, uint32_t **output, uint32_t *output_len);
extern float {{fn_error_rate}}(engine_handle *engine);
extern void {{fn_destroy}}(engine_handle *engine);

int main(void) {
    engine_handle *engine = {{fn_create}}();
    if (!engine) {
        fputs("engine handle creation failed\n", stderr);
        return 1;
    }

    {{fn_set_input_channel}}(engine, {{input_channel}}u);
    {{fn_set_output_channel}}(engine, {{output_channel}}u);

    {{fn_run_episode}}(engine,
                       (const uint8_t *)input, input_len,
                       (const uint8_t *)expected, expected_len);

    uint32_t *output = NULL;
    uint32_t output_len = 0;
    {{fn_get_output}}(engine, &output, &output_len);

    printf("Ep %llu | Input: ", {{episode}}ull);
    fwrite(input, 1, input_len, stdout);
    fputs(" -> Output: ", stdout);
    for (uint32_t i = 0; output && i < output_len; i++) {
        putchar((char)output[i]);
    }
    fputs(" | Expected: ", stdout);
    fwrite(expected, 1, expected_len, stdout);
    printf(" | Error: %.3f\n", (double){{fn_error_rate}}(engine));
    fflush(stdout);

    {{fn_destroy}}(engine);
    return 0;
}
"#;

static HOST_TEMPLATE: Lazy<Template> =
    Lazy::new(|| Template::parse(HOST_PROGRAM).expect("built-in host template is well-formed"));

/// Names and channel ids of the engine's public entry points.
///
/// These describe the external engine as it exists today; they are
/// configuration, not a frozen interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineContract {
    pub create: String,
    pub set_input_channel: String,
    pub set_output_channel: String,
    pub run_episode: String,
    pub get_output: String,
    pub error_rate: String,
    pub destroy: String,
    /// Channel 0 is the text channel.
    pub input_channel: u32,
    pub output_channel: u32,
}

impl Default for EngineContract {
    fn default() -> Self {
        Self {
            create: "melvin_create".to_string(),
            set_input_channel: "melvin_set_input_port".to_string(),
            set_output_channel: "melvin_set_output_port".to_string(),
            run_episode: "run_episode".to_string(),
            get_output: "melvin_get_output".to_string(),
            error_rate: "melvin_get_error_rate".to_string(),
            destroy: "melvin_destroy".to_string(),
            input_channel: 0,
            output_channel: 0,
        }
    }
}

impl EngineContract {
    fn entry_points(&self) -> [(&'static str, &str); 7] {
        [
            ("fn_create", &self.create),
            ("fn_set_input_channel", &self.set_input_channel),
            ("fn_set_output_channel", &self.set_output_channel),
            ("fn_run_episode", &self.run_episode),
            ("fn_get_output", &self.get_output),
            ("fn_error_rate", &self.error_rate),
            ("fn_destroy", &self.destroy),
        ]
    }
}

/// Source text for one case plus the byte lengths computed from the case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedProgram {
    pub episode: u64,
    pub source: String,
    pub input_len: u32,
    pub expected_len: u32,
}

impl SynthesizedProgram {
    /// Hex SHA-256 of the generated source.
    pub fn digest(&self) -> String {
        Sha256::digest(self.source.as_bytes())
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

/// Hands out episode ids, starting at 1.
#[derive(Debug, Clone, Default)]
pub struct EpisodeCounter {
    issued: u64,
}

impl EpisodeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_episode(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    pub fn issued(&self) -> u64 {
        self.issued
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProgramSynthesizer {
    contract: EngineContract,
}

impl ProgramSynthesizer {
    pub fn new(contract: EngineContract) -> Self {
        Self { contract }
    }

    pub fn contract(&self) -> &EngineContract {
        &self.contract
    }

    pub fn set_channels(&mut self, input_channel: u32, output_channel: u32) {
        self.contract.input_channel = input_channel;
        self.contract.output_channel = output_channel;
    }

    /// Produces the host program for `case`. Performs no IO.
    pub fn synthesize(&self, case: &TestCase, episode: u64) -> Result<SynthesizedProgram> {
        let input_len = byte_len("input", &case.input)?;
        let expected_len = byte_len("expected", &case.expected)?;

        let mut bindings = Bindings::new()
            .bind("episode", Binding::Integer(episode))
            .bind("input", Binding::CString(case.input.clone()))
            .bind("input_len", Binding::Integer(u64::from(input_len)))
            .bind("expected", Binding::CString(case.expected.clone()))
            .bind("expected_len", Binding::Integer(u64::from(expected_len)))
            .bind(
                "input_channel",
                Binding::Integer(u64::from(self.contract.input_channel)),
            )
            .bind(
                "output_channel",
                Binding::Integer(u64::from(self.contract.output_channel)),
            );
        for (hole, name) in self.contract.entry_points() {
            bindings = bindings.bind(hole, Binding::Ident(name.to_string()));
        }

        let source = HOST_TEMPLATE.fill(&bindings)?;
        Ok(SynthesizedProgram {
            episode,
            source,
            input_len,
            expected_len,
        })
    }
}

fn byte_len(hole: &str, text: &str) -> Result<u32> {
    u32::try_from(text.len()).map_err(|_| DriverError::Escaping {
        hole: hole.to_string(),
        reason: format!("{} bytes do not fit the engine's 32-bit length", text.len()),
        help: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ErrorType;
    use crate::template::extract_string_literals;

    fn case(input: &str, expected: &str) -> TestCase {
        TestCase {
            ordinal: 1,
            line: 1,
            input: input.to_string(),
            expected: expected.to_string(),
        }
    }

    #[test]
    fn built_in_template_parses() {
        let holes = HOST_TEMPLATE.holes();
        assert!(holes.contains(&"input"));
        assert!(holes.contains(&"fn_destroy"));
    }

    #[test]
    fn embeds_literals_that_round_trip() {
        let synth = ProgramSynthesizer::default();
        let program = synth.synthesize(&case("say \"hi\"", "C:\\path\\"), 7).unwrap();
        let literals = extract_string_literals(&program.source).unwrap();
        assert_eq!(literals[0], "say \"hi\"");
        assert_eq!(literals[1], "C:\\path\\");
    }

    #[test]
    fn lengths_are_utf8_byte_lengths() {
        let synth = ProgramSynthesizer::default();
        let program = synth.synthesize(&case("h\u{e9}", "ab"), 1).unwrap();
        assert_eq!(program.input_len, 3);
        assert_eq!(program.expected_len, 2);
        assert!(program.source.contains("input_len = 3;"));
        assert!(program.source.contains("expected_len = 2;"));
    }

    #[test]
    fn empty_expected_is_an_inference_only_episode() {
        let program = ProgramSynthesizer::default()
            .synthesize(&case("hello", ""), 1)
            .unwrap();
        assert_eq!(program.expected_len, 0);
        assert!(program.source.contains("static const char expected[] = \"\";"));
        assert!(program.source.contains("expected_len = 0;"));
    }

    #[test]
    fn program_uses_contract_and_lifecycle_in_order() {
        let synth = ProgramSynthesizer::default();
        let src = synth.synthesize(&case("a", "b"), 3).unwrap().source;
        let order = [
            "= melvin_create();",
            "melvin_set_input_port(engine, 0u);",
            "melvin_set_output_port(engine, 0u);",
            "run_episode(engine,",
            "melvin_get_output(engine, &output, &output_len);",
            "melvin_get_error_rate(engine)",
            "melvin_destroy(engine);",
        ];
        let mut last = 0;
        for needle in order {
            let at = src[last..]
                .find(needle)
                .unwrap_or_else(|| panic!("missing or out of order: {needle}"));
            last += at + needle.len();
        }
        assert!(src.contains("printf(\"Ep %llu | Input: \", 3ull);"));
    }

    #[test]
    fn channels_are_configurable() {
        let mut synth = ProgramSynthesizer::new(EngineContract {
            create: "engine_new".into(),
            ..EngineContract::default()
        });
        synth.set_channels(2, 5);
        let src = synth.synthesize(&case("a", "b"), 1).unwrap().source;
        assert!(src.contains("engine_handle *engine = engine_new();"));
        assert!(src.contains("(engine, 2u);"));
        assert!(src.contains("(engine, 5u);"));
    }

    #[test]
    fn invalid_entry_point_is_escaping_error() {
        let synth = ProgramSynthesizer::new(EngineContract {
            destroy: "free(engine); exit".into(),
            ..EngineContract::default()
        });
        let err = synth.synthesize(&case("a", "b"), 1).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Escaping);
    }

    #[test]
    fn nul_in_case_is_escaping_error() {
        let err = ProgramSynthesizer::default()
            .synthesize(&case("a\0", "b"), 1)
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Escaping);
    }

    #[test]
    fn episode_counter_is_monotonic_from_one() {
        let mut counter = EpisodeCounter::new();
        assert_eq!(counter.next_episode(), 1);
        assert_eq!(counter.next_episode(), 2);
        assert_eq!(counter.issued(), 2);
    }

    #[test]
    fn digest_is_stable_hex() {
        let synth = ProgramSynthesizer::default();
        let a = synth.synthesize(&case("a", "b"), 1).unwrap();
        let b = synth.synthesize(&case("a", "b"), 1).unwrap();
        let c = synth.synthesize(&case("a", "b"), 2).unwrap();
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
        assert_eq!(a.digest().len(), 64);
    }
}
