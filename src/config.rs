//! Driver configuration.
//!
//! Values come from, in increasing precedence: built-in defaults, an optional
//! YAML file (`seqdrive.yaml` in the working directory, or `--config`), and
//! command-line flags.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{DriverError, Result};
use crate::runner::BuildCommand;
use crate::synth::EngineContract;
use crate::tiers::TierPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "seqdrive.yaml";
pub const DEFAULT_FIXTURE: &str = "test_input.txt";
pub const DEFAULT_SCRATCH_DIR: &str = ".seqdrive";
pub const DEFAULT_ENGINE_SOURCE: &str = "melvin.c";
const DEFAULT_BUILD_TIMEOUT_MS: u64 = 120_000;
const DEFAULT_RUN_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    pub fixture: PathBuf,
    pub scratch_dir: PathBuf,
    pub engine_source: PathBuf,
    pub build: BuildCommand,
    pub build_timeout_ms: u64,
    pub run_timeout_ms: u64,
    pub tiers: TierPolicy,
    pub contract: EngineContract,
    /// `None` means "color when stdout is a terminal".
    pub use_colors: Option<bool>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            fixture: PathBuf::from(DEFAULT_FIXTURE),
            scratch_dir: PathBuf::from(DEFAULT_SCRATCH_DIR),
            engine_source: PathBuf::from(DEFAULT_ENGINE_SOURCE),
            build: BuildCommand::default(),
            build_timeout_ms: DEFAULT_BUILD_TIMEOUT_MS,
            run_timeout_ms: DEFAULT_RUN_TIMEOUT_MS,
            tiers: TierPolicy::default(),
            contract: EngineContract::default(),
            use_colors: None,
        }
    }
}

impl DriverConfig {
    /// Loads `explicit` if given, else `seqdrive.yaml` when it exists, else
    /// the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let implicit = Path::new(DEFAULT_CONFIG_FILE);
                if implicit.is_file() {
                    Self::from_file(implicit)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| DriverError::io(path, e))?;
        Self::from_yaml(path, &text)
    }

    /// Parses YAML text. `origin` is only used in error messages.
    pub fn from_yaml(origin: &Path, text: &str) -> Result<Self> {
        let config: Self = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(text).map_err(|e| DriverError::Config {
                path: origin.to_path_buf(),
                message: e.to_string(),
            })?
        };
        config.validate(origin)?;
        Ok(config)
    }

    pub fn validate(&self, origin: &Path) -> Result<()> {
        let invalid = |message: String| DriverError::Config {
            path: origin.to_path_buf(),
            message,
        };
        self.tiers
            .validate()
            .map_err(|e| invalid(format!("tiers: {e}")))?;
        if self.build.program.trim().is_empty() {
            return Err(invalid("build.program is empty".to_string()));
        }
        if self.build_timeout_ms == 0 || self.run_timeout_ms == 0 {
            return Err(invalid("timeouts must be greater than zero".to_string()));
        }
        Ok(())
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_millis(self.build_timeout_ms)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    pub fn colors_enabled(&self) -> bool {
        self.use_colors
            .unwrap_or_else(|| atty::is(atty::Stream::Stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ErrorType;

    #[test]
    fn defaults_follow_conventions() {
        let config = DriverConfig::default();
        assert_eq!(config.fixture, PathBuf::from("test_input.txt"));
        assert_eq!(config.tiers, TierPolicy::default());
        assert_eq!(config.run_timeout(), Duration::from_secs(30));
        assert_eq!(config.contract.input_channel, 0);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let yaml = "engine_source: engines/alt.c\nrun_timeout_ms: 500\nuse_colors: false\n";
        let config = DriverConfig::from_yaml(Path::new("t.yaml"), yaml).unwrap();
        assert_eq!(config.engine_source, PathBuf::from("engines/alt.c"));
        assert_eq!(config.run_timeout_ms, 500);
        assert!(!config.colors_enabled());
        assert_eq!(config.build, BuildCommand::default());
    }

    #[test]
    fn nested_sections_parse() {
        let yaml = r#"
build:
  program: clang
  args: ["-o", "{output}", "{source}", "{engine}"]
contract:
  create: engine_new
  output_channel: 2
tiers:
  - { name: all, start: 0 }
"#;
        let config = DriverConfig::from_yaml(Path::new("t.yaml"), yaml).unwrap();
        assert_eq!(config.build.program, "clang");
        assert_eq!(config.contract.create, "engine_new");
        assert_eq!(config.contract.destroy, "melvin_destroy");
        assert_eq!(config.contract.output_channel, 2);
        assert_eq!(config.tiers.bounds.len(), 1);
    }

    #[test]
    fn empty_file_is_default() {
        let config = DriverConfig::from_yaml(Path::new("t.yaml"), "  \n").unwrap();
        assert_eq!(config, DriverConfig::default());
    }

    #[test]
    fn unknown_keys_and_bad_tiers_are_config_errors() {
        let err = DriverConfig::from_yaml(Path::new("t.yaml"), "fixtrue: x.txt\n").unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Config);

        let yaml = "tiers:\n  - { name: a, start: 1 }\n";
        let err = DriverConfig::from_yaml(Path::new("t.yaml"), yaml).unwrap_err();
        assert!(err.to_string().contains("tiers:"));

        let err = DriverConfig::from_yaml(Path::new("t.yaml"), "run_timeout_ms: 0\n").unwrap_err();
        assert!(err.to_string().contains("timeouts"));
    }

    #[test]
    fn explicit_missing_file_is_io_error() {
        let err = DriverConfig::load(Some(Path::new("no/such/seqdrive.yaml"))).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Io);
    }
}
