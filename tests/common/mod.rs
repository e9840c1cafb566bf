//! Shared fixtures for the integration tests.
//!
//! No C toolchain is needed: the "compiler" is a shell script that reads the
//! episode number and the two literals back out of the generated source and
//! writes a shell-script "binary" printing the report line a real engine
//! would print. Inputs steer it:
//!
//! - `nobuild`: the compiler fails with a diagnostic
//! - `crash`: the binary prints something and exits 3
//! - `hang`: the binary sleeps past the run timeout
//! - `silent`: the binary exits 0 without a report line
//! - `wrong`: the binary outputs `???`
//! - anything else: the binary outputs the expected text

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use seqdrive::{BuildCommand, DriverConfig};

const FAKE_COMPILER: &str = r##"
src="$1"; out="$2"
ep=$(sed -n 's/.*printf("Ep %llu | Input: ", \([0-9]*\)ull);.*/\1/p' "$src")
in=$(sed -n 's/^static const char input\[\] = "\(.*\)";$/\1/p' "$src")
exp=$(sed -n 's/^static const char expected\[\] = "\(.*\)";$/\1/p' "$src")
case "$in" in
  nobuild)
    echo "case.c:12: error: engine refused to link" >&2
    exit 1 ;;
  crash)
    printf '#!/bin/sh\necho "partial output"\necho "engine panicked" >&2\nexit 3\n' > "$out" ;;
  hang)
    printf '#!/bin/sh\nexec sleep 10\n' > "$out" ;;
  silent)
    printf '#!/bin/sh\nexit 0\n' > "$out" ;;
  wrong)
    printf '#!/bin/sh\necho "Ep %s | Input: %s -> Output: ??? | Expected: %s | Error: 0.900"\n' "$ep" "$in" "$exp" > "$out" ;;
  *)
    printf '#!/bin/sh\necho "Ep %s | Input: %s -> Output: %s | Expected: %s | Error: 0.250"\n' "$ep" "$in" "$exp" "$exp" > "$out" ;;
esac
chmod +x "$out"
"##;

pub fn fake_build_command() -> BuildCommand {
    BuildCommand {
        program: "sh".to_string(),
        args: vec![
            "-c".to_string(),
            FAKE_COMPILER.to_string(),
            "fake-cc".to_string(),
            "{source}".to_string(),
            "{output}".to_string(),
        ],
    }
}

pub fn write_fixture(dir: &Path, text: &str) -> PathBuf {
    let path = dir.join("test_input.txt");
    fs::write(&path, text).unwrap();
    path
}

/// Config that runs everything inside `dir` with the fake compiler.
pub fn fake_config(dir: &Path, fixture: &str) -> DriverConfig {
    DriverConfig {
        fixture: write_fixture(dir, fixture),
        scratch_dir: dir.join("scratch"),
        engine_source: dir.join("engine.c"),
        build: fake_build_command(),
        build_timeout_ms: 10_000,
        run_timeout_ms: 500,
        use_colors: Some(false),
        ..DriverConfig::default()
    }
}
