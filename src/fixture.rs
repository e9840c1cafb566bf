//! Line-oriented fixture parsing.
//!
//! A fixture is UTF-8 text with one case per line, written `<input> -> <expected>`.
//! Blank lines and lines starting with `#` are skipped. Anything else must
//! contain exactly one `->`; the parser never truncates a line with a second
//! delimiter, it rejects it.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::diagnostics::{to_error_source, DriverError, Result};

pub const DELIMITER: &str = "->";
pub const COMMENT_MARKER: char = '#';

/// One input/expected pair, in fixture order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCase {
    /// 1-based position among the parsed cases.
    pub ordinal: usize,
    /// 1-based line number in the fixture file.
    pub line: usize,
    pub input: String,
    pub expected: String,
}

impl TestCase {
    pub fn input_len(&self) -> usize {
        self.input.len()
    }

    pub fn expected_len(&self) -> usize {
        self.expected.len()
    }
}

/// Reads and parses a fixture file.
pub fn parse_fixture(path: &Path) -> Result<Vec<TestCase>> {
    let text = fs::read_to_string(path).map_err(|e| DriverError::io(path, e))?;
    parse_fixture_str(&path.display().to_string(), &text)
}

/// Parses fixture text. `name` is only used to label diagnostics.
pub fn parse_fixture_str(name: &str, text: &str) -> Result<Vec<TestCase>> {
    let mut cases = Vec::new();
    let mut offset = 0;

    for (index, raw) in text.split_inclusive('\n').enumerate() {
        let line_start = offset;
        offset += raw.len();

        let line = raw.trim_end_matches(['\n', '\r']);
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(COMMENT_MARKER) {
            continue;
        }

        let line_no = index + 1;
        let delimiters = line.matches(DELIMITER).count();
        let Some((input, expected)) = line.split_once(DELIMITER).filter(|_| delimiters == 1)
        else {
            return Err(DriverError::MalformedLine {
                line: line_no,
                delimiters,
                text: line.to_string(),
                src: to_error_source(name, text),
                span: (line_start, line.len()).into(),
            });
        };

        // Either side may be empty: `hello ->` is an inference-only episode.
        cases.push(TestCase {
            ordinal: cases.len() + 1,
            line: line_no,
            input: input.trim().to_string(),
            expected: expected.trim().to_string(),
        });
    }

    Ok(cases)
}
