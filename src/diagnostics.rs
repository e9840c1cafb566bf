//! Unified, `miette`-based diagnostics for the episode driver.
//!
//! Errors that abort a run (fixture, configuration, IO) are [`DriverError`]
//! variants propagated with `?` and rendered by the binary through
//! `miette::Report`. Synthesis errors (escaping, template) use the same type but
//! are caught per case by the pipeline. Build and runtime failures are not
//! errors at all: the runner returns them as typed outcomes.

use std::path::PathBuf;
use std::sync::Arc;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Shared, named source text used by span-carrying diagnostics.
pub type SourceArc = Arc<NamedSource<String>>;

pub type Result<T, E = DriverError> = std::result::Result<T, E>;

/// Type-safe classification of [`DriverError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    MalformedLine,
    Escaping,
    Template,
    Io,
    Config,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::MalformedLine => "MalformedLine",
            ErrorType::Escaping => "Escaping",
            ErrorType::Template => "Template",
            ErrorType::Io => "Io",
            ErrorType::Config => "Config",
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum DriverError {
    #[error("malformed fixture line {line}: expected exactly one `->`, found {delimiters}")]
    #[diagnostic(
        code(seqdrive::fixture::malformed_line),
        help("write each case as `<input> -> <expected>`; lines starting with `#` are comments")
    )]
    MalformedLine {
        line: usize,
        delimiters: usize,
        text: String,
        #[source_code]
        src: SourceArc,
        #[label("this line")]
        span: SourceSpan,
    },

    #[error("cannot embed `{hole}` as a C literal: {reason}")]
    #[diagnostic(code(seqdrive::synth::escaping))]
    Escaping {
        hole: String,
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("template error: {message}")]
    #[diagnostic(code(seqdrive::synth::template))]
    Template { message: String },

    #[error("I/O error on {}", .path.display())]
    #[diagnostic(code(seqdrive::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in {}: {message}", .path.display())]
    #[diagnostic(code(seqdrive::config))]
    Config { path: PathBuf, message: String },
}

impl DriverError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            DriverError::MalformedLine { .. } => ErrorType::MalformedLine,
            DriverError::Escaping { .. } => ErrorType::Escaping,
            DriverError::Template { .. } => ErrorType::Template,
            DriverError::Io { .. } => ErrorType::Io,
            DriverError::Config { .. } => ErrorType::Config,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DriverError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn template(message: impl Into<String>) -> Self {
        DriverError::Template {
            message: message.into(),
        }
    }
}

/// Converts source text into a named source for span-carrying diagnostics.
pub fn to_error_source(name: impl AsRef<str>, text: impl Into<String>) -> SourceArc {
    Arc::new(NamedSource::new(name.as_ref(), text.into()))
}
