//! Terminal sinks for the CLI.
//!
//! The report goes to stdout through a [`StandardStream`]; errors and status
//! notes go to stderr.

use std::io::Write;

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

// ============================================================================
// STREAMS
// ============================================================================

pub fn color_choice(enabled: bool) -> ColorChoice {
    if enabled {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

pub fn stdout(colors: bool) -> StandardStream {
    StandardStream::stdout(color_choice(colors))
}

// ============================================================================
// STATUS AND ERRORS
// ============================================================================

/// Prints a short green note to stderr, e.g. where the JSON report went.
pub fn print_note(colors: bool, message: &str) {
    let mut stderr = StandardStream::stderr(color_choice(colors));
    let _ = stderr.set_color(ColorSpec::new().set_fg(Some(Color::Green)));
    let _ = write!(stderr, "note");
    let _ = stderr.reset();
    let _ = writeln!(stderr, ": {message}");
}

/// Renders an aborting error with miette's graphical handler.
pub fn print_error(error: miette::Report) {
    eprintln!("{error:?}");
}
