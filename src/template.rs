//! Structured source templates with typed, escaped holes.
//!
//! A [`Template`] is a list of fixed literal segments and named holes, written
//! `{{name}}` in template text. Holes are filled from typed [`Binding`]s, never
//! by raw text interpolation: a `CString` binding is always rendered as a
//! complete, escaped C string literal, and an `Ident` binding must be a valid C
//! identifier.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::diagnostics::{DriverError, Result};

const HOLE_OPEN: &str = "{{";
const HOLE_CLOSE: &str = "}}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Hole(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

/// A typed value for one hole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Rendered as a quoted, escaped C string literal.
    CString(String),
    Integer(u64),
    /// Must be a valid C identifier.
    Ident(String),
    /// Inserted verbatim. Only for text the driver itself produced.
    Raw(String),
}

#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: BTreeMap<String, Binding>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, hole: impl Into<String>, value: Binding) -> Self {
        self.values.insert(hole.into(), value);
        self
    }

    pub fn get(&self, hole: &str) -> Option<&Binding> {
        self.values.get(hole)
    }
}

impl Template {
    pub fn parse(text: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = text;

        while let Some(open) = rest.find(HOLE_OPEN) {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after_open = &rest[open + HOLE_OPEN.len()..];
            let close = after_open.find(HOLE_CLOSE).ok_or_else(|| {
                DriverError::template(format!(
                    "unterminated hole starting at `{}`",
                    preview(&rest[open..])
                ))
            })?;
            let name = after_open[..close].trim();
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(DriverError::template(format!("invalid hole name `{name}`")));
            }
            segments.push(Segment::Hole(name.to_string()));
            rest = &after_open[close + HOLE_CLOSE.len()..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Hole names in order of first appearance.
    pub fn holes(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for segment in &self.segments {
            if let Segment::Hole(name) = segment {
                if !seen.contains(&name.as_str()) {
                    seen.push(name.as_str());
                }
            }
        }
        seen
    }

    /// Renders the template. Every hole needs a binding and every binding needs
    /// a hole.
    pub fn fill(&self, bindings: &Bindings) -> Result<String> {
        let holes = self.holes();

        let missing: Vec<&str> = holes
            .iter()
            .copied()
            .filter(|hole| bindings.get(hole).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(DriverError::template(format!(
                "no binding for hole(s): {}",
                missing.join(", ")
            )));
        }
        if let Some(extra) = bindings.values.keys().find(|k| !holes.contains(&k.as_str())) {
            return Err(DriverError::template(format!(
                "binding `{extra}` does not match any hole"
            )));
        }

        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Hole(name) => {
                    // Presence was checked above.
                    if let Some(binding) = bindings.get(name) {
                        out.push_str(&render(name, binding)?);
                    }
                }
            }
        }
        Ok(out)
    }
}

fn render(hole: &str, binding: &Binding) -> Result<String> {
    match binding {
        Binding::CString(text) => c_string_literal(hole, text),
        Binding::Integer(n) => Ok(n.to_string()),
        Binding::Ident(name) => {
            if is_c_identifier(name) {
                Ok(name.clone())
            } else {
                Err(DriverError::Escaping {
                    hole: hole.to_string(),
                    reason: format!("`{name}` is not a valid C identifier"),
                    help: Some("check the engine entry-point names in the configuration".into()),
                })
            }
        }
        Binding::Raw(text) => Ok(text.clone()),
    }
}

pub fn is_c_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Escapes `text` as the body of a C string literal (without the quotes).
///
/// The literal's bytes equal the UTF-8 bytes of `text`: non-printable and
/// non-ASCII bytes become three-digit octal escapes, and `?` is escaped so no
/// trigraph can form. NUL cannot be carried through the engine's C strings and
/// is rejected.
pub fn escape_c_string(hole: &str, text: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len() + 2);
    for (pos, byte) in text.bytes().enumerate() {
        match byte {
            0 => {
                return Err(DriverError::Escaping {
                    hole: hole.to_string(),
                    reason: format!("NUL byte at offset {pos}"),
                    help: Some("remove the NUL character from the fixture line".into()),
                })
            }
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            b'?' => out.push_str("\\?"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(byte as char),
            _ => {
                let _ = write!(out, "\\{byte:03o}");
            }
        }
    }
    Ok(out)
}

/// Escapes `text` into a complete, quoted C string literal.
pub fn c_string_literal(hole: &str, text: &str) -> Result<String> {
    Ok(format!("\"{}\"", escape_c_string(hole, text)?))
}

/// Decodes the body of a C string literal back into text.
pub fn unescape_c_literal(body: &str) -> std::result::Result<String, String> {
    let bytes = body.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let escape = *bytes
            .get(i + 1)
            .ok_or_else(|| "dangling backslash".to_string())?;
        i += 2;
        match escape {
            b'\\' | b'"' | b'\'' | b'?' => out.push(escape),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'v' => out.push(0x0b),
            b'0'..=b'7' => {
                let mut value = u32::from(escape - b'0');
                let mut digits = 1;
                while digits < 3 && i < bytes.len() && (b'0'..=b'7').contains(&bytes[i]) {
                    value = value * 8 + u32::from(bytes[i] - b'0');
                    i += 1;
                    digits += 1;
                }
                let byte = u8::try_from(value)
                    .map_err(|_| format!("octal escape \\{value:o} out of range"))?;
                out.push(byte);
            }
            other => return Err(format!("unsupported escape `\\{}`", other as char)),
        }
    }

    String::from_utf8(out).map_err(|e| format!("literal is not UTF-8: {e}"))
}

/// Returns the decoded contents of every string literal in C `source`, in
/// order. Character literals are skipped.
pub fn extract_string_literals(source: &str) -> std::result::Result<Vec<String>, String> {
    let bytes = source.as_bytes();
    let mut literals = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let quote = bytes[i];
        if quote != b'"' && quote != b'\'' {
            i += 1;
            continue;
        }
        let start = i + 1;
        let mut j = start;
        while j < bytes.len() && bytes[j] != quote {
            j += if bytes[j] == b'\\' { 2 } else { 1 };
        }
        if j >= bytes.len() {
            return Err(format!("unterminated literal at byte {i}"));
        }
        if quote == b'"' {
            literals.push(unescape_c_literal(&source[start..j])?);
        }
        i = j + 1;
    }

    Ok(literals)
}

fn preview(text: &str) -> String {
    text.chars().take(24).collect()
}
