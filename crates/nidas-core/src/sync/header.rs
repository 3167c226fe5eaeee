// SPDX-License-Identifier: GPL-2.0-or-later

//! Sync-record header: text, terminated by `#`, describing every
//! variable's offset, type, and rate grouping.
//!
//! ```text
//! project="..." aircraft="..." flight="..." software_version="..."
//! variables { name type-letter length "units" "long_name" [cal] "converted_units" ; ... }
//! rates { rate var var var ... ; rate var ... ; }
//! #
//! ```

use crate::sample::{NumericKind, SampleTag};
use std::fmt::Write as _;

/// Type letter for a variable's `NumericKind`.
pub fn type_letter(kind: NumericKind) -> char {
    match kind {
        NumericKind::Continuous => 'n',
        NumericKind::Counter => 'c',
        NumericKind::Clock => 't',
        NumericKind::Other => 'o',
    }
}

pub fn kind_from_letter(c: char) -> Option<NumericKind> {
    match c {
        'n' => Some(NumericKind::Continuous),
        'c' => Some(NumericKind::Counter),
        't' => Some(NumericKind::Clock),
        'o' => Some(NumericKind::Other),
        _ => None,
    }
}

/// One parsed/written variable entry in the header's `variables {}` block.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderVariable {
    pub name: String,
    pub kind: NumericKind,
    pub length: usize,
    pub units: String,
    pub long_name: String,
    pub converted_units: Option<String>,
}

/// One tag's worth of header metadata (its variables plus the tag's id
/// and rate, needed to reconstruct `SyncRecordSource`-style offsets).
#[derive(Debug, Clone)]
pub struct HeaderTag {
    pub id: u32,
    pub rate: f64,
    pub variables: Vec<HeaderVariable>,
}

pub struct HeaderFields {
    pub project: String,
    pub aircraft: String,
    pub flight: String,
    pub software_version: String,
}

/// Render the keyed quoted values plus `variables {}`/`rates {}` blocks,
/// terminated by `#`.
pub fn write_header(fields: &HeaderFields, tags: &[HeaderTag]) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "project=\"{}\" aircraft=\"{}\" flight=\"{}\" software_version=\"{}\"\n",
        fields.project, fields.aircraft, fields.flight, fields.software_version
    );

    out.push_str("variables {\n");
    for tag in tags {
        for v in &tag.variables {
            let _ = write!(
                out,
                "  {} {} {} \"{}\" \"{}\"",
                v.name,
                type_letter(v.kind),
                v.length,
                v.units,
                v.long_name
            );
            if let Some(cu) = &v.converted_units {
                let _ = write!(out, " \"{}\"", cu);
            }
            out.push_str(" ;\n");
        }
    }
    out.push_str("}\n");

    // One line per tag, even when two tags share a rate: that keeps the
    // tag (and thus row-stride) boundary unambiguous for the reader,
    // rather than merging same-rate tags into a single line.
    out.push_str("rates {\n");
    for tag in tags {
        let _ = write!(out, "  {}", tag.rate);
        for v in &tag.variables {
            let _ = write!(out, " {}", v.name);
        }
        out.push_str(" ;\n");
    }
    out.push_str("}\n#\n");
    out
}

/// Parse the leading `key="value" key="value" ...` preamble line, up to
/// (not including) the `variables {` block.
pub fn parse_keyed_fields(preamble: &str) -> HeaderFields {
    let mut map = std::collections::HashMap::new();
    let mut rest = preamble;
    while let Some(eq) = rest.find('=') {
        let key = rest[..eq].trim().to_string();
        rest = &rest[eq + 1..];
        let Some(open) = rest.find('"') else { break };
        let after = &rest[open + 1..];
        let Some(close) = after.find('"') else { break };
        map.insert(key, after[..close].to_string());
        rest = &after[close + 1..];
    }
    HeaderFields {
        project: map.remove("project").unwrap_or_default(),
        aircraft: map.remove("aircraft").unwrap_or_default(),
        flight: map.remove("flight").unwrap_or_default(),
        software_version: map.remove("software_version").unwrap_or_default(),
    }
}

/// Tokenizer shared by the header and cal-file parsers: quoted strings
/// and backslash escapes, matching the scanner's separator-escape
/// conventions.
pub struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Tokenizer { input, pos: 0 }
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    /// Next whitespace-delimited token, or a quoted string (without the
    /// surrounding quotes, escapes resolved), or a single punctuation
    /// character (`{`, `}`, `;`, `#`).
    pub fn next_token(&mut self) -> Option<String> {
        self.skip_ws();
        let c = self.peek_char()?;
        if c == '"' {
            self.pos += 1;
            let mut s = String::new();
            while let Some(c) = self.peek_char() {
                self.pos += c.len_utf8();
                if c == '"' {
                    return Some(s);
                }
                if c == '\\' {
                    if let Some(next) = self.peek_char() {
                        self.pos += next.len_utf8();
                        s.push(match next {
                            'n' => '\n',
                            'r' => '\r',
                            't' => '\t',
                            other => other,
                        });
                        continue;
                    }
                }
                s.push(c);
            }
            return Some(s);
        }
        if c == '{' || c == '}' || c == ';' || c == '#' {
            self.pos += c.len_utf8();
            return Some(c.to_string());
        }
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() || c == '{' || c == '}' || c == ';' || c == '#' {
                break;
            }
            self.pos += c.len_utf8();
        }
        Some(self.input[start..self.pos].to_string())
    }
}
