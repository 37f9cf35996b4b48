//! Text dictionary source parser.
//!
//! The builder's input format mirrors the on-disk header: `name=value`
//! property lines terminated by a blank line, then entry groups — one
//! keyword line followed by its description lines, closed by a blank line.
//! Description lines are joined with single spaces.

use std::collections::BTreeMap;

use glosa_core::builder::BuildError;
use glosa_core::escape::unescape;

/// Line iterator that tracks line numbers for error messages and strips
/// carriage returns.
pub struct LineCursor<'a> {
    lines: std::str::Lines<'a>,
    line_no: usize,
}

impl<'a> LineCursor<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines(),
            line_no: 0,
        }
    }

    pub fn next_line(&mut self) -> Option<&'a str> {
        self.lines.next().map(|line| {
            self.line_no += 1;
            line.trim_end_matches('\r')
        })
    }

    pub fn line_no(&self) -> usize {
        self.line_no
    }
}

/// Read property lines into `properties` until a blank line or the end of
/// input. Names and values go through the escape codec, exactly like the
/// on-disk header.
pub fn parse_properties(
    cursor: &mut LineCursor,
    properties: &mut BTreeMap<String, String>,
) -> Result<(), BuildError> {
    while let Some(line) = cursor.next_line() {
        if line.is_empty() {
            break;
        }
        let Some(eq) = line.find('=') else {
            return Err(BuildError::Usage(format!(
                "line {}: '=' missing in the property line: '{line}'",
                cursor.line_no()
            )));
        };
        let name = String::from_utf8_lossy(&unescape(line[..eq].as_bytes())).into_owned();
        let value = String::from_utf8_lossy(&unescape(line[eq + 1..].as_bytes())).into_owned();
        properties.insert(name, value);
    }
    Ok(())
}

/// Read entry groups until the end of input. A keyword without any
/// description line is a usage error carrying the offending line number.
pub fn parse_entries(cursor: &mut LineCursor) -> Result<Vec<(String, String)>, BuildError> {
    let mut entries = Vec::new();
    loop {
        let keyword = loop {
            match cursor.next_line() {
                None => return Ok(entries),
                Some("") => continue,
                Some(line) => break line.to_owned(),
            }
        };

        let mut description = String::new();
        while let Some(line) = cursor.next_line() {
            if line.is_empty() {
                break;
            }
            if !description.is_empty() {
                description.push(' ');
            }
            description.push_str(line);
        }
        if description.is_empty() {
            return Err(BuildError::Usage(format!(
                "line {}: missing description for item '{keyword}'",
                cursor.line_no()
            )));
        }

        entries.push((keyword, description));
    }
}
