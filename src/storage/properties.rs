//! Reading and writing `.properties` text.
//!
//! The format follows the familiar `key=value` layout:
//!
//! - lines starting with `#` or `!` are comments
//! - the key ends at the first unescaped `=`, `:` or whitespace
//! - a trailing unescaped backslash continues the logical line
//! - `\t`, `\n`, `\r`, `\f`, `\uXXXX` and escaped punctuation are decoded
//!
//! Rendering is deterministic: entries are written in key order, and control
//! characters are escaped so that every entry fits on one physical line.

use std::{
    fmt::Write as _,
    io::{self, Read},
};

use super::Entries;

/// Whitespace that separates tokens. Other Unicode spaces are data.
const BLANKS: [char; 3] = [' ', '\t', '\x0c'];

/// Parses `.properties` text into a sorted map.
///
/// Input is read as UTF-8, falling back to ISO-8859-1 when it is not valid
/// UTF-8. Later definitions of a key replace earlier ones.
///
/// # Errors
///
/// Returns an [`io::ErrorKind::InvalidData`] error if the input contains a
/// malformed `\u` escape, and any error raised by `reader`.
pub fn parse<R: Read>(mut reader: R) -> io::Result<Entries> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let text = decode_text(bytes);

    let mut entries = Entries::new();
    let mut logical = String::new();

    for line in text.lines() {
        let trimmed = line.trim_start_matches(BLANKS);

        if logical.is_empty() && (trimmed.is_empty() || is_comment(trimmed)) {
            continue;
        }

        // Leading whitespace of continuation lines is dropped as well.
        if ends_with_continuation(trimmed) {
            logical.push_str(&trimmed[..trimmed.len() - 1]);
            continue;
        }

        logical.push_str(trimmed);
        let (key, value) = split_entry(&logical)?;
        entries.insert(key, value);
        logical.clear();
    }

    if !logical.is_empty() {
        let (key, value) = split_entry(&logical)?;
        entries.insert(key, value);
    }

    Ok(entries)
}

fn decode_text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|e| e.into_bytes().into_iter().map(char::from).collect())
}

/// Renders a map as `.properties` text.
#[must_use]
pub fn render(entries: &Entries) -> String {
    let mut out = String::new();
    for (key, value) in entries {
        escape_into(&mut out, key, true);
        out.push('=');
        escape_into(&mut out, value, false);
        out.push('\n');
    }
    out
}

fn is_comment(line: &str) -> bool {
    line.starts_with('#') || line.starts_with('!')
}

/// A line continues if it ends in an odd number of backslashes.
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1
}

fn split_entry(line: &str) -> io::Result<(String, String)> {
    let mut key_end = line.len();
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' | ' ' | '\t' | '\x0c' => {
                key_end = i;
                break;
            }
            _ => {}
        }
    }

    let raw_key = &line[..key_end];
    let mut rest = line[key_end..].trim_start_matches(BLANKS);
    if let Some(stripped) = rest.strip_prefix(['=', ':']) {
        rest = stripped.trim_start_matches(BLANKS);
    }

    Ok((unescape(raw_key)?, unescape(rest)?))
}

fn unescape(text: &str) -> io::Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    let mut pending_high: Option<u16> = None;

    while let Some(c) = chars.next() {
        if c != '\\' {
            flush_surrogate(&mut out, &mut pending_high);
            out.push(c);
            continue;
        }

        let Some(escaped) = chars.next() else {
            break;
        };

        if escaped == 'u' {
            let unit = read_code_unit(&mut chars)?;
            match (pending_high.take(), unit) {
                (Some(high), 0xDC00..=0xDFFF) => {
                    let combined =
                        0x10000 + ((u32::from(high) - 0xD800) << 10) + (u32::from(unit) - 0xDC00);
                    out.push(char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER));
                }
                (high, 0xD800..=0xDBFF) => {
                    if high.is_some() {
                        out.push(char::REPLACEMENT_CHARACTER);
                    }
                    pending_high = Some(unit);
                }
                (high, _) => {
                    if high.is_some() {
                        out.push(char::REPLACEMENT_CHARACTER);
                    }
                    out.push(char::from_u32(u32::from(unit)).unwrap_or(char::REPLACEMENT_CHARACTER));
                }
            }
            continue;
        }

        flush_surrogate(&mut out, &mut pending_high);
        out.push(match escaped {
            't' => '\t',
            'n' => '\n',
            'r' => '\r',
            'f' => '\x0c',
            other => other,
        });
    }

    flush_surrogate(&mut out, &mut pending_high);
    Ok(out)
}

fn flush_surrogate(out: &mut String, pending_high: &mut Option<u16>) {
    if pending_high.take().is_some() {
        out.push(char::REPLACEMENT_CHARACTER);
    }
}

fn read_code_unit(chars: &mut std::str::Chars<'_>) -> io::Result<u16> {
    let digits: String = chars.by_ref().take(4).collect();
    if digits.len() != 4 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Truncated \\u escape: '\\u{digits}'"),
        ));
    }
    u16::from_str_radix(&digits, 16).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Malformed \\u escape: '\\u{digits}'"),
        )
    })
}

fn escape_into(out: &mut String, text: &str, is_key: bool) {
    for (i, c) in text.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x0c' => out.push_str("\\f"),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            c if c.is_control() => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{unit:04X}");
                }
            }
            c => out.push(c),
        }
    }
}
