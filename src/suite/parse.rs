use std::path::PathBuf;

use crate::suite::{Suite, SuiteEntry};
use crate::testcase::ParamMap;
use crate::util::span::Span;

/// An error encountered while parsing a suite file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.span.line, self.span.col, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parses suite text into entries, preserving declaration order.
///
/// `name` becomes the suite name; callers pass the file stem.
///
/// # Errors
///
/// Returns a [`ParseError`] with the offending line and column for
/// malformed entries: missing testcase name, a bare word other than
/// `parallel`, duplicate keys, or an unterminated quoted value.
pub fn parse_suite(name: &str, input: &str) -> Result<Suite, ParseError> {
    let mut entries = Vec::new();
    for (idx, raw) in input.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        entries.push(parse_entry(line, line_no)?);
    }
    Ok(Suite {
        name: name.to_owned(),
        entries,
    })
}

fn parse_entry(line: &str, line_no: usize) -> Result<SuiteEntry, ParseError> {
    let mut chars = line.char_indices().peekable();
    let mut col: usize = 1;

    skip_spaces(&mut chars, &mut col);
    let entry_col = col;
    let testcase = read_word(&mut chars, &mut col);
    if testcase.is_empty() || testcase.contains('=') {
        return Err(ParseError {
            message: "expected testcase name".to_owned(),
            span: Span::new(line_no, entry_col),
        });
    }

    let mut params = ParamMap::new();
    let mut data = None;
    let mut parallel = false;

    loop {
        skip_spaces(&mut chars, &mut col);
        if chars.peek().is_none() {
            break;
        }
        let key_col = col;
        let key = read_key(&mut chars, &mut col);
        if key.is_empty() {
            return Err(ParseError {
                message: "expected key=value".to_owned(),
                span: Span::new(line_no, key_col),
            });
        }

        let value = if let Some(&(_, '=')) = chars.peek() {
            chars.next();
            col += 1;
            Some(read_value(&mut chars, &mut col, line_no)?)
        } else {
            None
        };

        match (key.as_str(), value) {
            ("parallel", None) => parallel = true,
            ("parallel", Some(v)) => match v.as_str() {
                "true" => parallel = true,
                "false" => parallel = false,
                other => {
                    return Err(ParseError {
                        message: format!("invalid parallel value '{other}', expected true or false"),
                        span: Span::new(line_no, key_col),
                    });
                }
            },
            ("data", Some(v)) => {
                if v.is_empty() {
                    return Err(ParseError {
                        message: "empty data path".to_owned(),
                        span: Span::new(line_no, key_col),
                    });
                }
                if data.is_some() {
                    return Err(ParseError {
                        message: "duplicate data reference".to_owned(),
                        span: Span::new(line_no, key_col),
                    });
                }
                data = Some(PathBuf::from(v));
            }
            ("data", None) => {
                return Err(ParseError {
                    message: "data requires a value".to_owned(),
                    span: Span::new(line_no, key_col),
                });
            }
            (_, None) => {
                return Err(ParseError {
                    message: format!("expected '=' after '{key}'"),
                    span: Span::new(line_no, key_col),
                });
            }
            (_, Some(v)) => {
                if params.insert(key.clone(), v).is_some() {
                    return Err(ParseError {
                        message: format!("duplicate parameter '{key}'"),
                        span: Span::new(line_no, key_col),
                    });
                }
            }
        }
    }

    Ok(SuiteEntry {
        testcase,
        params,
        data,
        parallel,
        span: Span::new(line_no, entry_col),
    })
}

type CharStream<'a> = std::iter::Peekable<std::str::CharIndices<'a>>;

fn skip_spaces(chars: &mut CharStream<'_>, col: &mut usize) {
    while let Some(&(_, c)) = chars.peek() {
        if c == ' ' || c == '\t' {
            chars.next();
            *col += 1;
        } else {
            break;
        }
    }
}

/// Reads up to the next whitespace. Used for the testcase name, where '='
/// has no special meaning and is caught as an error by the caller.
fn read_word(chars: &mut CharStream<'_>, col: &mut usize) -> String {
    let mut s = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if c == ' ' || c == '\t' {
            break;
        }
        s.push(c);
        chars.next();
        *col += 1;
    }
    s
}

/// Reads up to '=' or whitespace.
fn read_key(chars: &mut CharStream<'_>, col: &mut usize) -> String {
    let mut s = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if c == '=' || c == ' ' || c == '\t' {
            break;
        }
        s.push(c);
        chars.next();
        *col += 1;
    }
    s
}

/// Reads a value: a double-quoted string with backslash escapes, or a bare
/// word up to the next whitespace.
fn read_value(
    chars: &mut CharStream<'_>,
    col: &mut usize,
    line_no: usize,
) -> Result<String, ParseError> {
    if let Some(&(_, '"')) = chars.peek() {
        let start_col = *col;
        chars.next(); // skip opening quote
        *col += 1;
        let mut s = String::new();
        let mut terminated = false;
        while let Some(&(_, c)) = chars.peek() {
            chars.next();
            *col += 1;
            if c == '\\' {
                if let Some(&(_, escaped)) = chars.peek() {
                    chars.next();
                    *col += 1;
                    match escaped {
                        '"' => s.push('"'),
                        '\\' => s.push('\\'),
                        'n' => s.push('\n'),
                        't' => s.push('\t'),
                        other => {
                            s.push('\\');
                            s.push(other);
                        }
                    }
                }
            } else if c == '"' {
                terminated = true;
                break;
            } else {
                s.push(c);
            }
        }
        if !terminated {
            return Err(ParseError {
                message: "unterminated quoted value".to_owned(),
                span: Span::new(line_no, start_col),
            });
        }
        Ok(s)
    } else {
        Ok(read_word(chars, col))
    }
}
