//! Comma-separated text, the default data-file format.
//!
//! Line-oriented: one record per line, `#` comment lines and blank lines
//! skipped. Fields may be double-quoted; a doubled quote inside a quoted
//! field is a literal quote. Quoted fields do not span lines. Whitespace
//! around bare fields is trimmed, quoted fields keep theirs.

use crate::util::span::Span;

/// One parsed record with the 1-based source line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub fields: Vec<String>,
    pub line: usize,
}

/// An error encountered while splitting a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvError {
    pub message: String,
    pub span: Span,
}

impl std::fmt::Display for CsvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.span.line, self.span.col, self.message)
    }
}

impl std::error::Error for CsvError {}

/// Splits input into records, dropping comments and blank lines.
///
/// # Errors
///
/// Returns a [`CsvError`] for an unterminated quoted field or stray text
/// after a closing quote.
pub fn parse_records(input: &str) -> Result<Vec<Record>, CsvError> {
    let mut records = Vec::new();
    for (idx, raw) in input.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        records.push(Record {
            fields: split_line(line, line_no)?,
            line: line_no,
        });
    }
    Ok(records)
}

fn split_line(line: &str, line_no: usize) -> Result<Vec<String>, CsvError> {
    let mut fields = Vec::new();
    let mut chars = line.char_indices().peekable();
    let mut col: usize = 1;

    loop {
        // Skip whitespace before the field.
        while let Some(&(_, c)) = chars.peek() {
            if c == ' ' || c == '\t' {
                chars.next();
                col += 1;
            } else {
                break;
            }
        }

        if let Some(&(_, '"')) = chars.peek() {
            let start_col = col;
            chars.next(); // skip opening quote
            col += 1;

            let mut s = String::new();
            let mut terminated = false;
            while let Some(&(_, c)) = chars.peek() {
                chars.next();
                col += 1;
                if c == '"' {
                    if let Some(&(_, '"')) = chars.peek() {
                        chars.next();
                        col += 1;
                        s.push('"');
                    } else {
                        terminated = true;
                        break;
                    }
                } else {
                    s.push(c);
                }
            }
            if !terminated {
                return Err(CsvError {
                    message: "unterminated quoted field".to_owned(),
                    span: Span::new(line_no, start_col),
                });
            }
            fields.push(s);

            // Only whitespace may sit between the closing quote and the
            // separator.
            while let Some(&(_, c)) = chars.peek() {
                if c == ' ' || c == '\t' {
                    chars.next();
                    col += 1;
                } else {
                    break;
                }
            }
            match chars.peek() {
                Some(&(_, ',')) => {
                    chars.next();
                    col += 1;
                }
                Some(&(_, other)) => {
                    return Err(CsvError {
                        message: format!("unexpected '{other}' after closing quote"),
                        span: Span::new(line_no, col),
                    });
                }
                None => return Ok(fields),
            }
        } else {
            // Bare field: everything up to the next comma, trimmed.
            let mut s = String::new();
            let mut saw_comma = false;
            while let Some(&(_, c)) = chars.peek() {
                chars.next();
                col += 1;
                if c == ',' {
                    saw_comma = true;
                    break;
                }
                s.push(c);
            }
            fields.push(s.trim().to_owned());
            if !saw_comma {
                return Ok(fields);
            }
        }
    }
}
