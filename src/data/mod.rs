//! Tabular parameter files that fan one suite entry out into many units.
//!
//! A data file is an ordered list of flat rows. YAML and JSON files carry
//! the row keys themselves; anything else is read as comma-separated text
//! with a header row naming the columns. Loading and expansion are strict:
//! one bad row rejects the whole file so a truncated parameter set never
//! runs silently.

pub mod csv;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::testcase::{ParamMap, ParamSchema};

/// A loaded data file: column names plus raw rows in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTable {
    pub columns: Vec<String>,
    pub rows: Vec<ParamMap>,
}

/// One schema-checked row, paired with its 0-based position in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRow {
    pub index: usize,
    pub values: ParamMap,
}

/// Reads a data file, picking the format from the extension.
///
/// `.yaml`/`.yml` expect a sequence of mappings, `.json` an array of
/// objects. Every other extension is parsed as comma-separated text with
/// a header row.
///
/// # Errors
///
/// Returns a [`DataFormatError`] when the file cannot be read, does not
/// parse, or contains a non-scalar cell.
pub fn load_table(path: &Path) -> Result<DataTable, DataFormatError> {
    let text = std::fs::read_to_string(path).map_err(|e| DataFormatError {
        kind: DataFormatErrorKind::Io,
        row: None,
        message: format!("failed to read {}: {}", path.display(), e),
        detail: None,
    })?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let table = match ext.as_str() {
        "yaml" | "yml" => from_yaml(&text)?,
        "json" => from_json(&text)?,
        _ => from_csv(&text)?,
    };

    tracing::debug!(
        path = %path.display(),
        columns = table.columns.len(),
        rows = table.rows.len(),
        "data table loaded"
    );
    Ok(table)
}

/// Checks every row against a parameter schema, atomically.
///
/// The first bad row fails the whole expansion with its 0-based index.
/// Returned rows carry the values as read: schema defaults are not
/// materialized here, so later merging can still tell a row value from a
/// default.
///
/// # Errors
///
/// Returns a [`DataFormatError`] with `kind: Row` naming the first row
/// that misses a required parameter or fails type coercion.
pub fn expand(table: &DataTable, schema: &ParamSchema) -> Result<Vec<DataRow>, DataFormatError> {
    let mut rows = Vec::with_capacity(table.rows.len());
    for (index, values) in table.rows.iter().enumerate() {
        schema.validate(values).map_err(|violation| DataFormatError {
            kind: DataFormatErrorKind::Row,
            row: Some(index),
            message: violation.to_string(),
            detail: None,
        })?;
        rows.push(DataRow {
            index,
            values: values.clone(),
        });
    }
    Ok(rows)
}

fn from_csv(text: &str) -> Result<DataTable, DataFormatError> {
    let records = csv::parse_records(text).map_err(|e| DataFormatError {
        kind: DataFormatErrorKind::Syntax,
        row: None,
        message: e.to_string(),
        detail: None,
    })?;

    let Some((header, body)) = records.split_first() else {
        return Err(DataFormatError {
            kind: DataFormatErrorKind::Syntax,
            row: None,
            message: "missing header row".to_owned(),
            detail: None,
        });
    };

    let mut columns = Vec::with_capacity(header.fields.len());
    for name in &header.fields {
        if name.is_empty() {
            return Err(DataFormatError {
                kind: DataFormatErrorKind::Syntax,
                row: None,
                message: "empty column name in header".to_owned(),
                detail: Some(format!("line {}", header.line)),
            });
        }
        if columns.contains(name) {
            return Err(DataFormatError {
                kind: DataFormatErrorKind::Syntax,
                row: None,
                message: format!("duplicate column '{name}'"),
                detail: Some(format!("line {}", header.line)),
            });
        }
        columns.push(name.clone());
    }

    let mut rows = Vec::with_capacity(body.len());
    for (index, record) in body.iter().enumerate() {
        if record.fields.len() != columns.len() {
            return Err(DataFormatError {
                kind: DataFormatErrorKind::Row,
                row: Some(index),
                message: format!(
                    "row has {} fields, header has {}",
                    record.fields.len(),
                    columns.len()
                ),
                detail: Some(format!("line {}", record.line)),
            });
        }
        let values: ParamMap = columns
            .iter()
            .cloned()
            .zip(record.fields.iter().cloned())
            .collect();
        rows.push(values);
    }

    Ok(DataTable { columns, rows })
}

fn from_yaml(text: &str) -> Result<DataTable, DataFormatError> {
    let raw: Vec<BTreeMap<String, serde_yaml::Value>> =
        serde_yaml::from_str(text).map_err(|e| DataFormatError {
            kind: DataFormatErrorKind::Syntax,
            row: None,
            message: format!("invalid YAML data file: {e}"),
            detail: None,
        })?;

    let mut rows = Vec::with_capacity(raw.len());
    for (index, mapping) in raw.iter().enumerate() {
        let mut values = ParamMap::new();
        for (key, value) in mapping {
            values.insert(key.clone(), yaml_scalar(key, value, index)?);
        }
        rows.push(values);
    }
    Ok(DataTable {
        columns: column_union(&rows),
        rows,
    })
}

fn from_json(text: &str) -> Result<DataTable, DataFormatError> {
    let raw: Vec<BTreeMap<String, serde_json::Value>> =
        serde_json::from_str(text).map_err(|e| DataFormatError {
            kind: DataFormatErrorKind::Syntax,
            row: None,
            message: format!("invalid JSON data file: {e}"),
            detail: None,
        })?;

    let mut rows = Vec::with_capacity(raw.len());
    for (index, mapping) in raw.iter().enumerate() {
        let mut values = ParamMap::new();
        for (key, value) in mapping {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                other => {
                    return Err(non_scalar_cell(key, index, &format!("{other}")));
                }
            };
            values.insert(key.clone(), text);
        }
        rows.push(values);
    }
    Ok(DataTable {
        columns: column_union(&rows),
        rows,
    })
}

fn yaml_scalar(
    key: &str,
    value: &serde_yaml::Value,
    row: usize,
) -> Result<String, DataFormatError> {
    match value {
        serde_yaml::Value::String(s) => Ok(s.clone()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        other => Err(non_scalar_cell(
            key,
            row,
            serde_yaml::to_string(other)
                .unwrap_or_else(|_| "?".to_owned())
                .trim_end(),
        )),
    }
}

fn non_scalar_cell(key: &str, row: usize, rendered: &str) -> DataFormatError {
    DataFormatError {
        kind: DataFormatErrorKind::Row,
        row: Some(row),
        message: format!("column '{key}' is not a scalar"),
        detail: Some(rendered.to_owned()),
    }
}

fn column_union(rows: &[ParamMap]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

/// A data file could not be loaded or failed row validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFormatError {
    pub kind: DataFormatErrorKind,
    /// 0-based row index for row-scoped errors.
    pub row: Option<usize>,
    pub message: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormatErrorKind {
    Io,
    Syntax,
    Row,
}

impl fmt::Display for DataFormatErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DataFormatErrorKind::Io => "io error",
            DataFormatErrorKind::Syntax => "syntax error",
            DataFormatErrorKind::Row => "bad row",
        };
        write!(f, "{text}")
    }
}

impl fmt::Display for DataFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.row {
            Some(index) => write!(f, "{}: row {}: {}", self.kind, index, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for DataFormatError {}
