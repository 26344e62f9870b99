// chainlab/src/table.rs
//!
//! Batch tables: the row data behind a batch-input component
//!
//! Tables come from two places:
//! - local CSV / TSV / TXT files, read with the `csv` crate,
//! - file records loaded from the backend, whose content is a column-major
//!   JSON document (`{"column": {"0": value, "1": value}}`).
//!
//! Each row turns into a list of `{Field, Value}` pairs, one placeholder per
//! column.

use crate::component::BatchField;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Upload limit enforced before a file is read.
pub const MAX_TABLE_FILE_BYTES: u64 = 15 * 1024 * 1024;

/// Row limit the backend applies to uploaded tables.
pub const MAX_TABLE_ROWS: usize = 3000;

const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "tsv", "txt"];

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("Only TSV/TXT/CSV files are supported.")]
    UnsupportedFileType(String),
    #[error("Only files smaller than 15MB are supported.")]
    TooLarge(u64),
    #[error("Only tables with less than {MAX_TABLE_ROWS} rows are supported.")]
    TooManyRows(usize),
    #[error("Unsupported data format: {0}")]
    Format(String),
    /// `row` is 0-based; the message shows it 1-based.
    #[error("row {} is out of range for a table with {} rows", .row + 1, .len)]
    RowOutOfRange { row: usize, len: usize },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// File record returned by the backend's file endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub size: u64,
    /// For tables, a JSON document encoded as a string.
    #[serde(default)]
    pub content: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, TableError> {
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(TableError::Format(format!(
                "row {index} has {} cells, expected {}",
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    /// Reads a local table file after checking its extension and size.
    pub fn from_path(path: &Path) -> Result<Self, TableError> {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default();
        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(TableError::UnsupportedFileType(extension));
        }

        let size = std::fs::metadata(path)?.len();
        if size > MAX_TABLE_FILE_BYTES {
            return Err(TableError::TooLarge(size));
        }

        let mut reader = BufReader::new(File::open(path)?);
        let delimiter = match extension.as_str() {
            "csv" => b',',
            "tsv" => b'\t',
            _ => sniff_delimiter(&mut reader)?,
        };
        Self::from_reader(reader, delimiter)
    }

    /// Parses delimited text with a header row.
    pub fn from_reader<R: Read>(reader: R, delimiter: u8) -> Result<Self, TableError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let columns = csv_reader
            .headers()?
            .iter()
            .map(|header| header.trim().to_string())
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
            if rows.len() > MAX_TABLE_ROWS {
                return Err(TableError::TooManyRows(rows.len()));
            }
        }

        tracing::debug!(columns = columns.len(), rows = rows.len(), "table parsed");
        Self::new(columns, rows)
    }

    /// Builds a table from column-major JSON; a `key` column becomes `key_user`.
    pub fn from_column_json(value: &Value) -> Result<Self, TableError> {
        let object = value
            .as_object()
            .ok_or_else(|| TableError::Format("expected a JSON object of columns".into()))?;

        let mut columns = Vec::with_capacity(object.len());
        let mut cells: Vec<Vec<String>> = Vec::with_capacity(object.len());
        for (name, values) in object {
            let column_name = if name == "key" {
                "key_user".to_string()
            } else {
                name.clone()
            };
            columns.push(column_name);
            cells.push(column_values(values));
        }

        let row_count = cells.iter().map(Vec::len).max().unwrap_or(0);
        let rows = (0..row_count)
            .map(|row| {
                cells
                    .iter()
                    .map(|column| column.get(row).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();

        Self::new(columns, rows)
    }

    /// Builds a table from a backend file record of type `Table`.
    pub fn from_file_record(record: &FileRecord) -> Result<Self, TableError> {
        if record.kind != "Table" {
            return Err(TableError::Format(format!(
                "file {} is of type '{}'",
                record.id, record.kind
            )));
        }

        let content = match &record.content {
            Some(Value::String(encoded)) => serde_json::from_str::<Value>(encoded)
                .map_err(|e| TableError::Format(format!("invalid table content: {e}")))?,
            Some(other @ Value::Object(_)) => other.clone(),
            _ => return Err(TableError::Format(format!("file {} has no content", record.id))),
        };

        Self::from_column_json(&content)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, row: usize) -> Option<&[String]> {
        self.rows.get(row).map(Vec::as_slice)
    }

    /// The placeholder pairs for one row.
    pub fn row_fields(&self, row: usize) -> Result<Vec<BatchField>, TableError> {
        let cells = self.rows.get(row).ok_or(TableError::RowOutOfRange {
            row,
            len: self.rows.len(),
        })?;

        Ok(self
            .columns
            .iter()
            .zip(cells)
            .map(|(column, value)| BatchField::new(column.clone(), value.clone()))
            .collect())
    }
}

fn sniff_delimiter<R: BufRead>(reader: &mut R) -> Result<u8, TableError> {
    let buffer = reader.fill_buf()?;
    let first_line = buffer.split(|b| *b == b'\n').next().unwrap_or_default();
    if first_line.contains(&b'\t') {
        Ok(b'\t')
    } else if first_line.contains(&b',') {
        Ok(b',')
    } else {
        Err(TableError::Format("plain text is not a table".into()))
    }
}

fn column_values(values: &Value) -> Vec<String> {
    match values {
        Value::Object(by_index) => {
            let mut indexed: Vec<(usize, String)> = by_index
                .iter()
                .enumerate()
                .map(|(position, (key, value))| {
                    (key.parse::<usize>().unwrap_or(position), cell_text(value))
                })
                .collect();
            indexed.sort_by_key(|(index, _)| *index);
            indexed.into_iter().map(|(_, value)| value).collect()
        }
        Value::Array(items) => items.iter().map(cell_text).collect(),
        scalar => vec![cell_text(scalar)],
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn parses_csv_with_header() {
        let data = "name,city\nAlice,Oslo\nBob,Lima\n";
        let table = Table::from_reader(data.as_bytes(), b',').unwrap();

        assert_eq!(table.columns(), ["name", "city"]);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.row_fields(1).unwrap(),
            vec![BatchField::new("name", "Bob"), BatchField::new("city", "Lima")]
        );
    }

    #[test]
    fn row_out_of_range_is_an_error() {
        let table = Table::from_reader("a\n1\n".as_bytes(), b',').unwrap();
        assert!(matches!(
            table.row_fields(3),
            Err(TableError::RowOutOfRange { row: 3, len: 1 })
        ));
    }

    #[test]
    fn out_of_range_message_counts_rows_from_one() {
        let table = Table::from_reader("a\n1\n2\n".as_bytes(), b',').unwrap();
        let err = table.row_fields(4).unwrap_err();
        assert_eq!(err.to_string(), "row 5 is out of range for a table with 2 rows");
    }

    #[test]
    fn reads_column_major_json_in_row_order() {
        let content = json!({
            "question": { "0": "first", "1": "second", "10": "eleventh", "2": "third" },
            "key": { "0": 1, "1": 2, "10": null, "2": true }
        });

        let table = Table::from_column_json(&content).unwrap();
        assert_eq!(table.columns(), ["question", "key_user"]);
        assert_eq!(table.len(), 4);
        assert_eq!(table.row(2).unwrap(), ["third", "true"]);
        assert_eq!(table.row(3).unwrap(), ["eleventh", ""]);
    }

    #[test]
    fn file_record_must_be_a_table() {
        let record = FileRecord {
            id: "f1".into(),
            name: "notes.txt".into(),
            kind: "Plain Text".into(),
            size: 4,
            content: Some(json!({ "text": "hi" })),
        };
        assert!(matches!(
            Table::from_file_record(&record),
            Err(TableError::Format(_))
        ));

        let record = FileRecord {
            kind: "Table".into(),
            content: Some(Value::String(r#"{"q":{"0":"why"}}"#.into())),
            ..record
        };
        let table = Table::from_file_record(&record).unwrap();
        assert_eq!(table.row_fields(0).unwrap(), vec![BatchField::new("q", "why")]);
    }

    #[test]
    fn rejects_unsupported_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.xlsx");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();

        assert!(matches!(
            Table::from_path(&path),
            Err(TableError::UnsupportedFileType(ext)) if ext == "xlsx"
        ));
    }

    #[test]
    fn sniffs_tabs_in_txt_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "topic\ttone").unwrap();
        writeln!(file, "rust, briefly\tdry").unwrap();
        drop(file);

        let table = Table::from_path(&path).unwrap();
        assert_eq!(table.columns(), ["topic", "tone"]);
        assert_eq!(table.row(0).unwrap(), ["rust, briefly", "dry"]);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let result = Table::new(vec!["a".into()], vec![vec!["1".into(), "2".into()]]);
        assert!(matches!(result, Err(TableError::Format(_))));
    }
}
