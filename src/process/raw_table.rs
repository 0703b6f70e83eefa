use csv::ReaderBuilder;
use std::{fs::File, io::Read, path::Path};

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    /// Column names as the file claims them, trimmed.
    pub headers: Vec<String>,
    /// Each data row as read, one String per field.
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Decode a CSV stream with one header row. Ragged records and invalid
    /// UTF-8 fail the whole file; `key` is only used for error context.
    pub fn from_reader<R: Read>(reader: R, key: &str) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let read_err = |source| PipelineError::FileRead {
            key: key.to_string(),
            source,
        };

        let headers: Vec<String> = rdr
            .headers()
            .map_err(read_err)?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record.map_err(read_err)?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, rows })
    }

    pub fn from_path(path: &Path, key: &str) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file, key)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_header_and_rows() {
        let csv = "\u{feff}a, b ,c\n1,2,3\n4,,6\n";
        let table = RawTable::from_reader(csv.as_bytes(), "input/t.csv").unwrap();
        assert_eq!(table.headers, vec!["a", "b", "c"]);
        assert_eq!(table.rows[1], vec!["4", "", "6"]);
        assert_eq!(table.column_index("b"), Some(1));
    }

    #[test]
    fn header_only_file_has_no_rows() {
        let table = RawTable::from_reader("a,b\n".as_bytes(), "k").unwrap();
        assert_eq!(table.num_rows(), 0);
    }

    #[test]
    fn ragged_record_is_a_read_failure() {
        let err = RawTable::from_reader("a,b\n1,2,3\n".as_bytes(), "input/bad.csv").unwrap_err();
        match err {
            PipelineError::FileRead { key, .. } => assert_eq!(key, "input/bad.csv"),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
