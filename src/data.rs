//! Dataset handle passed into the execution namespace.
//!
//! The core does not parse data beyond the header row: the executor's Python
//! side materializes the dataframe. What the orchestrator needs here is a
//! stable list of column names for schema checks and prompt construction.

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{PlotError, Result};

/// A dataframe-like handle: a CSV file plus its column names.
#[derive(Debug, Clone)]
pub struct Dataset {
    csv_path: PathBuf,
    columns: Vec<String>,
}

impl Dataset {
    /// Open a CSV dataset, reading only the header row.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let header = contents
            .lines()
            .next()
            .ok_or_else(|| PlotError::Dataset(format!("{}: empty file", path.display())))?;
        let columns = parse_header(header);
        if columns.is_empty() {
            return Err(PlotError::Dataset(format!(
                "{}: no columns in header",
                path.display()
            )));
        }
        Ok(Self {
            csv_path: path.to_path_buf(),
            columns,
        })
    }

    /// Construct from known parts (used by callers that manage their own IO).
    pub fn with_columns(csv_path: impl Into<PathBuf>, columns: Vec<String>) -> Self {
        Self {
            csv_path: csv_path.into(),
            columns,
        }
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

/// Split a CSV header row, honoring double-quoted fields.
fn parse_header(header: &str) -> Vec<String> {
    let mut columns = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = header.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                columns.push(field.trim().to_string());
                field.clear();
            }
            _ => field.push(c),
        }
    }
    columns.push(field.trim().to_string());
    columns.retain(|c| !c.is_empty());
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_header_columns() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sale price,country,year").unwrap();
        writeln!(file, "100,TH,2024").unwrap();
        let dataset = Dataset::from_csv(file.path()).unwrap();
        assert_eq!(dataset.columns(), ["sale price", "country", "year"]);
        assert!(dataset.has_column("sale price"));
        assert!(!dataset.has_column("price"));
    }

    #[test]
    fn quoted_header_fields() {
        assert_eq!(
            parse_header(r#""sale, net",country,"says ""hi""""#),
            vec!["sale, net", "country", "says \"hi\""]
        );
    }

    #[test]
    fn empty_file_is_an_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            Dataset::from_csv(file.path()),
            Err(PlotError::Dataset(_))
        ));
    }
}
