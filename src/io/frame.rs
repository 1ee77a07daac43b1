//! Polars DataFrame helpers shared by the loaders and the stage files.
//!
//! Every CSV is read with schema inference disabled, so all columns arrive as
//! strings and numeric coercion happens here: unparseable cells ("X", "-",
//! footnote markers) become missing values instead of failing the read.

use std::{fs::File, io::Cursor, path::Path};

use anyhow::{Context, Result};
use polars::{
    frame::DataFrame,
    io::{SerReader, SerWriter},
    prelude::{Column, CsvReadOptions, CsvReader, CsvWriter, NamedFrom},
    series::Series,
};

fn string_options() -> CsvReadOptions {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
}

/// Reads a CSV file from `path` into a DataFrame of string columns.
pub fn read_csv(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)
        .with_context(|| format!("[io::frame] Failed to open CSV file: {}", path.display()))?;
    string_options()
        .into_reader_with_file_handle(file)
        .finish()
        .with_context(|| format!("[io::frame] Failed to read CSV from {}", path.display()))
}

/// Reads CSV bytes (bundled tables, HTTP bodies) into a DataFrame of string columns.
pub fn read_csv_bytes(bytes: &[u8]) -> Result<DataFrame> {
    CsvReader::new(Cursor::new(bytes.to_vec()))
        .with_options(string_options())
        .finish()
        .context("[io::frame] Failed to read CSV from bytes")
}

/// Byte offset of the first line containing `marker` (case-insensitive).
pub fn header_offset(text: &str, marker: &str) -> Option<usize> {
    let marker = marker.to_ascii_lowercase();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.to_ascii_lowercase().contains(&marker) {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

/// Reads a spreadsheet export whose header is the first line containing
/// `marker`. Title and note lines above it are skipped, and rows longer than
/// the header are truncated.
pub fn read_csv_after_header(text: &str, marker: &str) -> Result<DataFrame> {
    let start = header_offset(text, marker)
        .with_context(|| format!("[io::frame] No header row containing '{}'", marker))?;
    CsvReader::new(Cursor::new(text.as_bytes()[start..].to_vec()))
        .with_options(string_options().map_parse_options(|o| o.with_truncate_ragged_lines(true)))
        .finish()
        .context("[io::frame] Failed to read spreadsheet CSV")
}

/// Write a DataFrame to a CSV file, creating parent directories.
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("[io::frame] Failed to create directory {}", parent.display()))?;
    }
    let file = File::create(path)
        .with_context(|| format!("[io::frame] Failed to create CSV file: {}", path.display()))?;
    CsvWriter::new(file)
        .finish(df)
        .with_context(|| format!("[io::frame] Failed to write CSV to {}", path.display()))
}

/// Case-insensitive, whitespace-trimmed lookup of a column name.
pub fn find_column(df: &DataFrame, name: &str) -> Option<String> {
    df.get_column_names()
        .into_iter()
        .find(|c| c.trim().eq_ignore_ascii_case(name))
        .map(|c| c.to_string())
}

/// First column whose name contains any of `needles` (case-insensitive).
pub fn find_column_containing(df: &DataFrame, needles: &[&str]) -> Option<String> {
    df.get_column_names()
        .into_iter()
        .find(|c| {
            let lower = c.to_ascii_lowercase();
            needles.iter().any(|n| lower.contains(n))
        })
        .map(|c| c.to_string())
}

/// Read a column as trimmed strings; blank cells become `None`.
pub fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let actual = find_column(df, name)
        .with_context(|| format!("[io::frame] Missing required column '{}'", name))?;
    let column = df.column(&actual)?;
    let values = column
        .as_materialized_series()
        .str()
        .with_context(|| format!("[io::frame] Column '{}' is not a string column", name))?
        .into_iter()
        .map(|cell| {
            cell.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .collect();
    Ok(values)
}

/// Read a column as numbers, coercing unparseable cells to `None`.
pub fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    Ok(string_column(df, name)?
        .into_iter()
        .map(|cell| cell.as_deref().and_then(parse_number))
        .collect())
}

/// Like [`numeric_column`] but `Ok(None)` when the column is absent.
pub fn optional_numeric_column(df: &DataFrame, name: &str) -> Result<Option<Vec<Option<f64>>>> {
    if find_column(df, name).is_none() {
        return Ok(None);
    }
    numeric_column(df, name).map(Some)
}

/// Parse a numeric cell, tolerating thousands separators, currency signs and
/// percent signs. Returns `None` for anything else.
pub fn parse_number(s: &str) -> Option<f64> {
    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '%' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Build a string column.
pub fn str_col(name: &str, values: Vec<Option<String>>) -> Column {
    Series::new(name.into(), values).into()
}

/// Build a nullable float column.
pub fn f64_col(name: &str, values: Vec<Option<f64>>) -> Column {
    Series::new(name.into(), values).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("1,234.5"), Some(1234.5));
        assert_eq!(parse_number(" $12 "), Some(12.0));
        assert_eq!(parse_number("4.5%"), Some(4.5));
        assert_eq!(parse_number("-7"), Some(-7.0));
        assert_eq!(parse_number("X"), None);
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("NaN"), None);
    }

    #[test]
    fn test_read_bytes_coerces_numbers() {
        let csv = "State,Amount\nCA, \"1,000\"\nTX,X\nNY,\n";
        let df = read_csv_bytes(csv.as_bytes()).unwrap();
        let states = string_column(&df, "state").unwrap();
        let amounts = numeric_column(&df, "amount").unwrap();

        assert_eq!(
            states,
            vec![Some("CA".to_string()), Some("TX".to_string()), Some("NY".to_string())]
        );
        assert_eq!(amounts, vec![Some(1000.0), None, None]);
    }

    #[test]
    fn test_missing_column_is_error() {
        let df = read_csv_bytes(b"a,b\n1,2\n").unwrap();
        assert!(string_column(&df, "c").is_err());
        assert!(optional_numeric_column(&df, "c").unwrap().is_none());
        assert_eq!(optional_numeric_column(&df, "B").unwrap(), Some(vec![Some(2.0)]));
    }

    #[test]
    fn test_find_column_containing() {
        let df = read_csv_bytes(b"State Name,Total Benefits\nX,1\n").unwrap();
        assert_eq!(
            find_column_containing(&df, &["benefit"]),
            Some("Total Benefits".to_string())
        );
        assert_eq!(find_column_containing(&df, &["zzz"]), None);
    }

    #[test]
    fn test_read_after_header_skips_title_lines() {
        let text = "Table 1. State Totals\n\nItem,United States,Alabama\nTaxes,10,2\nNote,see below\n";
        assert_eq!(header_offset(text, "united states"), Some(23));
        assert_eq!(header_offset(text, "Wyoming"), None);

        let df = read_csv_after_header(text, "United States").unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(numeric_column(&df, "alabama").unwrap(), vec![Some(2.0), None]);
        assert!(read_csv_after_header(text, "Wyoming").is_err());
    }

    #[test]
    fn test_write_and_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("out.csv");
        let mut df = DataFrame::new(vec![
            str_col("id", vec![Some("New York, NY".to_string()), Some("B".to_string())]),
            f64_col("value", vec![Some(1.5), None]),
        ])
        .unwrap();
        write_csv(&mut df, &path).unwrap();

        let back = read_csv(&path).unwrap();
        assert_eq!(
            string_column(&back, "id").unwrap()[0].as_deref(),
            Some("New York, NY")
        );
        assert_eq!(numeric_column(&back, "value").unwrap(), vec![Some(1.5), None]);
    }
}
