//! Readers for the three experiment exports and their file-naming scheme.

pub mod hbd;
pub mod naming;
pub mod ppg;
pub mod trials;

use crate::error::{PipelineError, Result};
use csv::StringRecord;

/// Case-insensitive header lookup.
pub(crate) fn locate_column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|header| header.trim().eq_ignore_ascii_case(name))
}

pub(crate) fn require_column(headers: &StringRecord, name: &str) -> Result<usize> {
    locate_column(headers, name).ok_or_else(|| PipelineError::schema(name))
}

/// Numeric cell; empty cells are `None`. `row` is 1-based and excludes the header.
pub(crate) fn parse_cell(
    record: &StringRecord,
    idx: usize,
    column: &str,
    row: usize,
) -> Result<Option<f64>> {
    let raw = record.get(idx).unwrap_or("").trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| PipelineError::InvalidValue {
            column: column.to_string(),
            row,
            value: raw.to_string(),
        })
}

#[cfg(test)]
pub(crate) fn sample_path(relative: &str) -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .join(relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_match_ignoring_case() {
        let headers = StringRecord::from(vec!["Time", " ppg ", "delay"]);
        assert_eq!(locate_column(&headers, "time"), Some(0));
        assert_eq!(locate_column(&headers, "PPG"), Some(1));
        assert!(matches!(
            require_column(&headers, "response"),
            Err(PipelineError::Schema { .. })
        ));
    }

    #[test]
    fn cells_parse_or_report_position() {
        let record = StringRecord::from(vec!["1.5", "", "abc"]);
        assert_eq!(parse_cell(&record, 0, "a", 1).unwrap(), Some(1.5));
        assert_eq!(parse_cell(&record, 1, "b", 1).unwrap(), None);
        assert_eq!(parse_cell(&record, 9, "z", 1).unwrap(), None);
        match parse_cell(&record, 2, "c", 4) {
            Err(PipelineError::InvalidValue { column, row, value }) => {
                assert_eq!((column.as_str(), row, value.as_str()), ("c", 4, "abc"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
