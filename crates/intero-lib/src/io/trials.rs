use crate::error::{PipelineError, Result};
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const REQUIRED_COLUMNS: [&str; 3] = ["session", "PPG_response_start", "PPG_ITI_start"];

/// One row of a task trial export.
///
/// `reported_beats` is the participant's own heartbeat count for the window;
/// rows without it still get a recorded count but no accuracy score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialWindow {
    pub session: u32,
    #[serde(rename = "PPG_response_start")]
    pub response_start: f64,
    #[serde(rename = "PPG_ITI_start")]
    pub iti_start: f64,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub reported_beats: Option<f64>,
    #[serde(default)]
    pub music_type: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub valence_rating: Option<f64>,
    #[serde(rename = "RT", default, deserialize_with = "csv::invalid_option")]
    pub rt: Option<f64>,
}

pub fn read_trials<R: Read>(source: R) -> Result<Vec<TrialWindow>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(source);
    // Rows deserialize by exact header name, so the schema check matches exactly too.
    let headers = reader.headers()?;
    if let Some(column) = REQUIRED_COLUMNS
        .into_iter()
        .find(|column| !headers.iter().any(|header| header == *column))
    {
        return Err(PipelineError::schema(column));
    }
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

pub fn read_trials_csv(path: &Path) -> Result<Vec<TrialWindow>> {
    read_trials(File::open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::sample_path;

    #[test]
    fn reads_sample_export() {
        let rows = read_trials_csv(&sample_path("test_data/trial_sample.csv")).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].session, 1);
        assert_eq!(rows[0].reported_beats, Some(5.0));
        assert_eq!(rows[0].music_type.as_deref(), Some("happy"));
        assert_eq!(rows[1].reported_beats, None);
        assert_eq!(rows[1].valence_rating, None);
        assert_eq!(rows[2].response_start, 1.0);
        assert_eq!(rows[2].iti_start, 6.0);
        assert_eq!(rows[2].rt, Some(0.98));
    }

    #[test]
    fn window_columns_are_required() {
        let err = read_trials("session,PPG_response_start\n1,0.5\n".as_bytes()).unwrap_err();
        assert!(matches!(err, PipelineError::Schema { ref column } if column == "PPG_ITI_start"));
    }

    #[test]
    fn header_case_must_match() {
        let err = read_trials("Session,PPG_response_start,PPG_ITI_start\n1,0.5,4.0\n".as_bytes())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Schema { ref column } if column == "session"));
    }

    #[test]
    fn optional_columns_may_be_absent() {
        let rows =
            read_trials("session,PPG_response_start,PPG_ITI_start\n2,1.0,3.5\n".as_bytes()).unwrap();
        assert_eq!(rows[0].session, 2);
        assert_eq!(rows[0].reported_beats, None);
        assert_eq!(rows[0].music_type, None);
    }
}
