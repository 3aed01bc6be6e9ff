use thiserror::Error;

/// Failures of a single processing unit (one file or one participant).
///
/// None of these abort a batch; the batch layer records them as diagnostics.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing required column '{column}'")]
    Schema { column: String },
    #[error("signal has {len} samples; the filter needs more than {required}")]
    InsufficientSamples { len: usize, required: usize },
    #[error("filter design failed: {0}")]
    FilterDesign(String),
    #[error("no heartbeat peaks detected")]
    NoPeaksDetected,
    #[error("no heart-rate values within the physiological range")]
    NoValidHeartRate,
    #[error("gaussian fit did not converge: {0}")]
    FitNonConvergence(String),
    #[error("degenerate synchrony curve: {0}")]
    DegenerateCurve(String),
    #[error("no beats recorded in window [{start}, {end})")]
    NoRecordedBeats { start: f64, end: f64 },
    #[error("row {row}: response '{value}' is neither Sync nor Async")]
    InvalidResponse { row: usize, value: String },
    #[error("row {row}: column '{column}' holds non-numeric value '{value}'")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
    },
    #[error("file name '{0}' does not match the expected pattern")]
    FileName(String),
    #[error("no PPG recording for participant {participant_id} session {session}")]
    MissingRecording { participant_id: String, session: u32 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

impl PipelineError {
    pub fn schema(column: impl Into<String>) -> Self {
        Self::Schema {
            column: column.into(),
        }
    }

    /// Stable short name used in diagnostics and manifests.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Schema { .. } => "schema",
            Self::InsufficientSamples { .. } => "insufficient_samples",
            Self::FilterDesign(_) => "filter_design",
            Self::NoPeaksDetected => "no_peaks_detected",
            Self::NoValidHeartRate => "no_valid_hr",
            Self::FitNonConvergence(_) => "fit_non_convergence",
            Self::DegenerateCurve(_) => "degenerate_curve",
            Self::NoRecordedBeats { .. } => "no_recorded_beats",
            Self::InvalidResponse { .. } => "invalid_response",
            Self::InvalidValue { .. } => "invalid_value",
            Self::FileName(_) => "file_name",
            Self::MissingRecording { .. } => "missing_recording",
            Self::Io(_) => "io",
            Self::Csv(_) => "csv",
        }
    }

    /// Soft failures mean "nothing to compute here"; the rest mean the input is unusable.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::NoPeaksDetected
                | Self::NoValidHeartRate
                | Self::FitNonConvergence(_)
                | Self::DegenerateCurve(_)
                | Self::NoRecordedBeats { .. }
                | Self::MissingRecording { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_and_hard_split() {
        assert!(PipelineError::NoPeaksDetected.is_soft());
        assert!(PipelineError::DegenerateCurve("flat".into()).is_soft());
        assert!(!PipelineError::schema("PPG").is_soft());
        assert!(!PipelineError::InsufficientSamples {
            len: 3,
            required: 27
        }
        .is_soft());
        assert_eq!(PipelineError::schema("PPG").kind(), "schema");
        assert_eq!(
            PipelineError::schema("PPG").to_string(),
            "missing required column 'PPG'"
        );
    }
}
