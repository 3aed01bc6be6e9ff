use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

const PPG_SUFFIX: &str = "_PPG.csv";

/// Participant/session pair encoded in `sub-<id>_sess<n>_PPG.csv`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordingKey {
    pub participant_id: String,
    pub session: u32,
}

impl RecordingKey {
    pub fn new(participant_id: impl Into<String>, session: u32) -> Self {
        Self {
            participant_id: participant_id.into(),
            session,
        }
    }

    pub fn parse_ppg_file_name(name: &str) -> Result<Self> {
        let bad = || PipelineError::FileName(name.to_string());
        let stem = name.strip_suffix(PPG_SUFFIX).ok_or_else(bad)?;
        let rest = stem.strip_prefix("sub-").ok_or_else(bad)?;
        let (participant, session) = rest.split_once("_sess").ok_or_else(bad)?;
        if !is_digits(participant) || !is_digits(session) {
            return Err(bad());
        }
        let session = session.parse().map_err(|_| bad())?;
        Ok(Self::new(participant, session))
    }

    pub fn ppg_file_name(&self) -> String {
        format!("sub-{}_sess{}{}", self.participant_id, self.session, PPG_SUFFIX)
    }
}

impl fmt::Display for RecordingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{} sess{}", self.participant_id, self.session)
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Participant id from the first `_` token of an HBD or trial file name.
pub fn participant_from_file_name(name: &str) -> Result<String> {
    let first = name.split('_').next().unwrap_or(name);
    let first = first.strip_suffix(".csv").unwrap_or(first);
    match first.strip_prefix("sub-") {
        Some(id) if is_digits(id) => Ok(id.to_string()),
        _ => Err(PipelineError::FileName(name.to_string())),
    }
}

pub fn is_csv(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".csv")
}

/// PPG candidates: CSVs mentioning `_PPG`, whether or not the rest matches.
pub fn is_ppg_file(name: &str) -> bool {
    is_csv(name) && name.contains("_PPG")
}

pub fn is_trial_file(name: &str) -> bool {
    is_csv(name) && name.contains("trial_data")
}

/// PPG files keyed by participant and session, built once per batch.
#[derive(Debug, Clone, Default)]
pub struct RecordingIndex {
    files: BTreeMap<RecordingKey, PathBuf>,
}

impl RecordingIndex {
    /// Index every `_PPG` candidate; misnamed ones are returned alongside.
    pub fn from_paths<I>(paths: I) -> (Self, Vec<(PathBuf, PipelineError)>)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut index = Self::default();
        let mut rejected = Vec::new();
        for path in paths {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !is_ppg_file(name) {
                continue;
            }
            match RecordingKey::parse_ppg_file_name(name) {
                Ok(key) => {
                    index.files.insert(key, path);
                }
                Err(err) => rejected.push((path, err)),
            }
        }
        (index, rejected)
    }

    pub fn get(&self, key: &RecordingKey) -> Option<&Path> {
        self.files.get(key).map(PathBuf::as_path)
    }

    /// Sessions recorded for one participant, ascending.
    pub fn sessions_of<'a>(
        &'a self,
        participant_id: &'a str,
    ) -> impl Iterator<Item = (&'a RecordingKey, &'a Path)> + 'a {
        self.files
            .iter()
            .filter(move |(key, _)| key.participant_id == participant_id)
            .map(|(key, path)| (key, path.as_path()))
    }

    /// All entries ordered by (participant, session).
    pub fn iter(&self) -> impl Iterator<Item = (&RecordingKey, &Path)> {
        self.files.iter().map(|(key, path)| (key, path.as_path()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ppg_names() {
        let key = RecordingKey::parse_ppg_file_name("sub-07_sess2_PPG.csv").unwrap();
        assert_eq!(key, RecordingKey::new("07", 2));
        assert_eq!(key.ppg_file_name(), "sub-07_sess2_PPG.csv");
        assert_eq!(key.to_string(), "sub-07 sess2");
        for bad in [
            "sub-07_PPG.csv",
            "sub-x1_sess1_PPG.csv",
            "sub-07_sess_PPG.csv",
            "sub-07_sess1_PPG.txt",
            "07_sess1_PPG.csv",
        ] {
            assert!(
                matches!(RecordingKey::parse_ppg_file_name(bad), Err(PipelineError::FileName(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn participant_comes_from_first_token() {
        assert_eq!(participant_from_file_name("sub-12_hbd.csv").unwrap(), "12");
        assert_eq!(
            participant_from_file_name("sub-03_task_trial_data.csv").unwrap(),
            "03"
        );
        assert_eq!(participant_from_file_name("sub-5.csv").unwrap(), "5");
        assert!(participant_from_file_name("pilot_hbd.csv").is_err());
        assert!(is_trial_file("sub-03_task_trial_data.csv"));
        assert!(!is_trial_file("sub-03_task_trial_data.xlsx"));
    }

    #[test]
    fn index_orders_and_rejects() {
        let paths = vec![
            PathBuf::from("in/sub-02_sess1_PPG.csv"),
            PathBuf::from("in/sub-01_sess2_PPG.csv"),
            PathBuf::from("in/notes.txt"),
            PathBuf::from("in/sub-01_sess1_PPG.csv"),
            PathBuf::from("in/subject1_PPG.csv"),
        ];
        let (index, rejected) = RecordingIndex::from_paths(paths);
        assert_eq!(index.len(), 3);
        let order: Vec<String> = index.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(order, vec!["sub-01 sess1", "sub-01 sess2", "sub-02 sess1"]);
        assert_eq!(rejected.len(), 1);
        assert_eq!(index.sessions_of("01").count(), 2);
        assert_eq!(
            index.get(&RecordingKey::new("02", 1)),
            Some(Path::new("in/sub-02_sess1_PPG.csv"))
        );
        assert!(index.get(&RecordingKey::new("02", 2)).is_none());
    }
}
