use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Processing,
    Done,
    Error,
}

impl JobState {
    /// `done` and `error` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Error)
    }
}

/// One submitted-file-to-separated-stems unit of work. Serialized as-is
/// for status polls.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub status: JobState,
    pub progress: u8,
    pub filename: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub vocals_url: Option<String>,
    pub instrumental_url: Option<String>,
    pub error: Option<String>,
    #[serde(skip)]
    pub input_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub job_id: String,
    pub status: JobState,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stem {
    Vocals,
    Instrumental,
}

impl Stem {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "vocals" => Some(Stem::Vocals),
            "instrumental" => Some(Stem::Instrumental),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stem::Vocals => "vocals",
            Stem::Instrumental => "instrumental",
        }
    }

    /// On-disk name inside the per-job output directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Stem::Vocals => "vocals.wav",
            Stem::Instrumental => "instrumental.wav",
        }
    }
}
