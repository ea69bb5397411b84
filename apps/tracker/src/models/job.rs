//! Wire types for the bulk-analysis endpoints.
//!
//! Field names follow the analysis service's JSON exactly. Everything beyond
//! the fields this subsystem acts on is captured in a flattened map and
//! carried as the opaque result payload.

#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Backend-reported state of a bulk job.
/// `pending` is what a job reports before the first file is picked up;
/// `partial` is "finished, but some files failed". Both extremes matter to
/// the poller only through `is_terminal`/`is_success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
    Partial,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Partial)
    }

    /// Terminal and the backend produced results (possibly with per-file
    /// errors). Failed jobs are terminal but not successful.
    pub fn is_success(self) -> bool {
        matches!(self, JobState::Completed | JobState::Partial)
    }
}

/// Per-file analysis result inside a job status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateResult {
    pub filename: String,
    #[serde(default)]
    pub candidate_name: Option<String>,
    #[serde(default)]
    pub overall_score: u8,
    /// `"success"` or `"error"`; a per-file failure still produces a result
    /// entry, with the reason in `error_message`.
    #[serde(default = "default_analysis_status")]
    pub analysis_status: String,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Everything else the service attaches (category scores, priority
    /// scores, full analysis, fact sheet). Opaque to this subsystem.
    #[serde(flatten)]
    pub detail: Map<String, Value>,
}

fn default_analysis_status() -> String {
    "success".to_string()
}

impl CandidateResult {
    pub fn is_error(&self) -> bool {
        self.analysis_status == "error"
    }
}

/// One snapshot of `GET /bulk_job_status/{job_id}`.
/// `results` is cumulative: every poll carries all results produced so far.
/// A response missing `results` deserializes to an empty list and is treated
/// as an empty update, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub status: JobState,
    #[serde(default)]
    pub results: Vec<CandidateResult>,
    #[serde(default)]
    pub error_summary: Option<String>,
    #[serde(default)]
    pub total_files: u32,
    #[serde(default)]
    pub processed_files: u32,
}

/// Response to `POST /bulk_analyze_resumes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkSubmitResponse {
    pub job_id: String,
    pub status: JobState,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub total_files: u32,
}
