#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle state of a single analysis record.
/// A record moves processing → completed (or failed) at most once and never
/// back; `completed` and `failed` are both terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Processing,
    Completed,
    Failed,
}

impl RecordStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RecordStatus::Completed | RecordStatus::Failed)
    }
}

/// One analysis record as persisted in the record store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: Uuid,
    /// Present only for bulk-submitted records; links the record to the
    /// poller driving its job.
    pub job_id: Option<String>,
    /// Source file name exactly as submitted.
    pub file_name: String,
    pub candidate_name: String,
    pub status: RecordStatus,
    /// Overall score 0–100; populated once a result is applied.
    pub score: Option<u8>,
    /// Priority labels the analysis was requested with, in order.
    pub priorities: Vec<String>,
    /// Full result blob from the analysis service. Carried opaquely; this
    /// subsystem never interprets it.
    pub payload: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisRecord {
    /// Merges a patch into the record and bumps `updated_at`.
    pub fn apply(&mut self, patch: RecordPatch) {
        if let Some(candidate_name) = patch.candidate_name {
            self.candidate_name = candidate_name;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(score) = patch.score {
            self.score = Some(score);
        }
        if let Some(payload) = patch.payload {
            self.payload = Some(payload);
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update merged into an existing record by `RecordStore::update`.
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub candidate_name: Option<String>,
    pub status: Option<RecordStatus>,
    pub score: Option<u8>,
    pub payload: Option<Value>,
}
