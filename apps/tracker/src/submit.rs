//! Bulk submission: hands the batch to the analysis service and seeds the
//! record store with one processing placeholder per file, tagged with the
//! returned job id. Everything downstream (polling, reconciliation) keys off
//! those placeholders.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api_client::{AnalysisBackend, ApiError, BatchFile};
use crate::models::record::{AnalysisRecord, RecordStatus};
use crate::names::resolve_candidate_name;
use crate::store::RecordStore;

/// Submits `files` for analysis and returns the job id to poll.
///
/// The placeholders are inserted before any poll response can arrive, so the
/// store always shows one processing record per submitted file immediately
/// after submission. A failed placeholder write is logged and skipped rather
/// than failing the submission; the job is already running server-side.
pub async fn submit_batch(
    backend: &dyn AnalysisBackend,
    store: &dyn RecordStore,
    files: Vec<BatchFile>,
    priorities: &[String],
    job_name: Option<&str>,
) -> Result<String, ApiError> {
    let response = backend.submit_batch(&files, priorities, job_name).await?;
    info!(job_id = %response.job_id, files = files.len(), "bulk analysis started");

    for file in &files {
        let record = placeholder_record(&response.job_id, &file.name, priorities.to_vec());
        if let Err(err) = store.insert(record) {
            warn!(file = %file.name, %err, "failed to persist placeholder record");
        }
    }

    Ok(response.job_id)
}

fn placeholder_record(job_id: &str, file_name: &str, priorities: Vec<String>) -> AnalysisRecord {
    let now = Utc::now();
    AnalysisRecord {
        id: Uuid::new_v4(),
        job_id: Some(job_id.to_string()),
        file_name: file_name.to_string(),
        candidate_name: resolve_candidate_name(None, file_name),
        status: RecordStatus::Processing,
        score: None,
        priorities,
        payload: None,
        created_at: now,
        updated_at: now,
    }
}
