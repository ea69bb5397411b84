//! Result reconciliation: merging one job-status snapshot into the record
//! store.
//!
//! `results` in a status response is cumulative, so reconciliation must be
//! idempotent: applying the same snapshot twice leaves the store exactly as
//! applying it once, and a terminal record is never touched again.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::job::{CandidateResult, JobStatus};
use crate::models::record::{AnalysisRecord, RecordPatch, RecordStatus};
use crate::names::resolve_candidate_name;
use crate::store::RecordStore;

/// Applies one status snapshot for `job_id` to the store.
///
/// Per result, in order: an exact match (same job, same filename, still
/// processing) is upgraded in place; an exact match that is already terminal
/// is left alone; with no usable exact match the result claims the first
/// remaining processing placeholder of the job; with no placeholder left the
/// result is dropped. Once the backend declares the job done, a final pass
/// forces still-unmatched results onto whatever processing placeholders of
/// the job remain, so none stays stuck after the backend forgets the job.
///
/// The fallback can misattribute: with duplicate filenames in one batch, or
/// results arriving for files the store no longer tracks, a result may land
/// on a placeholder for a different file. That matches the shipped behavior
/// and is pinned by a test rather than "fixed" here.
pub fn reconcile(store: &dyn RecordStore, job_id: &str, status: &JobStatus) {
    if status.results.is_empty() {
        debug!(%job_id, "status snapshot carried no results");
        return;
    }

    let records = store.all();
    let mut claimed: HashSet<Uuid> = HashSet::new();
    let mut leftovers: Vec<&CandidateResult> = Vec::new();

    for result in &status.results {
        let exact = records.iter().find(|r| {
            r.job_id.as_deref() == Some(job_id)
                && r.file_name == result.filename
                && !claimed.contains(&r.id)
        });
        match exact {
            Some(record) if record.status == RecordStatus::Processing => {
                apply_result(store, record, result);
                claimed.insert(record.id);
            }
            Some(_) => {} // already terminal: idempotent no-op
            None => match first_processing(&records, job_id, &claimed) {
                Some(record) => {
                    debug!(
                        result = %result.filename,
                        placeholder = %record.file_name,
                        "no exact match; assigning result to remaining placeholder"
                    );
                    apply_result(store, record, result);
                    claimed.insert(record.id);
                }
                None => leftovers.push(result),
            },
        }
    }

    if status.status.is_success() && !leftovers.is_empty() {
        let records = store.all();
        for result in leftovers {
            match first_processing(&records, job_id, &claimed) {
                Some(record) => {
                    apply_result(store, record, result);
                    claimed.insert(record.id);
                }
                None => {
                    debug!(result = %result.filename, %job_id, "dropping unmatched result; no placeholder remains");
                }
            }
        }
    }
}

fn first_processing<'a>(
    records: &'a [AnalysisRecord],
    job_id: &str,
    claimed: &HashSet<Uuid>,
) -> Option<&'a AnalysisRecord> {
    records.iter().find(|r| {
        r.job_id.as_deref() == Some(job_id)
            && r.status == RecordStatus::Processing
            && !claimed.contains(&r.id)
    })
}

fn apply_result(store: &dyn RecordStore, record: &AnalysisRecord, result: &CandidateResult) {
    let status = if result.is_error() {
        RecordStatus::Failed
    } else {
        RecordStatus::Completed
    };
    let file_name = if result.filename.is_empty() {
        &record.file_name
    } else {
        &result.filename
    };
    let patch = RecordPatch {
        candidate_name: Some(resolve_candidate_name(result.candidate_name.as_deref(), file_name)),
        status: Some(status),
        score: Some(result.overall_score),
        payload: Some(serde_json::to_value(result).unwrap_or(Value::Null)),
    };
    if let Err(err) = store.update(record.id, patch) {
        warn!(file = %record.file_name, %err, "failed to persist reconciled result");
    }
}
