//! Job polling: drives the status-check lifecycle for one submitted job.
//!
//! One poller per job id, each an independent spawned task with no cross-job
//! coordination. A poller keeps at most one request in flight, so responses
//! for a job are reconciled strictly in receipt order. All waiting is
//! cooperative (`tokio::time::sleep`); the per-request timeout lives in the
//! HTTP layer.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api_client::{AnalysisBackend, ApiError};
use crate::models::job::JobState;
use crate::notices::{Notice, NoticeSink};
use crate::reconcile::reconcile;
use crate::store::RecordStore;

/// Polling policy. Defaults give a job roughly three hours of 15-second
/// checks before the poller gives up on it.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Wait before the first status check, giving the backend time to pick
    /// the job up.
    pub initial_grace: Duration,
    pub interval: Duration,
    pub max_attempts: u32,
    /// Retry delay after a transient error; longer than the normal interval.
    pub transient_retry: Duration,
    pub rate_limit_base: Duration,
    pub rate_limit_cap: Duration,
    /// Surface an informational notice after this many consecutive
    /// rate-limited attempts.
    pub rate_limit_notice_after: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_grace: Duration::from_secs(5),
            interval: Duration::from_secs(15),
            max_attempts: 720,
            transient_retry: Duration::from_secs(30),
            rate_limit_base: Duration::from_secs(30),
            rate_limit_cap: Duration::from_secs(300),
            rate_limit_notice_after: 3,
        }
    }
}

/// How a poll loop ended. Every variant is terminal for its job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Job finished and results were reconciled into the store.
    Completed,
    /// Backend reported the job itself failed.
    JobFailed,
    /// Backend no longer knows the job; its records were purged.
    Expired,
    /// Attempt budget exhausted before a terminal status.
    TimedOut,
}

/// Handle to a running poll task.
pub struct PollHandle {
    task: JoinHandle<PollOutcome>,
}

impl PollHandle {
    /// Waits for the loop to reach a terminal condition.
    /// Returns `None` only if the task was aborted.
    pub async fn join(self) -> Option<PollOutcome> {
        self.task.await.ok()
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

pub struct JobPoller {
    backend: Arc<dyn AnalysisBackend>,
    store: Arc<dyn RecordStore>,
    notices: Arc<dyn NoticeSink>,
    config: PollConfig,
}

impl JobPoller {
    pub fn new(
        backend: Arc<dyn AnalysisBackend>,
        store: Arc<dyn RecordStore>,
        notices: Arc<dyn NoticeSink>,
    ) -> Self {
        Self {
            backend,
            store,
            notices,
            config: PollConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PollConfig) -> Self {
        self.config = config;
        self
    }

    /// Starts the poll loop for `job_id` and returns its handle.
    pub fn start(&self, job_id: String) -> PollHandle {
        let task = tokio::spawn(run(
            Arc::clone(&self.backend),
            Arc::clone(&self.store),
            Arc::clone(&self.notices),
            self.config.clone(),
            job_id,
        ));
        PollHandle { task }
    }
}

async fn run(
    backend: Arc<dyn AnalysisBackend>,
    store: Arc<dyn RecordStore>,
    notices: Arc<dyn NoticeSink>,
    config: PollConfig,
    job_id: String,
) -> PollOutcome {
    debug!(%job_id, grace = ?config.initial_grace, "poller started");
    tokio::time::sleep(config.initial_grace).await;

    let mut attempts: u32 = 0;
    let mut consecutive_rate_limits: u32 = 0;

    loop {
        if attempts >= config.max_attempts {
            warn!(%job_id, attempts, "attempt budget exhausted; abandoning job");
            notices.notify(Notice::BatchTimedOut { job_id });
            return PollOutcome::TimedOut;
        }
        attempts += 1;

        match backend.job_status(&job_id).await {
            Ok(status) => {
                consecutive_rate_limits = 0;
                debug!(
                    %job_id,
                    state = ?status.status,
                    processed = status.processed_files,
                    total = status.total_files,
                    "status check"
                );
                reconcile(store.as_ref(), &job_id, &status);

                match status.status {
                    state if state.is_success() => {
                        info!(%job_id, results = status.results.len(), "job finished");
                        notices.notify(Notice::BatchCompleted {
                            job_id,
                            total: status.results.len(),
                        });
                        return PollOutcome::Completed;
                    }
                    JobState::Failed => {
                        let reason = status
                            .error_summary
                            .unwrap_or_else(|| "analysis failed".to_string());
                        notices.notify(Notice::BatchFailed { job_id, reason });
                        return PollOutcome::JobFailed;
                    }
                    _ => tokio::time::sleep(config.interval).await,
                }
            }
            Err(ApiError::NotFound) => {
                // A backend restart forgets in-flight jobs; without this
                // cleanup their placeholders would sit in "processing"
                // forever.
                match store.remove_where(&|r| r.job_id.as_deref() == Some(job_id.as_str())) {
                    Ok(removed) => {
                        warn!(%job_id, removed, "job unknown or expired; purged its records")
                    }
                    Err(err) => warn!(%job_id, %err, "job expired but purging its records failed"),
                }
                notices.notify(Notice::BatchExpired { job_id });
                return PollOutcome::Expired;
            }
            Err(ApiError::RateLimited { retry_after }) => {
                consecutive_rate_limits += 1;
                let delay = rate_limit_backoff(
                    consecutive_rate_limits,
                    config.rate_limit_base,
                    config.rate_limit_cap,
                );
                warn!(
                    %job_id,
                    consecutive = consecutive_rate_limits,
                    ?delay,
                    ?retry_after,
                    "rate limited; backing off"
                );
                if consecutive_rate_limits == config.rate_limit_notice_after {
                    notices.notify(Notice::RateLimited {
                        job_id: job_id.clone(),
                        consecutive: consecutive_rate_limits,
                    });
                }
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                // Transient (network or 5xx): retry on a longer fixed delay.
                // Does not touch the rate-limit counter.
                debug!(%job_id, %err, retry = ?config.transient_retry, "transient error; retrying");
                tokio::time::sleep(config.transient_retry).await;
            }
        }
    }
}

/// Exponential rate-limit backoff: `base * 2^(consecutive-1)`, capped.
pub fn rate_limit_backoff(consecutive: u32, base: Duration, cap: Duration) -> Duration {
    let exponent = consecutive.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::api_client::BatchFile;
    use crate::models::job::{BulkSubmitResponse, CandidateResult, JobStatus};
    use crate::models::record::RecordStatus;
    use crate::store::test_support::placeholder;
    use crate::store::{MemoryStore, RecordStore};

    /// Backend fake that replays a script of status responses; once the
    /// script runs dry it reports an endlessly processing job.
    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<JobStatus, ApiError>>>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<JobStatus, ApiError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
            }
        }
    }

    #[async_trait]
    impl AnalysisBackend for ScriptedBackend {
        async fn submit_batch(
            &self,
            files: &[BatchFile],
            _priorities: &[String],
            _job_name: Option<&str>,
        ) -> Result<BulkSubmitResponse, ApiError> {
            Ok(BulkSubmitResponse {
                job_id: "j1".to_string(),
                status: JobState::Processing,
                message: String::new(),
                total_files: files.len() as u32,
            })
        }

        async fn job_status(&self, _job_id: &str) -> Result<JobStatus, ApiError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(processing(Vec::new())))
        }
    }

    struct CapturingNotices {
        seen: Mutex<Vec<Notice>>,
    }

    impl CapturingNotices {
        fn new() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
            }
        }

        fn seen(&self) -> Vec<Notice> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl NoticeSink for CapturingNotices {
        fn notify(&self, notice: Notice) {
            self.seen.lock().unwrap().push(notice);
        }
    }

    fn result(filename: &str, score: u8) -> CandidateResult {
        CandidateResult {
            filename: filename.to_string(),
            candidate_name: None,
            overall_score: score,
            analysis_status: "success".to_string(),
            error_message: None,
            detail: serde_json::Map::new(),
        }
    }

    fn processing(results: Vec<CandidateResult>) -> JobStatus {
        JobStatus {
            status: JobState::Processing,
            results,
            error_summary: None,
            total_files: 0,
            processed_files: 0,
        }
    }

    fn completed(results: Vec<CandidateResult>) -> JobStatus {
        JobStatus {
            status: JobState::Completed,
            results,
            error_summary: None,
            total_files: 0,
            processed_files: 0,
        }
    }

    fn poller(
        backend: ScriptedBackend,
        store: Arc<MemoryStore>,
        notices: Arc<CapturingNotices>,
    ) -> JobPoller {
        JobPoller::new(Arc::new(backend), store, notices)
    }

    #[test]
    fn test_backoff_series_doubles_to_cap() {
        let base = Duration::from_secs(30);
        let cap = Duration::from_secs(300);
        let delays: Vec<u64> = (1..=6)
            .map(|n| rate_limit_backoff(n, base, cap).as_secs())
            .collect();
        assert_eq!(delays, vec![30, 60, 120, 240, 300, 300]);
    }

    #[test]
    fn test_backoff_survives_absurd_counts() {
        let base = Duration::from_secs(30);
        let cap = Duration::from_secs(300);
        assert_eq!(rate_limit_backoff(u32::MAX, base, cap), cap);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_file_scenario_end_to_end() {
        let store = Arc::new(MemoryStore::new());
        store.insert(placeholder("j1", "a.pdf")).unwrap();
        store.insert(placeholder("j1", "b.pdf")).unwrap();
        let notices = Arc::new(CapturingNotices::new());

        let backend = ScriptedBackend::new(vec![
            Ok(processing(vec![result("a.pdf", 80)])),
            Ok(completed(vec![result("a.pdf", 80), result("b.pdf", 65)])),
        ]);

        let outcome = poller(backend, Arc::clone(&store), Arc::clone(&notices))
            .start("j1".to_string())
            .join()
            .await;
        assert_eq!(outcome, Some(PollOutcome::Completed));

        let records = store.all();
        let a = records.iter().find(|r| r.file_name == "a.pdf").unwrap();
        let b = records.iter().find(|r| r.file_name == "b.pdf").unwrap();
        assert_eq!(a.status, RecordStatus::Completed);
        assert_eq!(a.score, Some(80));
        assert_eq!(b.status, RecordStatus::Completed);
        assert_eq!(b.score, Some(65));

        assert_eq!(
            notices.seen(),
            vec![Notice::BatchCompleted {
                job_id: "j1".to_string(),
                total: 2
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_purges_job_and_stops() {
        let store = Arc::new(MemoryStore::new());
        store.insert(placeholder("j1", "a.pdf")).unwrap();
        store.insert(placeholder("j1", "b.pdf")).unwrap();
        store.insert(placeholder("other", "c.pdf")).unwrap();
        let notices = Arc::new(CapturingNotices::new());

        let backend = ScriptedBackend::new(vec![Err(ApiError::NotFound)]);

        let outcome = poller(backend, Arc::clone(&store), Arc::clone(&notices))
            .start("j1".to_string())
            .join()
            .await;
        assert_eq!(outcome, Some(PollOutcome::Expired));

        let records = store.all();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].job_id.as_deref(), Some("other"));
        assert_eq!(
            notices.seen(),
            vec![Notice::BatchExpired {
                job_id: "j1".to_string()
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_reported_failure_surfaces_reason() {
        let store = Arc::new(MemoryStore::new());
        store.insert(placeholder("j1", "a.pdf")).unwrap();
        let notices = Arc::new(CapturingNotices::new());

        let backend = ScriptedBackend::new(vec![Ok(JobStatus {
            status: JobState::Failed,
            results: Vec::new(),
            error_summary: Some("model unavailable".to_string()),
            total_files: 1,
            processed_files: 0,
        })]);

        let outcome = poller(backend, Arc::clone(&store), Arc::clone(&notices))
            .start("j1".to_string())
            .join()
            .await;
        assert_eq!(outcome, Some(PollOutcome::JobFailed));
        assert_eq!(
            notices.seen(),
            vec![Notice::BatchFailed {
                job_id: "j1".to_string(),
                reason: "model unavailable".to_string()
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_budget_exhaustion_times_out() {
        let store = Arc::new(MemoryStore::new());
        store.insert(placeholder("j1", "a.pdf")).unwrap();
        let notices = Arc::new(CapturingNotices::new());

        // script stays empty: every check reports processing
        let backend = ScriptedBackend::new(Vec::new());
        let config = PollConfig {
            max_attempts: 3,
            ..Default::default()
        };

        let outcome = poller(backend, Arc::clone(&store), Arc::clone(&notices))
            .with_config(config)
            .start("j1".to_string())
            .join()
            .await;
        assert_eq!(outcome, Some(PollOutcome::TimedOut));
        // stuck placeholders are left for the user to revalidate
        assert_eq!(store.all()[0].status, RecordStatus::Processing);
        assert_eq!(
            notices.seen(),
            vec![Notice::BatchTimedOut {
                job_id: "j1".to_string()
            }]
        );
    }

    /// Pins the whole delay schedule: grace, two backoff steps, the reset on
    /// a successful response, and the restart of the series afterwards.
    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_backoff_and_counter_reset() {
        let store = Arc::new(MemoryStore::new());
        store.insert(placeholder("j1", "a.pdf")).unwrap();
        let notices = Arc::new(CapturingNotices::new());

        let backend = ScriptedBackend::new(vec![
            Err(ApiError::RateLimited { retry_after: None }), // +30s (2^0)
            Err(ApiError::RateLimited { retry_after: None }), // +60s (2^1)
            Ok(processing(Vec::new())),                       // resets counter, +15s
            Err(ApiError::RateLimited { retry_after: None }), // +30s again (2^0)
            Ok(completed(vec![result("a.pdf", 50)])),
        ]);
        let config = PollConfig {
            rate_limit_notice_after: 2,
            ..Default::default()
        };

        let started = tokio::time::Instant::now();
        let outcome = poller(backend, Arc::clone(&store), Arc::clone(&notices))
            .with_config(config)
            .start("j1".to_string())
            .join()
            .await;
        assert_eq!(outcome, Some(PollOutcome::Completed));

        // 5s grace + 30 + 60 + 15 + 30
        assert_eq!(started.elapsed(), Duration::from_secs(140));

        // exactly one informational notice, at the second consecutive hit
        let rate_limit_notices: Vec<_> = notices
            .seen()
            .into_iter()
            .filter(|n| matches!(n, Notice::RateLimited { .. }))
            .collect();
        assert_eq!(
            rate_limit_notices,
            vec![Notice::RateLimited {
                job_id: "j1".to_string(),
                consecutive: 2
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_leave_rate_limit_counter_alone() {
        let store = Arc::new(MemoryStore::new());
        store.insert(placeholder("j1", "a.pdf")).unwrap();
        let notices = Arc::new(CapturingNotices::new());

        let backend = ScriptedBackend::new(vec![
            Err(ApiError::RateLimited { retry_after: None }), // +30s (2^0)
            Err(ApiError::Network("connection reset".to_string())), // +30s fixed
            Err(ApiError::RateLimited { retry_after: None }), // +60s (2^1): counter kept
            Ok(completed(vec![result("a.pdf", 50)])),
        ]);

        let started = tokio::time::Instant::now();
        let outcome = poller(backend, Arc::clone(&store), Arc::clone(&notices))
            .start("j1".to_string())
            .join()
            .await;
        assert_eq!(outcome, Some(PollOutcome::Completed));

        // 5s grace + 30 + 30 + 60
        assert_eq!(started.elapsed(), Duration::from_secs(125));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pollers_for_different_jobs_run_independently() {
        let store = Arc::new(MemoryStore::new());
        store.insert(placeholder("j1", "a.pdf")).unwrap();
        store.insert(placeholder("j2", "b.pdf")).unwrap();
        let notices = Arc::new(CapturingNotices::new());

        let slow = poller(
            ScriptedBackend::new(vec![
                Ok(processing(Vec::new())),
                Ok(completed(vec![result("a.pdf", 70)])),
            ]),
            Arc::clone(&store),
            Arc::clone(&notices),
        );
        let fast = poller(
            ScriptedBackend::new(vec![Ok(completed(vec![result("b.pdf", 90)]))]),
            Arc::clone(&store),
            Arc::clone(&notices),
        );

        let slow_handle = slow.start("j1".to_string());
        let fast_handle = fast.start("j2".to_string());
        assert_eq!(fast_handle.join().await, Some(PollOutcome::Completed));
        assert_eq!(slow_handle.join().await, Some(PollOutcome::Completed));

        let records = store.all();
        assert!(records
            .iter()
            .all(|r| r.status == RecordStatus::Completed));
    }
}
