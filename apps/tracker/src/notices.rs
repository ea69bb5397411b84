//! User-facing notices for terminal polling conditions.
//!
//! The poller never bubbles errors out; everything it wants the user to see
//! goes through an injected [`NoticeSink`]. The default sink surfaces
//! notices on the log stream; tests capture them instead.

use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The job finished and its results were reconciled.
    BatchCompleted { job_id: String, total: usize },
    /// The backend reported the job failed, with its reason.
    BatchFailed { job_id: String, reason: String },
    /// The attempt budget ran out before the job finished.
    BatchTimedOut { job_id: String },
    /// The backend no longer knows the job; its records were purged.
    BatchExpired { job_id: String },
    /// Informational: several consecutive rate-limited attempts.
    RateLimited { job_id: String, consecutive: u32 },
}

pub trait NoticeSink: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Default sink used by the binary.
pub struct LogNotices;

impl NoticeSink for LogNotices {
    fn notify(&self, notice: Notice) {
        match notice {
            Notice::BatchCompleted { job_id, total } => {
                info!(%job_id, total, "bulk analysis completed");
            }
            Notice::BatchFailed { job_id, reason } => {
                error!(%job_id, %reason, "bulk analysis failed");
            }
            Notice::BatchTimedOut { job_id } => {
                error!(%job_id, "bulk analysis timed out; giving up");
            }
            Notice::BatchExpired { job_id } => {
                warn!(%job_id, "bulk job expired on the server; its records were removed");
            }
            Notice::RateLimited { job_id, consecutive } => {
                warn!(%job_id, consecutive, "analysis service keeps rate limiting; still retrying");
            }
        }
    }
}
