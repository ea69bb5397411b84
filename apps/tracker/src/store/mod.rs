//! The record store: a capped, persisted list of analysis records.
//!
//! The store is the single shared mutable resource in the subsystem and the
//! ground truth every surface reads. All mutation is whole-collection
//! read-modify-persist. That is safe within one process (execution is
//! cooperative and single-threaded per operation) but NOT across independent
//! writers on the same backing file: two processes doing read-modify-write
//! can lose each other's updates. Known, accepted limitation; consumers can
//! at least observe out-of-band changes through `on_external_change`.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use crate::models::record::{AnalysisRecord, RecordPatch};

/// Maximum number of records kept; the oldest is evicted on overflow.
pub const RECORD_CAP: usize = 10;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("record store encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Injected store service. Implementations keep the list ordered
/// most-recent-first and capped at [`RECORD_CAP`].
pub trait RecordStore: Send + Sync {
    /// Prepends a record, evicting from the tail past the cap.
    fn insert(&self, record: AnalysisRecord) -> Result<(), StoreError>;

    /// Merges a patch into the record with the given id.
    /// Returns `Ok(false)` (no-op) when the id is absent.
    fn update(&self, id: Uuid, patch: RecordPatch) -> Result<bool, StoreError>;

    /// Removes every record matching the predicate; returns how many went.
    fn remove_where(&self, predicate: &dyn Fn(&AnalysisRecord) -> bool) -> Result<usize, StoreError>;

    /// Current ordered list. Never fails: an unreadable backing blob reads
    /// as empty (and is logged by the implementation).
    fn all(&self) -> Vec<AnalysisRecord>;

    /// Generation channel bumped whenever the backing storage is observed to
    /// have changed out-of-band (another process/tab). Consumers reload via
    /// `all()` when it fires. In-memory stores never fire it except through
    /// their explicit external-writer test hooks.
    fn on_external_change(&self) -> watch::Receiver<u64>;
}

/// Shared insert semantics: newest first, capped.
pub(crate) fn insert_capped(records: &mut Vec<AnalysisRecord>, record: AnalysisRecord) {
    records.insert(0, record);
    records.truncate(RECORD_CAP);
}
