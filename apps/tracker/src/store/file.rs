//! File-backed record store: one JSON blob holding the serialized list,
//! readable and writable by independent views of the same data.

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::record::{AnalysisRecord, RecordPatch};
use crate::store::{insert_capped, RecordStore, StoreError};

pub struct FileStore {
    path: PathBuf,
    /// Fingerprint of the blob as of our last read or write; a mismatch on
    /// the next read means somebody else wrote the file.
    last_seen: Mutex<Option<u64>>,
    external: watch::Sender<u64>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let (external, _) = watch::channel(0);
        Self {
            path: path.into(),
            last_seen: Mutex::new(None),
            external,
        }
    }

    /// Spawns a task that re-reads the blob on a fixed period so external
    /// writes surface on `on_external_change` even while this process is
    /// otherwise idle.
    pub fn spawn_watcher(self: Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                self.load();
            }
        })
    }

    fn load(&self) -> Vec<AnalysisRecord> {
        let blob = match fs::read_to_string(&self.path) {
            Ok(blob) => blob,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                self.observe(None);
                return Vec::new();
            }
            Err(err) => {
                warn!(path = %self.path.display(), %err, "failed to read record store");
                return Vec::new();
            }
        };
        self.observe(Some(fingerprint(&blob)));
        match serde_json::from_str(&blob) {
            Ok(records) => records,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "record store blob is not valid JSON; starting empty");
                Vec::new()
            }
        }
    }

    fn save(&self, records: &[AnalysisRecord]) -> Result<(), StoreError> {
        let blob = serde_json::to_string_pretty(records)?;
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                fs::create_dir_all(dir)?;
                dir
            }
            _ => Path::new("."),
        };
        // Write-then-rename so concurrent readers never see a torn blob.
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(blob.as_bytes())?;
        tmp.persist(&self.path).map_err(|err| StoreError::Io(err.error))?;
        *self.last_seen.lock().unwrap() = Some(fingerprint(&blob));
        Ok(())
    }

    fn observe(&self, fingerprint: Option<u64>) {
        let mut last_seen = self.last_seen.lock().unwrap();
        if last_seen.is_some() && *last_seen != fingerprint {
            debug!(path = %self.path.display(), "record store changed out-of-band");
            self.external.send_modify(|generation| *generation += 1);
        }
        *last_seen = fingerprint;
    }
}

impl RecordStore for FileStore {
    fn insert(&self, record: AnalysisRecord) -> Result<(), StoreError> {
        let mut records = self.load();
        insert_capped(&mut records, record);
        self.save(&records)
    }

    fn update(&self, id: Uuid, patch: RecordPatch) -> Result<bool, StoreError> {
        let mut records = self.load();
        match records.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                record.apply(patch);
                self.save(&records)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove_where(&self, predicate: &dyn Fn(&AnalysisRecord) -> bool) -> Result<usize, StoreError> {
        let mut records = self.load();
        let before = records.len();
        records.retain(|r| !predicate(r));
        let removed = before - records.len();
        if removed > 0 {
            self.save(&records)?;
        }
        Ok(removed)
    }

    fn all(&self) -> Vec<AnalysisRecord> {
        self.load()
    }

    fn on_external_change(&self) -> watch::Receiver<u64> {
        self.external.subscribe()
    }
}

fn fingerprint(blob: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    blob.hash(&mut hasher);
    hasher.finish()
}
