//! In-memory record store with the same semantics as the file-backed one.
//! Used as the injectable fake in tests; `replace_all` plays the part of an
//! external writer.

#![allow(dead_code)]

use std::sync::Mutex;

use tokio::sync::watch;
use uuid::Uuid;

use crate::models::record::{AnalysisRecord, RecordPatch};
use crate::store::{insert_capped, RecordStore, StoreError};

pub struct MemoryStore {
    records: Mutex<Vec<AnalysisRecord>>,
    external: watch::Sender<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (external, _) = watch::channel(0);
        Self {
            records: Mutex::new(Vec::new()),
            external,
        }
    }

    /// Swaps the whole collection, as an out-of-band writer would, and fires
    /// the external-change channel.
    pub fn replace_all(&self, records: Vec<AnalysisRecord>) {
        *self.records.lock().unwrap() = records;
        self.external.send_modify(|generation| *generation += 1);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryStore {
    fn insert(&self, record: AnalysisRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        insert_capped(&mut records, record);
        Ok(())
    }

    fn update(&self, id: Uuid, patch: RecordPatch) -> Result<bool, StoreError> {
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                record.apply(patch);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove_where(&self, predicate: &dyn Fn(&AnalysisRecord) -> bool) -> Result<usize, StoreError> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| !predicate(r));
        Ok(before - records.len())
    }

    fn all(&self) -> Vec<AnalysisRecord> {
        self.records.lock().unwrap().clone()
    }

    fn on_external_change(&self) -> watch::Receiver<u64> {
        self.external.subscribe()
    }
}
