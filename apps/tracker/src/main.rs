mod api_client;
mod config;
mod models;
mod names;
mod notices;
mod poller;
mod reconcile;
mod store;
mod submit;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::api_client::{AnalysisBackend, BatchFile, HttpBackend};
use crate::config::Config;
use crate::models::record::AnalysisRecord;
use crate::notices::LogNotices;
use crate::poller::JobPoller;
use crate::store::{FileStore, RecordStore};
use crate::submit::submit_batch;

/// How often the store watcher re-reads the blob for out-of-band changes.
const STORE_WATCH_PERIOD: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting bulk-analysis tracker v{}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(FileStore::open(&config.store_path));

    let paths: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    if paths.is_empty() {
        // No files to submit: just show what the store currently holds.
        print_records(&store.all());
        return Ok(());
    }

    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        files.push(BatchFile { name, bytes });
    }

    let backend: Arc<dyn AnalysisBackend> = Arc::new(HttpBackend::new(config.analyzer_url.clone()));

    let job_id = submit_batch(
        backend.as_ref(),
        store.as_ref(),
        files,
        &config.priorities,
        None,
    )
    .await?;

    // Surface writes made by other tracker processes while we wait.
    Arc::clone(&store).spawn_watcher(STORE_WATCH_PERIOD);
    let mut external = store.on_external_change();
    tokio::spawn(async move {
        while external.changed().await.is_ok() {
            info!("record store was modified by another process; reloading");
        }
    });

    let handle = JobPoller::new(backend, Arc::clone(&store) as Arc<dyn RecordStore>, Arc::new(LogNotices))
        .start(job_id.clone());
    match handle.join().await {
        Some(outcome) => info!(%job_id, ?outcome, "polling finished"),
        None => info!(%job_id, "polling aborted"),
    }

    let records: Vec<AnalysisRecord> = store
        .all()
        .into_iter()
        .filter(|r| r.job_id.as_deref() == Some(job_id.as_str()))
        .collect();
    print_records(&records);

    Ok(())
}

fn print_records(records: &[AnalysisRecord]) {
    if records.is_empty() {
        println!("no analysis records");
        return;
    }
    for record in records {
        match record.score {
            Some(score) => println!(
                "{:<30} {:<22} {:>3}/100  {:?}",
                record.file_name, record.candidate_name, score, record.status
            ),
            None => println!(
                "{:<30} {:<22}    -     {:?}",
                record.file_name, record.candidate_name, record.status
            ),
        }
    }
}
