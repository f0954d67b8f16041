//! The polling sync loop.
//!
//! Each cycle lists the source's collections and fully rescans every one of
//! them. No cursor is kept between cycles; idempotent upserts make the rescan
//! safe.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use docsync_core::relation_name;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::reconciler::{SchemaLocks, SchemaReconciler};
use super::report::{CollectionReport, CycleReport, DocumentFailure, FailureKind};
use super::translator::Translator;
use super::writer::UpsertWriter;
use crate::db::{RelationalSink, SinkError};
use crate::source::{DocumentSource, SourceError};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Discovering,
    PerCollectionSync,
    Sleeping,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Pause between the end of one cycle and the start of the next.
    pub interval: Duration,
    pub max_concurrent_collections: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_concurrent_collections: 1,
        }
    }
}

pub struct SyncScheduler {
    source: Arc<dyn DocumentSource>,
    reconciler: SchemaReconciler,
    writer: UpsertWriter,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
}

impl SyncScheduler {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        sink: Arc<dyn RelationalSink>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            source,
            reconciler: SchemaReconciler::new(sink.clone(), SchemaLocks::new()),
            writer: UpsertWriter::new(sink),
            config,
            state: Mutex::new(SchedulerState::Idle),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: SchedulerState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let previous = *state;
        if previous != next {
            debug!(from = ?previous, to = ?next, "Scheduler state change");
            *state = next;
        }
    }

    /// Runs cycles until `cancel` fires.
    ///
    /// A source error in the first cycle is returned, since it means the
    /// source was never reachable. Later cycle errors are logged and the loop
    /// carries on.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), SourceError> {
        info!(
            interval_secs = self.config.interval.as_secs_f64(),
            "Starting sync loop"
        );
        let mut first_cycle = true;

        loop {
            match self.run_cycle(&cancel).await {
                Ok(report) => {
                    info!(
                        collections = report.collections.len(),
                        documents = report.documents_read(),
                        written = report.rows_written(),
                        failures = report.document_failures().count(),
                        "Cycle complete"
                    );
                }
                Err(SourceError::Cancelled) => {}
                Err(e) if first_cycle => {
                    self.set_state(SchedulerState::Idle);
                    return Err(e);
                }
                Err(e) => error!(error = %e, "Cycle failed"),
            }
            first_cycle = false;

            if cancel.is_cancelled() {
                break;
            }

            self.set_state(SchedulerState::Sleeping);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        self.set_state(SchedulerState::Idle);
        info!("Sync loop stopped");
        Ok(())
    }

    /// Performs one discovery-and-sync pass.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport, SourceError> {
        self.set_state(SchedulerState::Discovering);
        let collections = self.source.list_collections().await?;
        debug!(count = collections.len(), "Discovered collections");

        self.set_state(SchedulerState::PerCollectionSync);
        let concurrency = self.config.max_concurrent_collections.max(1);
        let mut reports: Vec<CollectionReport> = stream::iter(collections)
            .map(|collection| async move { self.sync_collection(&collection, cancel).await })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        reports.sort_by(|a, b| a.collection.cmp(&b.collection));

        Ok(CycleReport {
            collections: reports,
            cancelled: cancel.is_cancelled(),
        })
    }

    async fn sync_collection(&self, collection: &str, cancel: &CancellationToken) -> CollectionReport {
        let relation = relation_name(collection);
        let mut report = CollectionReport::new(collection, &relation);
        if cancel.is_cancelled() {
            return report;
        }

        let sample = match self.source.find_one(collection).await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                debug!(collection = %collection, "Empty collection, skipping");
                return report;
            }
            Err(e) => return aborted(report, e.to_string()),
        };

        let mut cache = match self.reconciler.load(&relation).await {
            Ok(cache) => cache,
            Err(e) => return aborted(report, e.to_string()),
        };
        if let Err(e) = self.reconciler.reconcile(&mut cache, &sample).await {
            return aborted(report, e.to_string());
        }

        let documents = match self.source.find_all(collection).await {
            Ok(docs) => docs,
            Err(e) => return aborted(report, e.to_string()),
        };
        report.documents_read = documents.len();

        let translator = Translator::new(&self.reconciler);
        for doc in documents {
            if cancel.is_cancelled() {
                debug!(collection = %collection, "Cancelled between documents");
                break;
            }

            let row = match translator.translate(collection, &mut cache, doc).await {
                Ok(row) => row,
                Err(failure) => {
                    warn!(
                        collection = %collection,
                        id = ?failure.document_id,
                        kind = %failure.kind,
                        error = %failure.message,
                        "Rejected document"
                    );
                    report.document_failures.push(failure);
                    continue;
                }
            };

            match self.writer.write(&relation, &row).await {
                Ok(()) => report.rows_written += 1,
                Err(SinkError::Cancelled) => {
                    report.document_failures.push(DocumentFailure::new(
                        collection,
                        Some(row.natural_key),
                        FailureKind::Interrupted,
                        "write abandoned during shutdown",
                    ));
                    break;
                }
                Err(e) => report.document_failures.push(DocumentFailure::new(
                    collection,
                    Some(row.natural_key),
                    FailureKind::Write,
                    e.to_string(),
                )),
            }
        }

        report.columns_added = cache.added().to_vec();
        report.schema_failures = cache.failures().to_vec();

        info!(
            collection = %collection,
            relation = %relation,
            read = report.documents_read,
            written = report.rows_written,
            "Synced collection"
        );
        report
    }
}

fn aborted(mut report: CollectionReport, reason: String) -> CollectionReport {
    warn!(collection = %report.collection, error = %reason, "Collection sync aborted");
    report.aborted = Some(reason);
    report
}
