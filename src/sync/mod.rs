//! Document-to-relational replication.
//!
//! A cycle walks every collection of the source and, for each one:
//!
//! 1. loads the relation's columns into a [`SchemaCache`],
//! 2. reconciles the relation against a sample document,
//! 3. translates every document into a [`crate::db::Row`], adding columns for
//!    fields seen for the first time,
//! 4. upserts each row keyed on the document's `_id`.
//!
//! # Usage
//!
//! ```ignore
//! let scheduler = SyncScheduler::new(source, sink, SchedulerConfig::default());
//! let report = scheduler.run_cycle(&CancellationToken::new()).await?;
//! println!("{}", report);
//! ```

pub mod reconciler;
pub mod report;
pub mod scheduler;
pub mod translator;
pub mod writer;

pub use reconciler::{ReconcileOutcome, SchemaCache, SchemaLocks, SchemaReconciler};
pub use report::{CollectionReport, CycleReport, DocumentFailure, FailureKind, SchemaFailure};
pub use scheduler::{SchedulerConfig, SchedulerState, SyncScheduler, DEFAULT_POLL_INTERVAL};
pub use translator::Translator;
pub use writer::UpsertWriter;
