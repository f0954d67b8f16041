//! Row upserts.

use std::sync::Arc;

use tracing::{trace, warn};

use crate::db::{RelationalSink, Row, SinkError};

/// Commits translated rows one at a time.
///
/// Each row is its own statement, so a failure affects only that document.
pub struct UpsertWriter {
    sink: Arc<dyn RelationalSink>,
}

impl UpsertWriter {
    pub fn new(sink: Arc<dyn RelationalSink>) -> Self {
        Self { sink }
    }

    pub async fn write(&self, relation: &str, row: &Row) -> Result<(), SinkError> {
        match self.sink.upsert(relation, row).await {
            Ok(()) => {
                trace!(relation = %relation, id = %row.natural_key, "Upserted row");
                Ok(())
            }
            Err(e) => {
                warn!(
                    relation = %relation,
                    id = %row.natural_key,
                    error = %e,
                    "Failed to write document"
                );
                Err(e)
            }
        }
    }
}
