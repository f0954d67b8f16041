//! Retry wrappers for sources and sinks.
//!
//! Connection-class failures are retried with backoff here, at the I/O
//! boundary, so the sync components above never see a transient error unless
//! the retry budget is spent. Statement errors pass through untouched.

use std::sync::Arc;

use async_trait::async_trait;
use docsync_core::{retry_async, Column, Dialect, Document, RetryOutcome, RetryPolicy};
use tokio_util::sync::CancellationToken;

use crate::db::{RelationalSink, Row, SinkError};
use crate::source::{DocumentSource, SourceError};

fn source_outcome(outcome: RetryOutcome<SourceError>) -> SourceError {
    outcome.into_inner().unwrap_or(SourceError::Cancelled)
}

fn sink_outcome(outcome: RetryOutcome<SinkError>) -> SinkError {
    outcome.into_inner().unwrap_or(SinkError::Cancelled)
}

/// A source whose reads are retried on connection errors.
pub struct RetryingSource {
    inner: Arc<dyn DocumentSource>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryingSource {
    pub fn new(inner: Arc<dyn DocumentSource>, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            inner,
            policy,
            cancel,
        }
    }
}

#[async_trait]
impl DocumentSource for RetryingSource {
    async fn list_collections(&self) -> Result<Vec<String>, SourceError> {
        retry_async(
            |_| self.inner.list_collections(),
            SourceError::is_transient,
            &self.policy,
            &self.cancel,
            "list_collections",
        )
        .await
        .map_err(source_outcome)
    }

    async fn find_one(&self, collection: &str) -> Result<Option<Document>, SourceError> {
        retry_async(
            |_| self.inner.find_one(collection),
            SourceError::is_transient,
            &self.policy,
            &self.cancel,
            "find_one",
        )
        .await
        .map_err(source_outcome)
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>, SourceError> {
        retry_async(
            |_| self.inner.find_all(collection),
            SourceError::is_transient,
            &self.policy,
            &self.cancel,
            "find_all",
        )
        .await
        .map_err(source_outcome)
    }
}

/// A sink whose statements are retried on connection errors.
pub struct RetryingSink {
    inner: Arc<dyn RelationalSink>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryingSink {
    pub fn new(inner: Arc<dyn RelationalSink>, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            inner,
            policy,
            cancel,
        }
    }
}

#[async_trait]
impl RelationalSink for RetryingSink {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    async fn create_relation(&self, relation: &str) -> Result<(), SinkError> {
        retry_async(
            |_| self.inner.create_relation(relation),
            SinkError::is_transient,
            &self.policy,
            &self.cancel,
            "create_relation",
        )
        .await
        .map_err(sink_outcome)
    }

    async fn load_columns(&self, relation: &str) -> Result<Vec<Column>, SinkError> {
        retry_async(
            |_| self.inner.load_columns(relation),
            SinkError::is_transient,
            &self.policy,
            &self.cancel,
            "load_columns",
        )
        .await
        .map_err(sink_outcome)
    }

    async fn add_column(&self, relation: &str, column: &Column) -> Result<(), SinkError> {
        retry_async(
            |_| self.inner.add_column(relation, column),
            SinkError::is_transient,
            &self.policy,
            &self.cancel,
            "add_column",
        )
        .await
        .map_err(sink_outcome)
    }

    async fn retype_column_to_text(&self, relation: &str, column: &str) -> Result<(), SinkError> {
        retry_async(
            |_| self.inner.retype_column_to_text(relation, column),
            SinkError::is_transient,
            &self.policy,
            &self.cancel,
            "retype_column",
        )
        .await
        .map_err(sink_outcome)
    }

    async fn upsert(&self, relation: &str, row: &Row) -> Result<(), SinkError> {
        retry_async(
            |_| self.inner.upsert(relation, row),
            SinkError::is_transient,
            &self.policy,
            &self.cancel,
            "upsert",
        )
        .await
        .map_err(sink_outcome)
    }

    async fn count_rows(&self, relation: &str) -> Result<i64, SinkError> {
        retry_async(
            |_| self.inner.count_rows(relation),
            SinkError::is_transient,
            &self.policy,
            &self.cancel,
            "count_rows",
        )
        .await
        .map_err(sink_outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fake::FakeSink;
    use crate::db::Cell;
    use crate::source::MemorySource;
    use docsync_core::{ColumnType, Value, ID_FIELD};
    use std::time::Duration;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(2), 0.0, 3)
    }

    #[tokio::test]
    async fn test_source_recovers_from_short_outage() {
        let memory = Arc::new(MemorySource::new());
        memory.insert(
            "orders",
            Document::new().with_field(ID_FIELD, Value::Text("a".into())),
        );
        memory.fail_next(2);

        let source = RetryingSource::new(memory, fast_policy(), CancellationToken::new());
        let names = source.list_collections().await.unwrap();
        assert_eq!(names, vec!["orders"]);
    }

    #[tokio::test]
    async fn test_source_gives_up_on_long_outage() {
        let memory = Arc::new(MemorySource::new());
        memory.fail_next(10);

        let source = RetryingSource::new(memory, fast_policy(), CancellationToken::new());
        let err = source.find_all("orders").await.unwrap_err();
        assert!(matches!(err, SourceError::Connection(_)));
    }

    #[tokio::test]
    async fn test_cancelled_source_reports_cancelled() {
        let memory = Arc::new(MemorySource::new());
        memory.fail_next(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let source = RetryingSource::new(memory, fast_policy(), cancel);
        let err = source.list_collections().await.unwrap_err();
        assert!(matches!(err, SourceError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancelled_source_still_reads_once() {
        let memory = Arc::new(MemorySource::new());
        memory.create_collection("orders");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let source = RetryingSource::new(memory, fast_policy(), cancel);
        assert_eq!(source.list_collections().await.unwrap(), vec!["orders"]);
    }

    fn order_row() -> Row {
        Row {
            natural_key: "a".to_string(),
            cells: vec![Cell {
                column: "total".to_string(),
                column_type: ColumnType::Integer,
                value: Value::Int(42),
            }],
        }
    }

    fn upserts(fake: &FakeSink) -> usize {
        fake.calls().iter().filter(|c| c.starts_with("upsert")).count()
    }

    #[tokio::test]
    async fn test_sink_retries_connection_errors() {
        let fake = Arc::new(FakeSink::new(Dialect::Postgres));
        fake.fail_next(
            "upsert",
            [
                SinkError::Connection("connection reset".to_string()),
                SinkError::Connection("connection refused".to_string()),
            ],
        );

        let sink = RetryingSink::new(fake.clone(), fast_policy(), CancellationToken::new());
        sink.upsert("orders", &order_row()).await.unwrap();

        assert_eq!(upserts(&fake), 3);
        assert_eq!(fake.row("orders", "a"), Some(order_row()));
    }

    #[tokio::test]
    async fn test_sink_passes_write_errors_through() {
        let fake = Arc::new(FakeSink::new(Dialect::Postgres));
        fake.fail_next(
            "upsert",
            [SinkError::Write {
                relation: "orders".to_string(),
                message: "value too long".to_string(),
            }],
        );

        let sink = RetryingSink::new(fake.clone(), fast_policy(), CancellationToken::new());
        let err = sink.upsert("orders", &order_row()).await.unwrap_err();

        assert!(matches!(err, SinkError::Write { .. }));
        assert_eq!(upserts(&fake), 1);
        assert!(fake.row("orders", "a").is_none());
    }

    #[tokio::test]
    async fn test_sink_gives_up_on_long_outage() {
        let fake = Arc::new(FakeSink::new(Dialect::Postgres));
        fake.fail_next(
            "add_column",
            (0..5).map(|_| SinkError::Connection("connection refused".to_string())),
        );

        let sink = RetryingSink::new(fake.clone(), fast_policy(), CancellationToken::new());
        let err = sink
            .add_column("orders", &Column::new("total", ColumnType::Integer))
            .await
            .unwrap_err();

        assert!(matches!(err, SinkError::Connection(_)));
        assert_eq!(fake.calls().len(), 3);
    }
}
