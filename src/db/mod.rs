//! Relational sinks.
//!
//! A sink owns a connection pool and executes the statements generated by
//! [`docsync_core::Dialect`]. Relations are created and extended at runtime,
//! so there are no migrations.

#[cfg(test)]
pub(crate) mod fake;
mod postgres;
mod sqlite;

pub use postgres::PostgresSink;
pub use sqlite::SqliteSink;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use docsync_core::{Column, ColumnType, Dialect, Value};

/// One value bound for a column of the target relation.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub column: String,
    pub column_type: ColumnType,
    pub value: Value,
}

/// A translated document ready for upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub natural_key: String,
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells
            .iter()
            .find(|c| c.column == column)
            .map(|c| &c.value)
    }
}

/// DDL and upsert access to a relational store.
#[async_trait]
pub trait RelationalSink: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Creates the relation with its surrogate and natural keys if absent.
    async fn create_relation(&self, relation: &str) -> Result<(), SinkError>;

    /// Columns of the relation in ordinal order, key columns included.
    /// Empty if the relation does not exist.
    async fn load_columns(&self, relation: &str) -> Result<Vec<Column>, SinkError>;

    async fn add_column(&self, relation: &str, column: &Column) -> Result<(), SinkError>;

    async fn retype_column_to_text(&self, relation: &str, column: &str) -> Result<(), SinkError>;

    /// Inserts the row, or replaces every listed column of the row sharing
    /// its natural key.
    async fn upsert(&self, relation: &str, row: &Row) -> Result<(), SinkError>;

    async fn count_rows(&self, relation: &str) -> Result<i64, SinkError>;
}

/// Error type for sink operations.
#[derive(Debug, Clone)]
pub enum SinkError {
    /// The sink is unreachable.
    Connection(String),
    /// A DDL statement was rejected.
    SchemaEvolution {
        relation: String,
        column: Option<String>,
        message: String,
    },
    /// An upsert statement failed.
    Write { relation: String, message: String },
    /// A catalog or count query failed.
    Query(String),
    /// The operation was abandoned because of shutdown.
    Cancelled,
    /// The sink URI names an unsupported store.
    UnsupportedUri(String),
}

impl SinkError {
    /// Connection-class errors are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, SinkError::Connection(_))
    }

    pub(crate) fn schema(relation: &str, column: Option<&str>, e: sqlx::Error) -> Self {
        if is_connection_error(&e) {
            return SinkError::Connection(e.to_string());
        }
        SinkError::SchemaEvolution {
            relation: relation.to_string(),
            column: column.map(str::to_string),
            message: e.to_string(),
        }
    }

    pub(crate) fn write(relation: &str, e: sqlx::Error) -> Self {
        if is_connection_error(&e) {
            return SinkError::Connection(e.to_string());
        }
        SinkError::Write {
            relation: relation.to_string(),
            message: e.to_string(),
        }
    }
}

impl From<sqlx::Error> for SinkError {
    fn from(e: sqlx::Error) -> Self {
        if is_connection_error(&e) {
            SinkError::Connection(e.to_string())
        } else {
            SinkError::Query(e.to_string())
        }
    }
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Connection(e) => write!(f, "Sink connection error: {}", e),
            SinkError::SchemaEvolution {
                relation,
                column: Some(column),
                message,
            } => write!(
                f,
                "Schema change rejected for {}.{}: {}",
                relation, column, message
            ),
            SinkError::SchemaEvolution {
                relation, message, ..
            } => write!(f, "Schema change rejected for {}: {}", relation, message),
            SinkError::Write { relation, message } => {
                write!(f, "Write to {} failed: {}", relation, message)
            }
            SinkError::Query(e) => write!(f, "Sink query error: {}", e),
            SinkError::Cancelled => write!(f, "Sink operation cancelled"),
            SinkError::UnsupportedUri(uri) => write!(
                f,
                "Unsupported sink URI '{}': expected postgres://, postgresql:// or sqlite:",
                uri
            ),
        }
    }
}

impl std::error::Error for SinkError {}

fn is_connection_error(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

/// Connects to the sink named by `uri`.
pub async fn connect_sink(uri: &str) -> Result<Arc<dyn RelationalSink>, SinkError> {
    if uri.starts_with("postgres://") || uri.starts_with("postgresql://") {
        let sink = PostgresSink::connect(uri).await?;
        Ok(Arc::new(sink))
    } else if let Some(path) = uri.strip_prefix("sqlite:") {
        let path = path.trim_start_matches("//");
        let path = path.split('?').next().unwrap_or(path);
        let sink = SqliteSink::new(init_sqlite(Path::new(path)).await?);
        Ok(Arc::new(sink))
    } else {
        Err(SinkError::UnsupportedUri(uri.to_string()))
    }
}

/// Opens (creating if needed) a SQLite database file.
pub async fn init_sqlite(path: &Path) -> Result<sqlx::SqlitePool, SinkError> {
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    // Ensure parent directory exists
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            SinkError::Connection(format!(
                "Failed to create database directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let options = SqliteConnectOptions::new()
        .filename(PathBuf::from(path))
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_connect_sqlite_uri_creates_file() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("sink.db");
        let uri = format!("sqlite:{}", db_path.display());

        let sink = connect_sink(&uri).await.unwrap();
        assert_eq!(sink.dialect(), Dialect::Sqlite);
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_unsupported_uri() {
        let err = connect_sink("mysql://localhost/db").await.err().unwrap();
        assert!(matches!(err, SinkError::UnsupportedUri(_)));
        assert!(err.to_string().contains("Unsupported sink URI"));
    }

    #[test]
    fn test_row_get() {
        let row = Row {
            natural_key: "abc".to_string(),
            cells: vec![Cell {
                column: "total".to_string(),
                column_type: ColumnType::Integer,
                value: Value::Int(42),
            }],
        };
        assert_eq!(row.get("total"), Some(&Value::Int(42)));
        assert_eq!(row.get("missing"), None);
    }
}
