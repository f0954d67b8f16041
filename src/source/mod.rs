//! Document sources.
//!
//! A source exposes its collections through three operations: enumerate the
//! collections, fetch one sample document, and fetch every document. There is
//! no model registry; every collection is read as schemaless documents.

mod memory;
mod mongo;

pub use memory::MemorySource;
pub use mongo::MongoSource;

use async_trait::async_trait;
use docsync_core::Document;

/// Generic read access to a schemaless document store.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Names of the collections currently present, sorted.
    async fn list_collections(&self) -> Result<Vec<String>, SourceError>;

    /// One document of the collection, or `None` if it is empty.
    async fn find_one(&self, collection: &str) -> Result<Option<Document>, SourceError>;

    /// Every document currently in the collection.
    async fn find_all(&self, collection: &str) -> Result<Vec<Document>, SourceError>;
}

/// Collections the sync never replicates.
pub fn is_system_collection(name: &str) -> bool {
    name.starts_with("system.")
}

/// Error type for source operations.
#[derive(Debug, Clone)]
pub enum SourceError {
    /// The source is unreachable or the link is not established.
    Connection(String),
    /// A read against a collection failed.
    Query { collection: String, message: String },
    /// The operation was abandoned because of shutdown.
    Cancelled,
}

impl SourceError {
    /// Connection-class errors are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Connection(_))
    }
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Connection(e) => write!(f, "Source connection error: {}", e),
            SourceError::Query {
                collection,
                message,
            } => write!(f, "Failed to read collection '{}': {}", collection, message),
            SourceError::Cancelled => write!(f, "Source read cancelled"),
        }
    }
}

impl std::error::Error for SourceError {}
