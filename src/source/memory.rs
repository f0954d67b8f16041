//! In-memory source.
//!
//! Holds collections in insertion order. Used to drive the sync loop in
//! tests without a running MongoDB, including simulated outages.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use docsync_core::Document;

use super::{is_system_collection, DocumentSource, SourceError};

#[derive(Default)]
pub struct MemorySource {
    collections: RwLock<BTreeMap<String, Vec<Document>>>,
    /// Number of upcoming calls that fail with a connection error.
    outages: AtomicU32,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a document, replacing any document with the same `_id`.
    pub fn insert(&self, collection: &str, doc: Document) {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let docs = collections.entry(collection.to_string()).or_default();

        let existing = doc
            .id()
            .and_then(|id| docs.iter().position(|d| d.id().as_deref() == Some(id.as_str())));
        match existing {
            Some(pos) => docs[pos] = doc,
            None => docs.push(doc),
        }
    }

    /// Creates a collection with no documents.
    pub fn create_collection(&self, collection: &str) {
        self.collections
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(collection.to_string())
            .or_default();
    }

    /// Makes the next `calls` operations fail with a connection error.
    pub fn fail_next(&self, calls: u32) {
        self.outages.store(calls, Ordering::SeqCst);
    }

    fn check_link(&self) -> Result<(), SourceError> {
        let consumed = self
            .outages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match consumed {
            Ok(_) => Err(SourceError::Connection(
                "simulated outage: source unreachable".to_string(),
            )),
            Err(_) => Ok(()),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&BTreeMap<String, Vec<Document>>) -> T) -> T {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        f(&collections)
    }
}

#[async_trait]
impl DocumentSource for MemorySource {
    async fn list_collections(&self) -> Result<Vec<String>, SourceError> {
        self.check_link()?;
        Ok(self.read(|c| {
            c.keys()
                .filter(|name| !is_system_collection(name))
                .cloned()
                .collect()
        }))
    }

    async fn find_one(&self, collection: &str) -> Result<Option<Document>, SourceError> {
        self.check_link()?;
        Ok(self.read(|c| c.get(collection).and_then(|docs| docs.first().cloned())))
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>, SourceError> {
        self.check_link()?;
        Ok(self.read(|c| c.get(collection).cloned().unwrap_or_default()))
    }
}
