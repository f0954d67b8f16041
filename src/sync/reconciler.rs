//! Schema reconciliation.
//!
//! Keeps a relation's columns a superset of the fields seen in its
//! collection. Columns are only ever added; the one permitted type change is
//! moving an `id` column to TEXT.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use docsync_core::{
    infer_column_type, is_key_column, Column, ColumnType, Document, RelationSchema, Value,
    ID_FIELD, RESERVED_ID_FIELD,
};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use super::report::SchemaFailure;
use crate::db::{RelationalSink, SinkError};

/// Per-relation locks serializing DDL.
///
/// Distinct collections can map to the same relation, and collections may be
/// synced concurrently, so every schema change takes the relation's lock.
#[derive(Clone, Default)]
pub struct SchemaLocks {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl SchemaLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, relation: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(relation.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Cached metadata for one relation, valid for one cycle.
///
/// Updated only after a DDL statement succeeds. Fields whose column could
/// not be created are remembered so they are not retried within the cycle.
#[derive(Debug, Clone)]
pub struct SchemaCache {
    schema: RelationSchema,
    unavailable: HashSet<String>,
    added: Vec<String>,
    failures: Vec<SchemaFailure>,
}

impl SchemaCache {
    pub fn new(schema: RelationSchema) -> Self {
        Self {
            schema,
            unavailable: HashSet::new(),
            added: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn relation(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &RelationSchema {
        &self.schema
    }

    pub fn is_unavailable(&self, field: &str) -> bool {
        self.unavailable.contains(field)
    }

    /// Columns added during this cycle, in order.
    pub fn added(&self) -> &[String] {
        &self.added
    }

    pub fn failures(&self) -> &[SchemaFailure] {
        &self.failures
    }

    fn fail(&mut self, field: &str, message: String) {
        warn!(
            relation = %self.schema.name(),
            column = %field,
            error = %message,
            "Column unavailable for this cycle"
        );
        self.unavailable.insert(field.to_string());
        self.failures.push(SchemaFailure {
            relation: self.schema.name().to_string(),
            column: field.to_string(),
            message,
        });
    }
}

/// What a call to [`SchemaReconciler::reconcile`] changed.
#[derive(Debug, Default, PartialEq)]
pub struct ReconcileOutcome {
    pub created: bool,
    pub added: Vec<String>,
    pub unavailable: Vec<String>,
}

pub struct SchemaReconciler {
    sink: Arc<dyn RelationalSink>,
    locks: SchemaLocks,
}

impl SchemaReconciler {
    pub fn new(sink: Arc<dyn RelationalSink>, locks: SchemaLocks) -> Self {
        Self { sink, locks }
    }

    /// Reads the relation's current columns from the sink.
    pub async fn load(&self, relation: &str) -> Result<SchemaCache, SinkError> {
        let columns = self.sink.load_columns(relation).await?;
        Ok(SchemaCache::new(RelationSchema::from_catalog(relation, columns)))
    }

    /// Brings the relation up to date with a sample document.
    ///
    /// Creates the relation if needed, then makes sure every field of the
    /// sample has a column. Only a failure to create the relation is an
    /// error; column failures are recorded in `cache` and skipped.
    pub async fn reconcile(
        &self,
        cache: &mut SchemaCache,
        sample: &Document,
    ) -> Result<ReconcileOutcome, SinkError> {
        let mut outcome = ReconcileOutcome {
            created: self.ensure_relation(cache).await?,
            ..Default::default()
        };

        let added_before = cache.added.len();
        for (field, value) in sample.fields() {
            if field == ID_FIELD {
                continue;
            }
            if self.ensure_field(cache, field, value).await.is_none() {
                outcome.unavailable.push(field.to_string());
            }
        }
        outcome.added = cache.added[added_before..].to_vec();

        Ok(outcome)
    }

    /// Creates the relation if the cache says it is absent. Returns true if
    /// this call created it.
    pub async fn ensure_relation(&self, cache: &mut SchemaCache) -> Result<bool, SinkError> {
        if cache.schema.exists() {
            return Ok(false);
        }

        let relation = cache.relation().to_string();
        let _guard = self.locks.acquire(&relation).await;
        self.sink.create_relation(&relation).await?;
        cache.schema.mark_created();
        info!(relation = %relation, "Created relation");
        Ok(true)
    }

    /// Column type backing `field`, adding the column if needed.
    ///
    /// Returns `None` if the field cannot be stored this cycle.
    pub async fn ensure_field(
        &self,
        cache: &mut SchemaCache,
        field: &str,
        value: &Value,
    ) -> Option<ColumnType> {
        if cache.is_unavailable(field) {
            return None;
        }
        if is_key_column(field) {
            cache.fail(field, "field name collides with a key column".to_string());
            return None;
        }

        if let Some(column) = cache.schema.column(field) {
            let column_type = column.column_type;
            if field == RESERVED_ID_FIELD && column_type != ColumnType::Text {
                return self.retype_id(cache, field).await;
            }
            return Some(column_type);
        }

        if let Err(e) = self.ensure_relation(cache).await {
            cache.fail(field, e.to_string());
            return None;
        }

        let relation = cache.relation().to_string();
        let _guard = self.locks.acquire(&relation).await;

        // Another worker may have added it since the cache was loaded.
        match self.sink.load_columns(&relation).await {
            Ok(columns) => {
                let current = RelationSchema::from_catalog(&relation, columns);
                if let Some(existing) = current.column(field) {
                    debug!(relation = %relation, column = %field, "Column added elsewhere");
                    cache.schema.add(existing.clone());
                    drop(_guard);
                    if field == RESERVED_ID_FIELD && existing.column_type != ColumnType::Text {
                        return self.retype_id(cache, field).await;
                    }
                    return Some(existing.column_type);
                }
            }
            Err(e) => {
                cache.fail(field, e.to_string());
                return None;
            }
        }

        let column = Column::new(field, infer_column_type(field, value));
        match self.sink.add_column(&relation, &column).await {
            Ok(()) => {
                info!(
                    relation = %relation,
                    column = %field,
                    column_type = %column.column_type,
                    "Added column"
                );
                let column_type = column.column_type;
                cache.schema.add(column);
                cache.added.push(field.to_string());
                Some(column_type)
            }
            Err(e) => {
                cache.fail(field, e.to_string());
                None
            }
        }
    }

    async fn retype_id(&self, cache: &mut SchemaCache, field: &str) -> Option<ColumnType> {
        let relation = cache.relation().to_string();
        let _guard = self.locks.acquire(&relation).await;

        match self.sink.retype_column_to_text(&relation, field).await {
            Ok(()) => {
                info!(relation = %relation, column = %field, "Retyped column to TEXT");
                cache.schema.retype_to_text(field);
                Some(ColumnType::Text)
            }
            Err(e) => {
                cache.fail(field, e.to_string());
                None
            }
        }
    }
}
