//! Document to row translation.

use docsync_core::{Document, Value};
use tracing::debug;

use super::reconciler::{SchemaCache, SchemaReconciler};
use super::report::{DocumentFailure, FailureKind};
use crate::db::{Cell, Row};

/// Turns documents into rows for one relation.
///
/// Fields not yet backed by a column are added on the fly through the
/// reconciler. The resulting row covers every known column, with NULL for
/// those the document lacks, so an upsert replaces the whole row.
pub struct Translator<'a> {
    reconciler: &'a SchemaReconciler,
}

impl<'a> Translator<'a> {
    pub fn new(reconciler: &'a SchemaReconciler) -> Self {
        Self { reconciler }
    }

    pub async fn translate(
        &self,
        collection: &str,
        cache: &mut SchemaCache,
        mut doc: Document,
    ) -> Result<Row, DocumentFailure> {
        let natural_key = doc.take_id().ok_or_else(|| {
            DocumentFailure::new(collection, None, FailureKind::MissingId, "document has no _id")
        })?;

        let mut cells: Vec<Cell> = Vec::with_capacity(cache.schema().columns().len());
        for (field, value) in doc.fields() {
            let Some(column_type) = self.reconciler.ensure_field(cache, field, value).await else {
                debug!(
                    relation = %cache.relation(),
                    column = %field,
                    id = %natural_key,
                    "Skipping field without a column"
                );
                continue;
            };

            let value = column_type.coerce(value).map_err(|conflict| {
                DocumentFailure::new(
                    collection,
                    Some(natural_key.clone()),
                    FailureKind::TypeConflict,
                    format!("field '{}': {}", field, conflict),
                )
            })?;

            cells.push(Cell {
                column: field.to_string(),
                column_type,
                value,
            });
        }

        for column in cache.schema().columns() {
            if cache.is_unavailable(&column.name) || cells.iter().any(|c| c.column == column.name) {
                continue;
            }
            cells.push(Cell {
                column: column.name.clone(),
                column_type: column.column_type,
                value: Value::Null,
            });
        }

        Ok(Row { natural_key, cells })
    }
}
