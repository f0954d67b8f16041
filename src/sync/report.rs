//! Per-cycle outcome reporting.

use serde::Serialize;

/// Why a single document was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The document has no usable `_id`.
    MissingId,
    /// A value cannot be stored losslessly in its column.
    TypeConflict,
    /// The upsert statement failed.
    Write,
    /// Shutdown abandoned the write while it was backing off after a
    /// connection error.
    Interrupted,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::MissingId => "missing id",
            FailureKind::TypeConflict => "type conflict",
            FailureKind::Write => "write",
            FailureKind::Interrupted => "interrupted",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentFailure {
    pub collection: String,
    /// Natural key of the document, when it has one.
    pub document_id: Option<String>,
    pub kind: FailureKind,
    pub message: String,
}

impl DocumentFailure {
    pub fn new(
        collection: &str,
        document_id: Option<String>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            collection: collection.to_string(),
            document_id,
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for DocumentFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.document_id {
            Some(id) => write!(
                f,
                "{}[{}]: {}: {}",
                self.collection, id, self.kind, self.message
            ),
            None => write!(f, "{}: {}: {}", self.collection, self.kind, self.message),
        }
    }
}

/// A column that could not be added or retyped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaFailure {
    pub relation: String,
    pub column: String,
    pub message: String,
}

impl std::fmt::Display for SchemaFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}: {}", self.relation, self.column, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionReport {
    pub collection: String,
    pub relation: String,
    pub documents_read: usize,
    pub rows_written: usize,
    pub columns_added: Vec<String>,
    pub schema_failures: Vec<SchemaFailure>,
    pub document_failures: Vec<DocumentFailure>,
    /// Set when the whole collection was abandoned.
    pub aborted: Option<String>,
}

impl CollectionReport {
    pub fn new(collection: &str, relation: &str) -> Self {
        Self {
            collection: collection.to_string(),
            relation: relation.to_string(),
            documents_read: 0,
            rows_written: 0,
            columns_added: Vec::new(),
            schema_failures: Vec::new(),
            document_failures: Vec::new(),
            aborted: None,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.aborted.is_some()
            || !self.schema_failures.is_empty()
            || !self.document_failures.is_empty()
    }
}

/// Outcome of one discovery-and-sync pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub collections: Vec<CollectionReport>,
    /// True when shutdown interrupted the cycle.
    pub cancelled: bool,
}

impl CycleReport {
    pub fn collection(&self, name: &str) -> Option<&CollectionReport> {
        self.collections.iter().find(|c| c.collection == name)
    }

    pub fn rows_written(&self) -> usize {
        self.collections.iter().map(|c| c.rows_written).sum()
    }

    pub fn documents_read(&self) -> usize {
        self.collections.iter().map(|c| c.documents_read).sum()
    }

    pub fn document_failures(&self) -> impl Iterator<Item = &DocumentFailure> {
        self.collections.iter().flat_map(|c| c.document_failures.iter())
    }

    pub fn schema_failures(&self) -> impl Iterator<Item = &SchemaFailure> {
        self.collections.iter().flat_map(|c| c.schema_failures.iter())
    }

    pub fn has_failures(&self) -> bool {
        self.collections.iter().any(CollectionReport::has_failures)
    }
}

impl std::fmt::Display for CycleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Synced {} collection(s): {} document(s) read, {} row(s) written",
            self.collections.len(),
            self.documents_read(),
            self.rows_written()
        )?;

        for c in &self.collections {
            write!(
                f,
                "  {} -> {}: {}/{} written",
                c.collection, c.relation, c.rows_written, c.documents_read
            )?;
            if !c.columns_added.is_empty() {
                write!(f, ", added columns: {}", c.columns_added.join(", "))?;
            }
            writeln!(f)?;
            if let Some(reason) = &c.aborted {
                writeln!(f, "    aborted: {}", reason)?;
            }
            for failure in &c.schema_failures {
                writeln!(f, "    schema: {}", failure)?;
            }
            for failure in &c.document_failures {
                writeln!(f, "    document: {}", failure)?;
            }
        }

        if self.cancelled {
            writeln!(f, "Cycle interrupted by shutdown")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_failures() {
        let mut report = CycleReport::default();
        report.collections.push(CollectionReport::new("orders", "orders"));
        assert!(!report.has_failures());

        report.collections[0].document_failures.push(DocumentFailure::new(
            "orders",
            Some("abc".to_string()),
            FailureKind::TypeConflict,
            "float value '42.5' cannot be stored losslessly in a INTEGER column",
        ));
        assert!(report.has_failures());
        assert_eq!(report.document_failures().count(), 1);
    }

    #[test]
    fn test_display_summary() {
        let mut orders = CollectionReport::new("Orders", "orders");
        orders.documents_read = 2;
        orders.rows_written = 1;
        orders.columns_added = vec!["total".to_string()];
        orders.document_failures.push(DocumentFailure::new(
            "Orders",
            None,
            FailureKind::MissingId,
            "document has no _id",
        ));
        let report = CycleReport {
            collections: vec![orders],
            cancelled: false,
        };

        let text = report.to_string();
        assert!(text.contains("2 document(s) read, 1 row(s) written"));
        assert!(text.contains("Orders -> orders: 1/2 written, added columns: total"));
        assert!(text.contains("document: Orders: missing id: document has no _id"));
    }

    #[test]
    fn test_serializes_to_json() {
        let report = CycleReport {
            collections: vec![CollectionReport::new("orders", "orders")],
            cancelled: true,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["cancelled"], true);
        assert_eq!(json["collections"][0]["relation"], "orders");
    }
}
