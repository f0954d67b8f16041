//! Relation naming conventions and the cached shape of a relation.

use serde::Serialize;

use crate::column_type::ColumnType;

/// Auto-incrementing surrogate primary key present in every relation.
pub const SURROGATE_KEY: &str = "surrogate_id";
/// Unique column holding the source document's stable identifier.
pub const NATURAL_KEY: &str = "mongo_id";
/// Field name that is always stored as TEXT.
pub const RESERVED_ID_FIELD: &str = "id";

/// Relation name for a collection: the lower-cased collection name.
pub fn relation_name(collection: &str) -> String {
    collection.to_lowercase()
}

/// Quotes an identifier for use in SQL, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// True for the two key columns every relation carries.
pub fn is_key_column(name: &str) -> bool {
    name == SURROGATE_KEY || name == NATURAL_KEY
}

/// A data column of a relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Known shape of one relation.
///
/// Holds the data columns (key columns excluded) in creation order. The set
/// only grows: adding a column that already exists leaves it untouched, and
/// the only type change allowed is [`RelationSchema::retype_to_text`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationSchema {
    name: String,
    exists: bool,
    columns: Vec<Column>,
}

impl RelationSchema {
    /// Schema of a relation that does not exist yet.
    pub fn absent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exists: false,
            columns: Vec::new(),
        }
    }

    /// Schema of an existing relation, as read from the catalog.
    ///
    /// Key columns in `columns` are dropped. An empty catalog listing means
    /// the relation does not exist.
    pub fn from_catalog(name: impl Into<String>, columns: Vec<Column>) -> Self {
        let exists = !columns.is_empty();
        let columns = columns
            .into_iter()
            .filter(|c| !is_key_column(&c.name))
            .collect();
        Self {
            name: name.into(),
            exists,
            columns,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn mark_created(&mut self) {
        self.exists = true;
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Records a newly added column. Returns false if it was already known.
    pub fn add(&mut self, column: Column) -> bool {
        if self.contains(&column.name) {
            return false;
        }
        self.columns.push(column);
        true
    }

    /// Records that a column now has type TEXT.
    pub fn retype_to_text(&mut self, name: &str) {
        if let Some(column) = self.columns.iter_mut().find(|c| c.name == name) {
            column.column_type = ColumnType::Text;
        }
    }

    /// True if every column of `earlier` is still present.
    pub fn is_superset_of(&self, earlier: &RelationSchema) -> bool {
        earlier.columns.iter().all(|c| self.contains(&c.name))
    }
}
