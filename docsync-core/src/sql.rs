//! SQL text for the supported sink dialects.
//!
//! Only statement text lives here; binding and execution belong to the sink
//! adapters. Every identifier goes through [`quote_ident`].

use crate::schema::{quote_ident, Column, NATURAL_KEY, SURROGATE_KEY};

/// SQL dialect of a relational sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Bind placeholder for the 1-based parameter `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::Sqlite => format!("?{}", index),
        }
    }

    /// Creates a relation with its surrogate and natural keys.
    pub fn create_relation(&self, relation: &str) -> String {
        let surrogate = match self {
            Dialect::Postgres => "SERIAL PRIMARY KEY",
            Dialect::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
        };
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({} {}, {} TEXT NOT NULL UNIQUE)",
            quote_ident(relation),
            quote_ident(SURROGATE_KEY),
            surrogate,
            quote_ident(NATURAL_KEY),
        )
    }

    /// Lists the columns of a relation as `(name, type)` rows.
    ///
    /// The relation name is bound as the first parameter.
    pub fn list_columns(&self) -> &'static str {
        match self {
            Dialect::Postgres => {
                "SELECT column_name::text, data_type::text FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = $1 \
                 ORDER BY ordinal_position"
            }
            Dialect::Sqlite => "SELECT name, type FROM pragma_table_info(?1) ORDER BY cid",
        }
    }

    /// Adds a nullable column.
    pub fn add_column(&self, relation: &str, column: &Column) -> String {
        let guard = match self {
            Dialect::Postgres => "IF NOT EXISTS ",
            // SQLite has no IF NOT EXISTS here; the sink treats a duplicate as success.
            Dialect::Sqlite => "",
        };
        format!(
            "ALTER TABLE {} ADD COLUMN {}{} {}",
            quote_ident(relation),
            guard,
            quote_ident(&column.name),
            column.column_type.sql_name(),
        )
    }

    /// Changes a column's type to TEXT, or `None` if the dialect cannot.
    pub fn retype_to_text(&self, relation: &str, column: &str) -> Option<String> {
        match self {
            Dialect::Postgres => {
                let column = quote_ident(column);
                Some(format!(
                    "ALTER TABLE {} ALTER COLUMN {} TYPE TEXT USING {}::TEXT",
                    quote_ident(relation),
                    column,
                    column,
                ))
            }
            Dialect::Sqlite => None,
        }
    }

    /// Insert-or-replace keyed on the natural key.
    ///
    /// The natural key is parameter 1, followed by `columns` in order. On
    /// conflict every listed column is overwritten.
    pub fn upsert(&self, relation: &str, columns: &[&str]) -> String {
        let mut names = vec![quote_ident(NATURAL_KEY)];
        names.extend(columns.iter().map(|c| quote_ident(c)));

        let placeholders: Vec<String> = (1..=names.len()).map(|i| self.placeholder(i)).collect();

        let on_conflict = if columns.is_empty() {
            "DO NOTHING".to_string()
        } else {
            let assignments: Vec<String> = columns
                .iter()
                .map(|c| {
                    let quoted = quote_ident(c);
                    format!("{} = EXCLUDED.{}", quoted, quoted)
                })
                .collect();
            format!("DO UPDATE SET {}", assignments.join(", "))
        };

        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
            quote_ident(relation),
            names.join(", "),
            placeholders.join(", "),
            quote_ident(NATURAL_KEY),
            on_conflict,
        )
    }

    /// Counts the rows of a relation.
    pub fn count_rows(&self, relation: &str) -> String {
        format!("SELECT COUNT(*) FROM {}", quote_ident(relation))
    }
}
