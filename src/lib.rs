//! Continuous replication of MongoDB collections into relational tables.
//!
//! Each collection becomes a table named after it in lower case. Columns are
//! inferred from the documents and only ever added, and rows are upserted on
//! the document's `_id`.

pub mod config;
pub mod db;
pub mod retrying;
pub mod source;
pub mod sync;
