//! docsync core library
//!
//! Value model, type inference and SQL generation shared by the docsync
//! replication binary. Nothing in this crate performs I/O except the retry
//! helper, which only sleeps.

pub mod column_type;
pub mod retry;
pub mod schema;
pub mod sql;
pub mod value;

pub use column_type::{classify, classify_field, infer_column_type, ColumnType, TypeConflict};
pub use retry::{retry_async, RetryOutcome, RetryPolicy};
pub use schema::{
    is_key_column, quote_ident, relation_name, Column, RelationSchema, NATURAL_KEY,
    RESERVED_ID_FIELD, SURROGATE_KEY,
};
pub use sql::Dialect;
pub use value::{canonical_timestamp, Document, Value, ID_FIELD};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
