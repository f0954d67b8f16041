//! MongoDB source.

use async_trait::async_trait;
use chrono::DateTime;
use docsync_core::{Document, Value};
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Bson};
use mongodb::error::ErrorKind;
use mongodb::{Client, Database};

use super::{is_system_collection, DocumentSource, SourceError};

/// Reads collections of one MongoDB database.
pub struct MongoSource {
    db: Database,
}

impl MongoSource {
    /// Connects and pings the server so an unreachable source fails here.
    ///
    /// The database is `database` if given, otherwise the default database
    /// named in the URI.
    pub async fn connect(uri: &str, database: Option<&str>) -> Result<Self, SourceError> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| SourceError::Connection(e.to_string()))?;

        let db = match database {
            Some(name) => client.database(name),
            None => client.default_database().ok_or_else(|| {
                SourceError::Connection(
                    "No database given: set source_database or include one in the URI".to_string(),
                )
            })?,
        };

        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| SourceError::Connection(e.to_string()))?;

        tracing::info!(database = db.name(), "Connected to MongoDB");
        Ok(Self { db })
    }

    fn query_error(collection: &str, e: mongodb::error::Error) -> SourceError {
        match e.kind.as_ref() {
            ErrorKind::Io(_)
            | ErrorKind::ServerSelection { .. }
            | ErrorKind::DnsResolve { .. }
            | ErrorKind::ConnectionPoolCleared { .. } => SourceError::Connection(e.to_string()),
            _ => SourceError::Query {
                collection: collection.to_string(),
                message: e.to_string(),
            },
        }
    }
}

#[async_trait]
impl DocumentSource for MongoSource {
    async fn list_collections(&self) -> Result<Vec<String>, SourceError> {
        let mut names: Vec<String> = self
            .db
            .list_collection_names()
            .await
            .map_err(|e| Self::query_error("*", e))?
            .into_iter()
            .filter(|name| !is_system_collection(name))
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn find_one(&self, collection: &str) -> Result<Option<Document>, SourceError> {
        let found = self
            .db
            .collection::<bson::Document>(collection)
            .find_one(doc! {})
            .await
            .map_err(|e| Self::query_error(collection, e))?;
        Ok(found.map(convert_document))
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>, SourceError> {
        let cursor = self
            .db
            .collection::<bson::Document>(collection)
            .find(doc! {})
            .await
            .map_err(|e| Self::query_error(collection, e))?;

        let raw: Vec<bson::Document> = cursor
            .try_collect()
            .await
            .map_err(|e| Self::query_error(collection, e))?;

        Ok(raw.into_iter().map(convert_document).collect())
    }
}

/// Converts a BSON document into the closed value model.
pub fn convert_document(raw: bson::Document) -> Document {
    raw.into_iter()
        .map(|(name, value)| (name, convert_value(value)))
        .collect()
}

fn convert_value(value: Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(i) => Value::Int(i64::from(i)),
        Bson::Int64(i) => Value::Int(i),
        Bson::Double(f) => Value::Float(f),
        Bson::String(s) | Bson::Symbol(s) => Value::Text(s),
        Bson::ObjectId(oid) => Value::Text(oid.to_hex()),
        Bson::Decimal128(d) => decimal_text(d),
        // Dates chrono cannot represent keep their extended JSON form.
        Bson::DateTime(dt) => match DateTime::from_timestamp_millis(dt.timestamp_millis()) {
            Some(ts) => Value::Timestamp(ts),
            None => extjson_text(Bson::DateTime(dt)),
        },
        Bson::Timestamp(ts) => match DateTime::from_timestamp(i64::from(ts.time), 0) {
            Some(time) => Value::Timestamp(time),
            None => extjson_text(Bson::Timestamp(ts)),
        },
        // Nested documents, arrays and binary data are kept as extended JSON.
        other => extjson_text(other),
    }
}

fn extjson_text(value: Bson) -> Value {
    Value::Text(value.into_relaxed_extjson().to_string())
}

/// Canonical string of a decimal, taken from its extended JSON form.
fn decimal_text(d: bson::Decimal128) -> Value {
    match Bson::Decimal128(d).into_relaxed_extjson() {
        serde_json::Value::Object(map) => match map.get("$numberDecimal") {
            Some(serde_json::Value::String(s)) => Value::Text(s.clone()),
            _ => Value::Null,
        },
        other => Value::Text(other.to_string()),
    }
}
