//! SQLite sink.

use async_trait::async_trait;
use docsync_core::{canonical_timestamp, Column, ColumnType, Dialect, Value};
use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::query::Query;
use sqlx::SqlitePool;

use super::{Cell, RelationalSink, Row, SinkError};

const DIALECT: Dialect = Dialect::Sqlite;

pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn bind_cell<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    cell: &'q Cell,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match (&cell.value, cell.column_type) {
        (Value::Null, ColumnType::Boolean) => query.bind(None::<bool>),
        (Value::Null, ColumnType::Integer | ColumnType::BigInt) => query.bind(None::<i64>),
        (Value::Null, ColumnType::Numeric) => query.bind(None::<f64>),
        (Value::Null, ColumnType::Text) => query.bind(None::<String>),
        (Value::Bool(b), _) => query.bind(*b),
        (Value::Int(i), _) => query.bind(*i),
        (Value::Float(f), _) => query.bind(*f),
        (Value::Text(s), _) => query.bind(s.as_str()),
        (Value::Timestamp(ts), _) => query.bind(canonical_timestamp(ts)),
    }
}

#[async_trait]
impl RelationalSink for SqliteSink {
    fn dialect(&self) -> Dialect {
        DIALECT
    }

    async fn create_relation(&self, relation: &str) -> Result<(), SinkError> {
        sqlx::query(&DIALECT.create_relation(relation))
            .execute(&self.pool)
            .await
            .map_err(|e| SinkError::schema(relation, None, e))?;
        Ok(())
    }

    async fn load_columns(&self, relation: &str) -> Result<Vec<Column>, SinkError> {
        let rows: Vec<(String, String)> = sqlx::query_as(DIALECT.list_columns())
            .bind(relation)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type)| Column::new(name, ColumnType::from_catalog(&data_type)))
            .collect())
    }

    async fn add_column(&self, relation: &str, column: &Column) -> Result<(), SinkError> {
        match sqlx::query(&DIALECT.add_column(relation, column))
            .execute(&self.pool)
            .await
        {
            Ok(_) => Ok(()),
            // SQLite has no ADD COLUMN IF NOT EXISTS.
            Err(sqlx::Error::Database(db)) if db.message().contains("duplicate column name") => {
                Ok(())
            }
            Err(e) => Err(SinkError::schema(relation, Some(&column.name), e)),
        }
    }

    async fn retype_column_to_text(&self, relation: &str, column: &str) -> Result<(), SinkError> {
        match DIALECT.retype_to_text(relation, column) {
            Some(sql) => {
                sqlx::query(&sql)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| SinkError::schema(relation, Some(column), e))?;
                Ok(())
            }
            None => Err(SinkError::SchemaEvolution {
                relation: relation.to_string(),
                column: Some(column.to_string()),
                message: "SQLite cannot change a column's type".to_string(),
            }),
        }
    }

    async fn upsert(&self, relation: &str, row: &Row) -> Result<(), SinkError> {
        let columns: Vec<&str> = row.cells.iter().map(|c| c.column.as_str()).collect();
        let sql = DIALECT.upsert(relation, &columns);

        let mut query = sqlx::query(&sql).bind(row.natural_key.as_str());
        for cell in &row.cells {
            query = bind_cell(query, cell);
        }

        query
            .execute(&self.pool)
            .await
            .map_err(|e| SinkError::write(relation, e))?;
        Ok(())
    }

    async fn count_rows(&self, relation: &str) -> Result<i64, SinkError> {
        let (count,): (i64,) = sqlx::query_as(&DIALECT.count_rows(relation))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
