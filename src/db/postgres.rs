//! PostgreSQL sink.

use async_trait::async_trait;
use docsync_core::{canonical_timestamp, Column, ColumnType, Dialect, Value};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, Postgres};
use sqlx::query::Query;

use super::{Cell, RelationalSink, Row, SinkError};

const DIALECT: Dialect = Dialect::Postgres;

pub struct PostgresSink {
    pool: PgPool,
}

impl PostgresSink {
    /// Connects to the target database. The database itself must exist.
    pub async fn connect(uri: &str) -> Result<Self, SinkError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(uri)
            .await
            .map_err(|e| SinkError::Connection(e.to_string()))?;

        tracing::info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }
}

/// Binds a cell with the SQL type of its column.
///
/// NULLs need the column's type, since PostgreSQL will not assign a TEXT
/// NULL to a numeric or boolean column.
fn bind_cell<'q>(
    query: Query<'q, Postgres, PgArguments>,
    cell: &'q Cell,
) -> Query<'q, Postgres, PgArguments> {
    match (&cell.value, cell.column_type) {
        (Value::Null, ColumnType::Boolean) => query.bind(None::<bool>),
        (Value::Null, ColumnType::Integer) => query.bind(None::<i32>),
        (Value::Null, ColumnType::BigInt) => query.bind(None::<i64>),
        (Value::Null, ColumnType::Numeric) => query.bind(None::<f64>),
        (Value::Null, ColumnType::Text) => query.bind(None::<String>),
        (Value::Bool(b), _) => query.bind(*b),
        (Value::Int(i), ColumnType::Integer) => match i32::try_from(*i) {
            Ok(small) => query.bind(small),
            Err(_) => query.bind(*i),
        },
        (Value::Int(i), _) => query.bind(*i),
        (Value::Float(f), _) => query.bind(*f),
        (Value::Text(s), _) => query.bind(s.as_str()),
        (Value::Timestamp(ts), _) => query.bind(canonical_timestamp(ts)),
    }
}

#[async_trait]
impl RelationalSink for PostgresSink {
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
        sqlx::query(&DIALECT.add_column(relation, column))
            .execute(&self.pool)
            .await
            .map_err(|e| SinkError::schema(relation, Some(&column.name), e))?;
        Ok(())
    }

    async fn retype_column_to_text(&self, relation: &str, column: &str) -> Result<(), SinkError> {
        let sql = DIALECT
            .retype_to_text(relation, column)
            .ok_or_else(|| SinkError::SchemaEvolution {
                relation: relation.to_string(),
                column: Some(column.to_string()),
                message: "column retype not supported".to_string(),
            })?;

        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| SinkError::schema(relation, Some(column), e))?;
        Ok(())
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
