//! In-memory sink for tests that need to script failures or inspect the
//! statements a component issued.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use docsync_core::{Column, ColumnType, Dialect, NATURAL_KEY, SURROGATE_KEY};
use tokio_util::sync::CancellationToken;

use super::{RelationalSink, Row, SinkError};

#[derive(Default)]
struct State {
    relations: HashMap<String, Vec<Column>>,
    rows: HashMap<String, HashMap<String, Row>>,
    calls: Vec<String>,
    failures: HashMap<&'static str, VecDeque<SinkError>>,
    cancel_on_add: Option<(String, CancellationToken)>,
}

pub struct FakeSink {
    dialect: Dialect,
    state: Mutex<State>,
}

impl FakeSink {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            state: Mutex::new(State::default()),
        }
    }

    /// Makes the next calls of `operation` fail with `errors`, in order.
    pub fn fail_next(&self, operation: &'static str, errors: impl IntoIterator<Item = SinkError>) {
        self.state()
            .failures
            .entry(operation)
            .or_default()
            .extend(errors);
    }

    /// Fires `cancel` while the column named `column` is being added.
    pub fn cancel_when_adding(&self, column: &str, cancel: CancellationToken) {
        self.state().cancel_on_add = Some((column.to_string(), cancel));
    }

    /// Seeds a relation with key columns plus `columns`.
    pub fn with_relation(self, relation: &str, columns: Vec<Column>) -> Self {
        let mut all = key_columns();
        all.extend(columns);
        self.state().relations.insert(relation.to_string(), all);
        self
    }

    /// Every call made so far, as `operation relation[.column]`.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn row(&self, relation: &str, natural_key: &str) -> Option<Row> {
        self.state()
            .rows
            .get(relation)
            .and_then(|rows| rows.get(natural_key))
            .cloned()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn begin(&self, operation: &'static str, target: String) -> Result<(), SinkError> {
        let mut state = self.state();
        state.calls.push(format!("{} {}", operation, target));
        match state.failures.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn key_columns() -> Vec<Column> {
    vec![
        Column::new(SURROGATE_KEY, ColumnType::Integer),
        Column::new(NATURAL_KEY, ColumnType::Text),
    ]
}

#[async_trait]
impl RelationalSink for FakeSink {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn create_relation(&self, relation: &str) -> Result<(), SinkError> {
        self.begin("create_relation", relation.to_string())?;
        self.state()
            .relations
            .entry(relation.to_string())
            .or_insert_with(key_columns);
        Ok(())
    }

    async fn load_columns(&self, relation: &str) -> Result<Vec<Column>, SinkError> {
        self.begin("load_columns", relation.to_string())?;
        Ok(self
            .state()
            .relations
            .get(relation)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_column(&self, relation: &str, column: &Column) -> Result<(), SinkError> {
        {
            let state = self.state();
            if let Some((name, cancel)) = &state.cancel_on_add {
                if *name == column.name {
                    cancel.cancel();
                }
            }
        }
        self.begin("add_column", format!("{}.{}", relation, column.name))?;

        let mut state = self.state();
        let columns = state
            .relations
            .get_mut(relation)
            .ok_or_else(|| SinkError::SchemaEvolution {
                relation: relation.to_string(),
                column: Some(column.name.clone()),
                message: "no such relation".to_string(),
            })?;
        if !columns.iter().any(|c| c.name == column.name) {
            columns.push(column.clone());
        }
        Ok(())
    }

    async fn retype_column_to_text(&self, relation: &str, column: &str) -> Result<(), SinkError> {
        self.begin("retype_column_to_text", format!("{}.{}", relation, column))?;

        let mut state = self.state();
        let existing = state
            .relations
            .get_mut(relation)
            .and_then(|columns| columns.iter_mut().find(|c| c.name == column))
            .ok_or_else(|| SinkError::SchemaEvolution {
                relation: relation.to_string(),
                column: Some(column.to_string()),
                message: "no such column".to_string(),
            })?;
        existing.column_type = ColumnType::Text;
        Ok(())
    }

    async fn upsert(&self, relation: &str, row: &Row) -> Result<(), SinkError> {
        self.begin("upsert", format!("{}.{}", relation, row.natural_key))?;
        self.state()
            .rows
            .entry(relation.to_string())
            .or_default()
            .insert(row.natural_key.clone(), row.clone());
        Ok(())
    }

    async fn count_rows(&self, relation: &str) -> Result<i64, SinkError> {
        self.begin("count_rows", relation.to_string())?;
        Ok(self
            .state()
            .rows
            .get(relation)
            .map_or(0, |rows| rows.len() as i64))
    }
}
