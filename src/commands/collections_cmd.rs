use clap::Args;
use docsync_core::relation_name;
use tokio_util::sync::CancellationToken;

use super::{connect, CommandError, Stores};
use docsync::config::Config;

/// List source collections and the relations they sync into
#[derive(Args)]
pub struct CollectionsCommand {}

impl CollectionsCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let stores = connect(config, &CancellationToken::new()).await?;
        for line in collection_lines(&stores).await? {
            println!("{}", line);
        }
        Ok(())
    }
}

async fn collection_lines(stores: &Stores) -> Result<Vec<String>, CommandError> {
    let collections = stores.source.list_collections().await?;
    if collections.is_empty() {
        return Ok(vec!["No collections found.".to_string()]);
    }

    let mut lines = Vec::with_capacity(collections.len());
    for collection in collections {
        let relation = relation_name(&collection);
        let status = if stores.sink.load_columns(&relation).await?.is_empty() {
            "not synced".to_string()
        } else {
            format!("{} rows", stores.sink.count_rows(&relation).await?)
        };
        lines.push(format!("{} -> {} ({})", collection, relation, status));
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync::db::{init_sqlite, SqliteSink};
    use docsync::source::MemorySource;
    use docsync::sync::{SchedulerConfig, SyncScheduler};
    use docsync_core::{Document, Value, ID_FIELD};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_lists_sync_status() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_sqlite(&temp_dir.path().join("sink.db")).await.unwrap();
        let source = Arc::new(MemorySource::new());
        source.insert(
            "Orders",
            Document::new().with_field(ID_FIELD, Value::Text("a".into())),
        );
        let stores = Stores {
            source: source.clone(),
            sink: Arc::new(SqliteSink::new(pool)),
        };

        SyncScheduler::new(
            stores.source.clone(),
            stores.sink.clone(),
            SchedulerConfig::default(),
        )
        .run_cycle(&CancellationToken::new())
        .await
        .unwrap();
        source.create_collection("customers");

        let lines = collection_lines(&stores).await.unwrap();
        assert_eq!(
            lines,
            vec!["Orders -> orders (1 rows)", "customers -> customers (not synced)"]
        );
    }

    #[tokio::test]
    async fn test_no_collections() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_sqlite(&temp_dir.path().join("sink.db")).await.unwrap();
        let stores = Stores {
            source: Arc::new(MemorySource::new()),
            sink: Arc::new(SqliteSink::new(pool)),
        };

        let lines = collection_lines(&stores).await.unwrap();
        assert_eq!(lines, vec!["No collections found."]);
    }
}
