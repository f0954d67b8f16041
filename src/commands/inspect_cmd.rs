use clap::Args;
use docsync_core::{
    classify_field, is_key_column, relation_name, ColumnType, RelationSchema, ID_FIELD,
    RESERVED_ID_FIELD,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{connect, CommandError, OutputFormat, Stores};
use docsync::config::Config;

/// Show how a collection's sample document maps onto its relation
///
/// Nothing is written; this previews the columns the next cycle would add.
#[derive(Args)]
pub struct InspectCommand {
    /// Collection name
    collection: String,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Serialize, PartialEq)]
struct FieldPlan {
    field: String,
    sample_kind: &'static str,
    /// Type the classifier assigns, if the sample carries one
    inferred: Option<String>,
    /// Type of the existing column, if any
    existing: Option<String>,
    action: &'static str,
}

#[derive(Debug, Serialize)]
struct Inspection {
    collection: String,
    relation: String,
    relation_exists: bool,
    fields: Vec<FieldPlan>,
}

impl InspectCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let stores = connect(config, &CancellationToken::new()).await?;
        let Some(inspection) = inspect(&stores, &self.collection).await? else {
            println!("Collection '{}' is empty or does not exist.", self.collection);
            return Ok(());
        };

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&inspection)?),
            OutputFormat::Text => {
                println!(
                    "{} -> {}{}",
                    inspection.collection,
                    inspection.relation,
                    if inspection.relation_exists { "" } else { " (will be created)" }
                );
                println!();
                for plan in &inspection.fields {
                    println!(
                        "  {:<24} {:<10} {:<8} {}",
                        plan.field,
                        plan.sample_kind,
                        plan.existing
                            .as_deref()
                            .or(plan.inferred.as_deref())
                            .unwrap_or("TEXT"),
                        plan.action
                    );
                }
            }
        }
        Ok(())
    }
}

async fn inspect(stores: &Stores, collection: &str) -> Result<Option<Inspection>, CommandError> {
    let Some(sample) = stores.source.find_one(collection).await? else {
        return Ok(None);
    };

    let relation = relation_name(collection);
    let schema =
        RelationSchema::from_catalog(&relation, stores.sink.load_columns(&relation).await?);

    let fields = sample
        .fields()
        .filter(|(name, _)| *name != ID_FIELD)
        .map(|(name, value)| {
            let inferred = classify_field(name, value).map(|t| t.to_string());
            let existing = schema.column(name).map(|c| c.column_type);
            let action = if is_key_column(name) {
                "skip (key column)"
            } else {
                match existing {
                    Some(column_type)
                        if name == RESERVED_ID_FIELD && column_type != ColumnType::Text =>
                    {
                        "retype to TEXT"
                    }
                    Some(_) => "keep",
                    None => "add",
                }
            };
            FieldPlan {
                field: name.to_string(),
                sample_kind: value.kind(),
                inferred,
                existing: existing.map(|t| t.to_string()),
                action,
            }
        })
        .collect();

    Ok(Some(Inspection {
        collection: collection.to_string(),
        relation,
        relation_exists: schema.exists(),
        fields,
    }))
}
