//! Collection commands

use crate::cli::CollectionCommand;
use crate::output::OutputWriter;
use anyhow::Result;
use quest_engine::Quest;
use serde::Serialize;
use tabled::Tabled;

#[derive(Tabled, Serialize)]
struct CollectionRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Display Name")]
    display_name: String,
    #[tabled(rename = "Description")]
    description: String,
}

pub async fn execute(cmd: CollectionCommand, quest: &Quest, output: &OutputWriter) -> Result<()> {
    match cmd {
        CollectionCommand::List => {
            let rows = quest
                .get_collections()
                .await?
                .into_iter()
                .map(|c| CollectionRow {
                    name: c.name,
                    display_name: c.display_name,
                    description: c.description,
                })
                .collect();
            output.table(rows)
        }
        CollectionCommand::New {
            name,
            display_name,
            description,
        } => {
            quest
                .new_collection(&name, display_name.as_deref(), description.as_deref(), None)
                .await?;
            output.success(format!("Created collection '{}'", name));
            Ok(())
        }
        CollectionCommand::Delete { name } => {
            let removed = quest.delete_collection(&name).await?;
            output.success(format!(
                "Deleted collection '{}' and {} dataset(s)",
                name,
                removed.len()
            ));
            Ok(())
        }
    }
}
