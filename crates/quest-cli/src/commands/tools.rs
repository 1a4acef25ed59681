//! Tool commands

use super::parse_pairs;
use crate::cli::ToolCommand;
use crate::output::OutputWriter;
use anyhow::Result;
use quest_engine::{Quest, ToolFilters};
use serde::Serialize;
use tabled::Tabled;

#[derive(Tabled, Serialize)]
struct ToolRow {
    #[tabled(rename = "Tool")]
    name: String,
    #[tabled(rename = "Group")]
    group: String,
    #[tabled(rename = "Description")]
    description: String,
}

pub async fn execute(cmd: ToolCommand, quest: &Quest, output: &OutputWriter) -> Result<()> {
    match cmd {
        ToolCommand::List {
            group,
            datatype,
            dataset,
        } => {
            let filters = ToolFilters {
                group,
                datatype,
                dataset,
                ..Default::default()
            };
            let rows = quest
                .get_tools(&filters)
                .await?
                .into_iter()
                .map(|(name, meta)| ToolRow {
                    name,
                    group: meta.group,
                    description: meta.description,
                })
                .collect();
            output.table(rows)
        }
        ToolCommand::Options { name } => output.result(quest.get_tool_options(&name)?),
        ToolCommand::Run { name, options } => {
            let result = quest.run_tool(&name, &parse_pairs(&options)?).await?;
            if !output.is_json() {
                output.success(format!("{} created {} dataset(s)", name, result.datasets.len()));
            }
            output.result(result)
        }
    }
}
