//! Metadata and publish commands

use super::{parse_object, parse_pairs};
use crate::cli::{MetadataCommand, PublishArgs};
use crate::output::OutputWriter;
use anyhow::Result;
use quest_engine::{MetadataUpdate, Quest};

pub async fn execute(cmd: MetadataCommand, quest: &Quest, output: &OutputWriter) -> Result<()> {
    match cmd {
        MetadataCommand::Get { uris } => output.result(quest.get_metadata(&uris).await?),
        MetadataCommand::Update {
            uris,
            display_name,
            description,
            metadata,
        } => {
            let update = MetadataUpdate {
                display_name,
                description,
                metadata: metadata.as_deref().map(parse_object).transpose()?,
            };
            if uris.is_empty() {
                let project = quest.update_project_metadata(&update).await?;
                output.success(format!("Updated project '{}'", project.name));
                return Ok(());
            }
            output.result(quest.update_metadata(&uris, &update).await?)
        }
    }
}

pub async fn publish(args: PublishArgs, quest: &Quest, output: &OutputWriter) -> Result<()> {
    let result = quest
        .publish(&args.publisher, &args.dataset, &parse_pairs(&args.options)?)
        .await?;
    output.result(result)
}
