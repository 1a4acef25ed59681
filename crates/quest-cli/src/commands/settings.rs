//! Settings commands

use crate::cli::{SettingsCommand, SettingsSetArgs};
use crate::output::OutputWriter;
use anyhow::Result;
use quest_core::config::SettingsUpdate;
use quest_engine::Quest;
use serde::Serialize;
use tabled::Tabled;

#[derive(Tabled, Serialize)]
struct SettingRow {
    #[tabled(rename = "Setting")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Source")]
    source: String,
}

pub async fn execute(cmd: SettingsCommand, quest: &Quest, output: &OutputWriter) -> Result<()> {
    match cmd {
        SettingsCommand::Show => show(quest, output).await,
        SettingsCommand::Set(args) => set(args, quest, output).await,
    }
}

async fn show(quest: &Quest, output: &OutputWriter) -> Result<()> {
    let mut rows: Vec<SettingRow> = quest
        .get_settings()
        .await
        .to_inspection_map()
        .into_iter()
        .map(|(key, (value, source))| SettingRow {
            key,
            value,
            source: format!("{:?}", source),
        })
        .collect();
    rows.sort_by(|a, b| a.key.cmp(&b.key));
    output.table(rows)
}

async fn set(args: SettingsSetArgs, quest: &Quest, output: &OutputWriter) -> Result<()> {
    let update = SettingsUpdate {
        base_dir: args.base_dir,
        cache_dir: args.cache_dir,
        projects_dir: args.projects_dir,
        user_services: (!args.user_services.is_empty()).then_some(args.user_services),
    };
    quest.update_settings(update).await;
    let path = quest.save_settings(args.output.as_deref()).await?;
    output.success(format!("Saved settings to {}", path.display()));
    Ok(())
}
