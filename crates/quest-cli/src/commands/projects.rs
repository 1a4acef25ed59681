//! Project commands

use crate::cli::ProjectCommand;
use crate::output::OutputWriter;
use anyhow::Result;
use quest_core::models::Project;
use quest_engine::projects::ProjectOptions;
use quest_engine::Quest;
use serde::Serialize;
use tabled::Tabled;

#[derive(Tabled, Serialize)]
struct ProjectRow {
    #[tabled(rename = "")]
    active: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Display Name")]
    display_name: String,
    #[tabled(rename = "Folder")]
    folder: String,
}

pub async fn execute(cmd: ProjectCommand, quest: &Quest, output: &OutputWriter) -> Result<()> {
    match cmd {
        ProjectCommand::List => {
            let active = quest.get_active_project().await?.name;
            let rows = quest
                .get_projects()
                .await?
                .into_iter()
                .map(|p| ProjectRow {
                    active: if p.name == active { "*".to_string() } else { String::new() },
                    name: p.name,
                    display_name: p.display_name,
                    folder: p.folder.display().to_string(),
                })
                .collect();
            output.table(rows)
        }
        ProjectCommand::Show => show(&quest.get_active_project().await?, output),
        ProjectCommand::New {
            name,
            display_name,
            description,
            folder,
            activate,
        } => {
            let options = ProjectOptions {
                display_name,
                description,
                folder,
                activate,
                ..Default::default()
            };
            let project = quest.new_project(&name, options).await?;
            output.success(format!(
                "Created project '{}' in {}",
                project.name,
                project.folder.display()
            ));
            Ok(())
        }
        ProjectCommand::Add {
            name,
            folder,
            activate,
        } => {
            let project = quest.add_project(&name, &folder, activate).await?;
            output.success(format!("Registered project '{}'", project.name));
            Ok(())
        }
        ProjectCommand::Activate { name } => {
            quest.set_active_project(&name).await?;
            output.success(format!("Active project is now '{}'", name));
            Ok(())
        }
        ProjectCommand::Delete {
            name,
            delete_folder,
        } => {
            quest.delete_project(&name, delete_folder).await?;
            output.success(format!("Deleted project '{}'", name));
            Ok(())
        }
    }
}

fn show(project: &Project, output: &OutputWriter) -> Result<()> {
    if output.is_json() {
        return output.result(project);
    }
    output.section("Active Project");
    output.kv("Name", &project.name);
    output.kv("Display Name", &project.display_name);
    output.kv("Description", &project.description);
    output.kv("Folder", project.folder.display());
    output.kv("Created", project.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    Ok(())
}
