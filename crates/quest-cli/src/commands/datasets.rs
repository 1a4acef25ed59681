//! Dataset commands

use super::parse_pairs;
use crate::cli::DatasetCommand;
use crate::output::OutputWriter;
use anyhow::Result;
use quest_core::formats::{OpenFormat, OpenedData};
use quest_core::models::{Dataset, DatasetSource, DatasetStatus};
use quest_engine::{DataRequest, DatasetFilters, Quest};
use serde::Serialize;
use tabled::Tabled;

#[derive(Tabled, Serialize)]
struct DatasetRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Display Name")]
    display_name: String,
    #[tabled(rename = "Collection")]
    collection: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Catalog Entry")]
    catalog_entry: String,
}

impl From<Dataset> for DatasetRow {
    fn from(d: Dataset) -> Self {
        Self {
            name: d.name,
            display_name: d.display_name,
            collection: d.collection,
            source: d.source.to_string(),
            status: d.status.to_string(),
            catalog_entry: d.catalog_entry,
        }
    }
}

pub async fn execute(cmd: DatasetCommand, quest: &Quest, output: &OutputWriter) -> Result<()> {
    match cmd {
        DatasetCommand::Add {
            collection,
            catalog_entries,
        } => {
            let created = quest.add_datasets(&collection, &catalog_entries).await?;
            if output.is_json() {
                return output.result(created);
            }
            for name in &created {
                println!("{}", name);
            }
            output.success(format!("Added {} dataset(s) to '{}'", created.len(), collection));
            Ok(())
        }
        DatasetCommand::Stage { datasets, options } => {
            let staged = quest
                .stage_for_download(&datasets, parse_pairs(&options)?)
                .await?;
            output.table(staged.into_iter().map(DatasetRow::from).collect())
        }
        DatasetCommand::Download {
            datasets,
            raise_on_error,
        } => {
            let statuses = quest.download_datasets(&datasets, raise_on_error).await?;
            let failed = statuses
                .values()
                .filter(|s| **s == DatasetStatus::FailedDownload)
                .count();
            if output.is_json() {
                return output.result(statuses);
            }
            for (name, status) in &statuses {
                output.kv(name, status);
            }
            if failed > 0 {
                output.warning(format!("{} download(s) failed", failed));
            }
            Ok(())
        }
        DatasetCommand::Get {
            service_uri,
            collection,
            filters,
            queries,
            options,
            no_cache,
            max_catalog_entries,
            seamless,
        } => {
            let mut request = DataRequest::new(service_uri)
                .collection(collection)
                .use_cache(!no_cache)
                .max_catalog_entries(max_catalog_entries);
            request.filters = parse_pairs(&filters)?;
            request.queries = queries;
            request.download_options = parse_pairs(&options)?;

            let datasets = if seamless {
                quest.get_seamless_data(&request).await?
            } else {
                quest.get_data(&request).await?
            };
            output.result(datasets)
        }
        DatasetCommand::List {
            collection,
            status,
            source,
            catalog_entry,
        } => {
            let filters = DatasetFilters {
                collection,
                status: status.as_deref().map(str::parse::<DatasetStatus>).transpose()?,
                source: source.as_deref().map(str::parse::<DatasetSource>).transpose()?,
                catalog_entry,
                ..Default::default()
            };
            let rows = quest
                .get_datasets(&filters)
                .await?
                .into_iter()
                .map(DatasetRow::from)
                .collect();
            output.table(rows)
        }
        DatasetCommand::Delete { uris } => {
            let deleted = quest.delete(&uris).await?;
            output.success(format!("Deleted {} dataset(s)", deleted.len()));
            Ok(())
        }
        DatasetCommand::Move { datasets, to } => {
            let moved = quest.move_datasets(&datasets, &to).await?;
            output.success(format!("Moved {} dataset(s) to '{}'", moved.len(), to));
            Ok(())
        }
        DatasetCommand::Copy { datasets, to } => {
            let copies = quest.copy_datasets(&datasets, &to).await?;
            output.result(copies)
        }
        DatasetCommand::Open { name } => match quest.open_dataset(&name, OpenFormat::Json).await? {
            OpenedData::Serialized(text) => {
                println!("{}", text);
                Ok(())
            }
            OpenedData::Native(data) => output.result(data),
        },
        DatasetCommand::Visualize { name, options } => {
            let path = quest.visualize_dataset(&name, &parse_pairs(&options)?).await?;
            output.success(format!("Wrote {}", path.display()));
            Ok(())
        }
    }
}
