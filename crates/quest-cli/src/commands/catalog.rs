//! Catalog search, tags and user catalog entries

use super::{parse_object, parse_pairs};
use crate::cli::{CatalogCommand, SearchFormat};
use crate::output::OutputWriter;
use anyhow::Result;
use quest_engine::catalog::{NewCatalogEntry, SearchOutput};
use quest_engine::{Quest, SearchOptions, SearchResult, TagOptions};
use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;

#[derive(Tabled, Serialize)]
struct EntryRow {
    #[tabled(rename = "URI")]
    name: String,
    #[tabled(rename = "Display Name")]
    display_name: String,
    #[tabled(rename = "Parameters")]
    parameters: String,
    #[tabled(rename = "Geometry")]
    geometry: String,
}

fn search_output(format: SearchFormat) -> SearchOutput {
    match format {
        SearchFormat::Uris => SearchOutput::Uris,
        SearchFormat::Table => SearchOutput::Table,
        SearchFormat::Geojson => SearchOutput::GeoJson,
        SearchFormat::Expanded => SearchOutput::Expanded,
    }
}

pub async fn execute(cmd: CatalogCommand, quest: &Quest, output: &OutputWriter) -> Result<()> {
    match cmd {
        CatalogCommand::Search {
            uris,
            filters,
            queries,
            update_cache,
            format,
        } => {
            let options = SearchOptions {
                filters: parse_pairs(&filters)?,
                queries,
                update_cache,
                output: search_output(format),
            };
            match quest.search_catalog(&uris, &options).await? {
                SearchResult::Table(entries) if !output.is_json() => {
                    let rows = entries
                        .into_iter()
                        .map(|e| EntryRow {
                            name: e.name,
                            display_name: e.display_name,
                            parameters: e.parameters,
                            geometry: e.geometry.unwrap_or_default(),
                        })
                        .collect();
                    output.table(rows)
                }
                SearchResult::Uris(uris) if !output.is_json() => {
                    for uri in uris {
                        println!("{}", uri);
                    }
                    Ok(())
                }
                other => output.result(other),
            }
        }
        CatalogCommand::Tags {
            uris,
            keys,
            count,
            update_cache,
        } => {
            let options = TagOptions {
                keys: (!keys.is_empty()).then_some(keys),
                as_count: count,
                update_cache,
            };
            output.result(quest.get_tags(&uris, &options).await?)
        }
        CatalogCommand::New {
            geometry,
            geom_type,
            coordinates,
            display_name,
            description,
            metadata,
        } => {
            let request = NewCatalogEntry {
                geometry: geometry.map(|g| serde_json::from_str(&g).unwrap_or(Value::String(g))),
                geom_type,
                coordinates: coordinates
                    .as_deref()
                    .map(serde_json::from_str::<Value>)
                    .transpose()?,
                display_name,
                description,
                parameters: Vec::new(),
                metadata: metadata.as_deref().map(parse_object).transpose()?.unwrap_or_default(),
            };
            let uri = quest.new_catalog_entry(request).await?;
            output.success(format!("Created catalog entry {}", uri));
            Ok(())
        }
    }
}
