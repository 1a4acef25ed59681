//! Command implementations

mod catalog;
mod collections;
mod datasets;
mod metadata;
mod projects;
mod providers;
mod settings;
mod tools;

use crate::cli::{Cli, Commands};
use crate::output::OutputWriter;
use anyhow::{bail, Context, Result};
use quest_core::models::Metadata;
use quest_engine::Quest;
use serde_json::Value;
use tracing::debug;

/// Execute a CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let output = OutputWriter::new(cli.json);
    let quest = Quest::new();
    if let Some(path) = &cli.settings {
        quest
            .load_settings(path)
            .await
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    }

    debug!(json = cli.json, settings = ?cli.settings, "Starting quest");
    let result = match cli.command {
        Commands::Settings(cmd) => settings::execute(cmd, &quest, &output).await,
        Commands::Project(cmd) => projects::execute(cmd, &quest, &output).await,
        Commands::Collection(cmd) => collections::execute(cmd, &quest, &output).await,
        Commands::Provider(cmd) => providers::execute(cmd, &quest, &output).await,
        Commands::Catalog(cmd) => catalog::execute(cmd, &quest, &output).await,
        Commands::Dataset(cmd) => datasets::execute(cmd, &quest, &output).await,
        Commands::Tool(cmd) => tools::execute(cmd, &quest, &output).await,
        Commands::Metadata(cmd) => metadata::execute(cmd, &quest, &output).await,
        Commands::Publish(args) => metadata::publish(args, &quest, &output).await,
    };

    if let Err(e) = &result {
        output.error(format!("{:#}", e));
    }
    result
}

/// A command-line value: JSON when it parses, a plain string otherwise
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Parse repeated `key=value` arguments into a mapping
pub(crate) fn parse_pairs(pairs: &[String]) -> Result<Metadata> {
    let mut map = Metadata::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Expected KEY=VALUE, got '{}'", pair);
        };
        map.insert(key.trim().to_string(), parse_value(value.trim()));
    }
    Ok(map)
}

/// Parse a JSON object argument
pub(crate) fn parse_object(raw: &str) -> Result<Metadata> {
    match serde_json::from_str::<Value>(raw).context("Expected a JSON object")? {
        Value::Object(map) => Ok(map),
        other => bail!("Expected a JSON object, got {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_pairs() {
        let pairs = vec![
            "bbox=[-98.2, 30.0, -97.4, 30.6]".to_string(),
            "period=P365D".to_string(),
            "sigma=3".to_string(),
        ];
        let map = parse_pairs(&pairs).unwrap();
        assert_eq!(map["bbox"], json!([-98.2, 30.0, -97.4, 30.6]));
        assert_eq!(map["period"], "P365D");
        assert_eq!(map["sigma"], 3);
        assert!(parse_pairs(&["novalue".to_string()]).is_err());
    }

    #[test]
    fn test_parse_object() {
        assert_eq!(parse_object(r#"{"a": 1}"#).unwrap()["a"], 1);
        assert!(parse_object("[1]").is_err());
        assert!(parse_object("not json").is_err());
    }
}
