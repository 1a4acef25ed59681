//! Provider, service and publisher commands

use crate::cli::ProviderCommand;
use crate::output::OutputWriter;
use anyhow::Result;
use quest_core::models::ServiceType;
use quest_engine::providers::ServiceFilters;
use quest_engine::Quest;
use serde::Serialize;
use tabled::Tabled;

#[derive(Tabled, Serialize)]
struct ProviderRow {
    #[tabled(rename = "Provider")]
    name: String,
    #[tabled(rename = "Display Name")]
    display_name: String,
    #[tabled(rename = "Services")]
    services: String,
    #[tabled(rename = "Publishers")]
    publishers: String,
}

#[derive(Tabled, Serialize)]
struct ServiceRow {
    #[tabled(rename = "URI")]
    uri: String,
    #[tabled(rename = "Type")]
    service_type: String,
    #[tabled(rename = "Datatype")]
    datatype: String,
    #[tabled(rename = "Parameters")]
    parameters: String,
}

pub async fn execute(cmd: ProviderCommand, quest: &Quest, output: &OutputWriter) -> Result<()> {
    match cmd {
        ProviderCommand::List { update_cache } => {
            let rows = quest
                .get_providers(update_cache)
                .await
                .into_iter()
                .map(|p| ProviderRow {
                    name: p.name,
                    display_name: p.metadata.display_name,
                    services: p.services.join(", "),
                    publishers: p.publishers.join(", "),
                })
                .collect();
            output.table(rows)
        }
        ProviderCommand::Services {
            provider,
            parameter,
            service_type,
        } => {
            let filters = ServiceFilters {
                provider,
                parameter,
                service_type: service_type
                    .as_deref()
                    .map(str::parse::<ServiceType>)
                    .transpose()?,
            };
            let rows = quest
                .get_services(&filters)
                .await?
                .into_iter()
                .map(|s| ServiceRow {
                    uri: s.uri,
                    service_type: s.info.service_type.to_string(),
                    datatype: s.info.datatype,
                    parameters: s.info.parameters.join(", "),
                })
                .collect();
            output.table(rows)
        }
        ProviderCommand::Publishers => output.result(quest.get_publishers().await),
        ProviderCommand::Parameters { uri } => output.result(quest.get_parameters(&uri).await?),
        ProviderCommand::Options { uri } => {
            let schema = if uri.starts_with(quest_core::uri::PUBLISHER_SCHEME) {
                quest.publish_options(&uri).await?
            } else {
                quest.download_options(&uri).await?
            };
            match schema {
                Some(schema) => output.result(schema),
                None => {
                    output.info(format!("{} accepts any options", uri));
                    Ok(())
                }
            }
        }
        ProviderCommand::Login {
            provider,
            username,
            password,
        } => {
            quest
                .set_provider_credentials(&provider, &username, &password)
                .await?;
            output.success(format!("Stored credentials for {}", provider));
            Ok(())
        }
        ProviderCommand::Logout { provider } => {
            if quest.delete_provider_credentials(&provider).await? {
                output.success(format!("Deleted credentials for {}", provider));
            } else {
                output.warning(format!("No credentials stored for {}", provider));
            }
            Ok(())
        }
        ProviderCommand::Auth { provider } => {
            output.result(quest.get_auth_status(&provider).await?)
        }
    }
}
