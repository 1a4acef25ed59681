//! Pushing datasets to remote repositories through provider publishers

use quest_core::error::{QuestError, Result};
use quest_core::models::Metadata;
use quest_core::ports::PublishRequest;
use quest_core::uri::PublisherUri;
use tracing::info;

use crate::context::Quest;

impl Quest {
    /// Publish a dataset through `publisher_uri` (`pub://<provider>:<publisher>`)
    ///
    /// Options are validated against the publisher's declared schema when it has
    /// one. Returns whatever the provider reports about the published record.
    pub async fn publish(
        &self,
        publisher_uri: &str,
        dataset: &str,
        options: &Metadata,
    ) -> Result<Metadata> {
        let uri: PublisherUri = publisher_uri.parse()?;
        let provider = self.resolve_publisher(&uri).await?;

        let dataset = self.get_dataset(dataset).await?;
        if !dataset.status.has_file() {
            return Err(QuestError::invalid_options(
                &dataset.name,
                format!("dataset has no data to publish (status: {})", dataset.status),
            ));
        }

        let options = match provider.publish_options(&uri.publisher) {
            Some(schema) => schema.validate(publisher_uri, options)?,
            None => options.clone(),
        };
        let credentials = self.credentials_for(provider.as_ref()).await?;

        let name = dataset.name.clone();
        let result = provider
            .publish(PublishRequest {
                publisher: uri.publisher.clone(),
                dataset,
                options,
                credentials,
            })
            .await?;

        info!(dataset = %name, publisher = %uri, "Published dataset");
        Ok(result)
    }
}
