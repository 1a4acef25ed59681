//! URI grammar
//!
//! Every object the library hands out is addressed by an opaque string:
//!
//! * service URI: `svc://<provider>:<service>[/<catalog_id>]`
//! * publisher URI: `pub://<provider>:<publisher>`
//! * dataset URI: `d` followed by 31 lowercase hex characters
//! * collection URI: a bare collection name

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{QuestError, Result};

pub const SERVICE_SCHEME: &str = "svc://";
pub const PUBLISHER_SCHEME: &str = "pub://";

/// The pseudo-provider under which user- and tool-created catalog entries live
pub const QUEST_PROVIDER: &str = "quest";
pub const QUEST_SERVICE: &str = "quest";

/// Category of a URI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UriKind {
    Service,
    Publisher,
    Dataset,
    Collection,
}

impl fmt::Display for UriKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UriKind::Service => write!(f, "service"),
            UriKind::Publisher => write!(f, "publisher"),
            UriKind::Dataset => write!(f, "dataset"),
            UriKind::Collection => write!(f, "collection"),
        }
    }
}

/// Parsed service URI, optionally pointing at one catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceUri {
    pub provider: String,
    pub service: String,
    pub catalog_id: Option<String>,
}

impl ServiceUri {
    pub fn new(provider: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            service: service.into(),
            catalog_id: None,
        }
    }

    /// URI of the quest pseudo-service
    pub fn quest() -> Self {
        Self::new(QUEST_PROVIDER, QUEST_SERVICE)
    }

    pub fn with_catalog_id(mut self, catalog_id: impl Into<String>) -> Self {
        self.catalog_id = Some(catalog_id.into());
        self
    }

    /// The service part of the URI, without any catalog id
    pub fn service_uri(&self) -> String {
        format!("{}{}:{}", SERVICE_SCHEME, self.provider, self.service)
    }

    /// The canonical URI of a catalog entry of this service
    pub fn catalog_entry_uri(&self, catalog_id: &str) -> String {
        format!("{}/{}", self.service_uri(), catalog_id)
    }

    pub fn is_quest(&self) -> bool {
        self.provider == QUEST_PROVIDER
    }
}

impl fmt::Display for ServiceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.catalog_id {
            Some(id) => write!(f, "{}", self.catalog_entry_uri(id)),
            None => write!(f, "{}", self.service_uri()),
        }
    }
}

impl FromStr for ServiceUri {
    type Err = QuestError;

    fn from_str(value: &str) -> Result<Self> {
        let rest = value
            .strip_prefix(SERVICE_SCHEME)
            .ok_or_else(|| invalid(value, "expected svc:// scheme"))?;
        let (head, catalog_id) = match rest.split_once('/') {
            Some((head, id)) if !id.is_empty() => (head, Some(id.to_string())),
            Some((head, _)) => (head, None),
            None => (rest, None),
        };
        let (provider, service) = split_name_pair(value, head)?;
        Ok(Self {
            provider,
            service,
            catalog_id,
        })
    }
}

/// Parsed publisher URI
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublisherUri {
    pub provider: String,
    pub publisher: String,
}

impl PublisherUri {
    pub fn new(provider: impl Into<String>, publisher: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            publisher: publisher.into(),
        }
    }
}

impl fmt::Display for PublisherUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}:{}", PUBLISHER_SCHEME, self.provider, self.publisher)
    }
}

impl FromStr for PublisherUri {
    type Err = QuestError;

    fn from_str(value: &str) -> Result<Self> {
        let rest = value
            .strip_prefix(PUBLISHER_SCHEME)
            .ok_or_else(|| invalid(value, "expected pub:// scheme"))?;
        let (provider, publisher) = split_name_pair(value, rest)?;
        Ok(Self {
            provider,
            publisher,
        })
    }
}

/// Allocate a fresh dataset name: a v4 UUID in hex with the first character forced to `d`
pub fn new_dataset_name() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("d{}", &hex[1..])
}

/// Allocate a fresh catalog id for a quest-owned catalog entry
pub fn new_catalog_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Whether `value` has the shape of a dataset name
pub fn is_dataset_name(value: &str) -> bool {
    value.len() == 32
        && value.starts_with('d')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

/// Whether `value` can be used as a collection name
pub fn is_valid_collection_name(value: &str) -> bool {
    !value.is_empty()
        && !value.contains("://")
        && !is_dataset_name(value)
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Determine the category of a single URI
pub fn uri_kind(uri: &str) -> Result<UriKind> {
    if uri.starts_with(SERVICE_SCHEME) {
        ServiceUri::from_str(uri)?;
        Ok(UriKind::Service)
    } else if uri.starts_with(PUBLISHER_SCHEME) {
        PublisherUri::from_str(uri)?;
        Ok(UriKind::Publisher)
    } else if is_dataset_name(uri) {
        Ok(UriKind::Dataset)
    } else if is_valid_collection_name(uri) {
        Ok(UriKind::Collection)
    } else {
        Err(invalid(uri, "not a service, publisher, dataset or collection URI"))
    }
}

/// Options for [`classify_uris`]
#[derive(Debug, Clone, Default)]
pub struct ClassifyOptions {
    /// Categories that are an error to receive
    pub exclude: Vec<UriKind>,
    /// Fail unless every URI falls into the same category
    pub require_same_type: bool,
}

impl ClassifyOptions {
    pub fn excluding(kinds: &[UriKind]) -> Self {
        Self {
            exclude: kinds.to_vec(),
            require_same_type: false,
        }
    }

    pub fn same_type(mut self) -> Self {
        self.require_same_type = true;
        self
    }
}

/// Group URIs by category, preserving input order within each group
pub fn classify_uris<S: AsRef<str>>(
    uris: &[S],
    options: &ClassifyOptions,
) -> Result<BTreeMap<UriKind, Vec<String>>> {
    let mut grouped: BTreeMap<UriKind, Vec<String>> = BTreeMap::new();

    for uri in uris {
        let uri = uri.as_ref();
        let kind = uri_kind(uri)?;
        if options.exclude.contains(&kind) {
            return Err(QuestError::RejectedUri {
                uri: uri.to_string(),
                kind: kind.to_string(),
            });
        }
        grouped.entry(kind).or_default().push(uri.to_string());
    }

    if options.require_same_type && grouped.len() > 1 {
        let kinds = grouped.keys().map(|k| k.to_string()).collect::<Vec<_>>().join(", ");
        return Err(QuestError::MixedUris { kinds });
    }

    Ok(grouped)
}

fn split_name_pair(uri: &str, pair: &str) -> Result<(String, String)> {
    let (left, right) = pair
        .split_once(':')
        .ok_or_else(|| invalid(uri, "expected <provider>:<name>"))?;
    if !is_plugin_name(left) || !is_plugin_name(right) {
        return Err(invalid(uri, "provider and name must be non-empty [A-Za-z0-9._-]"));
    }
    Ok((left.to_string(), right.to_string()))
}

fn is_plugin_name(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn invalid(uri: &str, reason: &str) -> QuestError {
    QuestError::InvalidUri {
        uri: uri.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_service_uri() {
        let uri: ServiceUri = "svc://usgs-nwis:iv".parse().unwrap();
        assert_eq!(uri.provider, "usgs-nwis");
        assert_eq!(uri.service, "iv");
        assert!(uri.catalog_id.is_none());
        assert_eq!(uri.to_string(), "svc://usgs-nwis:iv");
    }

    #[test]
    fn test_parse_catalog_entry_uri() {
        let uri: ServiceUri = "svc://usgs-nwis:iv/08158000".parse().unwrap();
        assert_eq!(uri.catalog_id.as_deref(), Some("08158000"));
        assert_eq!(uri.service_uri(), "svc://usgs-nwis:iv");
        assert_eq!(uri.to_string(), "svc://usgs-nwis:iv/08158000");
    }

    #[test]
    fn test_trailing_slash_has_no_catalog_id() {
        let uri: ServiceUri = "svc://usgs-nwis:iv/".parse().unwrap();
        assert!(uri.catalog_id.is_none());
    }

    #[test]
    fn test_invalid_service_uris() {
        assert!("svc://usgs-nwis".parse::<ServiceUri>().is_err());
        assert!("svc://:iv".parse::<ServiceUri>().is_err());
        assert!("http://usgs-nwis:iv".parse::<ServiceUri>().is_err());
    }

    #[test]
    fn test_publisher_uri() {
        let uri: PublisherUri = "pub://cuahsi-hydroshare:hs_pub".parse().unwrap();
        assert_eq!(uri.provider, "cuahsi-hydroshare");
        assert_eq!(uri.publisher, "hs_pub");
        assert_eq!(uri.to_string(), "pub://cuahsi-hydroshare:hs_pub");
    }

    #[test]
    fn test_new_dataset_name() {
        let name = new_dataset_name();
        assert_eq!(name.len(), 32);
        assert!(name.starts_with('d'));
        assert!(is_dataset_name(&name));
        assert_ne!(name, new_dataset_name());
    }

    #[test]
    fn test_uri_kind() {
        assert_eq!(uri_kind("svc://usgs-nwis:iv").unwrap(), UriKind::Service);
        assert_eq!(uri_kind("pub://hs:hs_pub").unwrap(), UriKind::Publisher);
        assert_eq!(uri_kind(&new_dataset_name()).unwrap(), UriKind::Dataset);
        assert_eq!(uri_kind("my-collection").unwrap(), UriKind::Collection);
        assert!(uri_kind("ftp://nope").is_err());
        assert!(uri_kind("").is_err());
    }

    #[test]
    fn test_classify_uris() {
        let dataset = new_dataset_name();
        let uris = vec!["svc://a:b", "col1", dataset.as_str(), "svc://a:c/1"];
        let grouped = classify_uris(&uris, &ClassifyOptions::default()).unwrap();

        assert_eq!(grouped[&UriKind::Service], vec!["svc://a:b", "svc://a:c/1"]);
        assert_eq!(grouped[&UriKind::Collection], vec!["col1"]);
        assert_eq!(grouped[&UriKind::Dataset], vec![dataset.clone()]);
        assert!(!grouped.contains_key(&UriKind::Publisher));
    }

    #[test]
    fn test_classify_rejects_excluded_kinds() {
        let dataset = new_dataset_name();
        let err = classify_uris(
            &["svc://a:b", dataset.as_str()],
            &ClassifyOptions::excluding(&[UriKind::Dataset]),
        )
        .unwrap_err();
        assert!(matches!(err, QuestError::RejectedUri { .. }));
    }

    #[test]
    fn test_classify_requires_same_type() {
        let err = classify_uris(
            &["svc://a:b", "col1"],
            &ClassifyOptions::default().same_type(),
        )
        .unwrap_err();
        assert!(matches!(err, QuestError::MixedUris { .. }));

        let ok = classify_uris(&["col1", "col2"], &ClassifyOptions::default().same_type());
        assert!(ok.is_ok());
    }

    #[test]
    fn test_collection_names() {
        assert!(is_valid_collection_name("streamflow_2024"));
        assert!(!is_valid_collection_name("bad name"));
        assert!(!is_valid_collection_name(&new_dataset_name()));
    }
}
