use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{QuestError, Result};

/// Descriptive metadata of a provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub organization_name: String,
    #[serde(default)]
    pub organization_abbr: String,
}

/// Summary of a loaded provider, as returned by provider listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    #[serde(flatten)]
    pub metadata: ProviderMetadata,
    pub services: Vec<String>,
    pub publishers: Vec<String>,
}

/// Shape of the data a service offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    /// Discrete locations (stations, sites)
    GeoDiscrete,
    /// Continuous coverage (rasters) clipped to a bounding box
    GeoSeamless,
    /// Records without a location
    NonGeo,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::GeoDiscrete => "geo-discrete",
            ServiceType::GeoSeamless => "geo-seamless",
            ServiceType::NonGeo => "non-geo",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = QuestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "geo-discrete" | "geo_discrete" => Ok(ServiceType::GeoDiscrete),
            "geo-seamless" | "geo_seamless" => Ok(ServiceType::GeoSeamless),
            "non-geo" | "non_geo" => Ok(ServiceType::NonGeo),
            other => Err(QuestError::invalid_options(
                "service type",
                format!("unknown service type '{}'", other),
            )),
        }
    }
}

/// A named API of a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service_name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub service_type: ServiceType,
    pub datatype: String,
    #[serde(default)]
    pub geom_type: Option<String>,
    #[serde(default)]
    pub file_format: Option<String>,
    /// Advertised normalized parameter names
    #[serde(default)]
    pub parameters: Vec<String>,
    /// Advertised bounding box `[xmin, ymin, xmax, ymax]`
    #[serde(default)]
    pub bbox: Option<[f64; 4]>,
    /// Provider-native parameter codes to normalized names
    #[serde(default)]
    pub parameter_map: BTreeMap<String, String>,
}

impl ServiceInfo {
    pub fn new(
        service_name: impl Into<String>,
        service_type: ServiceType,
        datatype: impl Into<String>,
    ) -> Self {
        let service_name = service_name.into();
        Self {
            display_name: service_name.clone(),
            service_name,
            description: String::new(),
            service_type,
            datatype: datatype.into(),
            geom_type: None,
            file_format: None,
            parameters: Vec::new(),
            bbox: None,
            parameter_map: BTreeMap::new(),
        }
    }

    pub fn with_geom_type(mut self, geom_type: impl Into<String>) -> Self {
        self.geom_type = Some(geom_type.into());
        self
    }

    pub fn with_file_format(mut self, file_format: impl Into<String>) -> Self {
        self.file_format = Some(file_format.into());
        self
    }

    pub fn with_parameters<S: Into<String>>(
        mut self,
        parameters: impl IntoIterator<Item = S>,
    ) -> Self {
        self.parameters = parameters.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_bbox(mut self, bbox: [f64; 4]) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_parameter_code(
        mut self,
        code: impl Into<String>,
        parameter: impl Into<String>,
    ) -> Self {
        self.parameter_map.insert(code.into(), parameter.into());
        self
    }

    /// Translate a provider-native parameter code; unknown codes pass through
    pub fn normalize_parameter<'a>(&'a self, code: &'a str) -> &'a str {
        self.parameter_map.get(code).map(String::as_str).unwrap_or(code)
    }
}

/// A remote repository a provider can push datasets to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublisherInfo {
    pub publisher_name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
}

impl PublisherInfo {
    pub fn new(publisher_name: impl Into<String>) -> Self {
        let publisher_name = publisher_name.into();
        Self {
            display_name: publisher_name.clone(),
            publisher_name,
            description: String::new(),
        }
    }
}

/// Result of a provider's parameter lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterListing {
    /// Parameters discovered per catalog entry, keyed by `service_id`
    PerEntry(BTreeMap<String, Vec<String>>),
    /// One list advertised for the whole service
    Flat(Vec<String>),
}

impl ParameterListing {
    /// Parameters applying to `service_id`
    pub fn for_entry(&self, service_id: &str) -> &[String] {
        match self {
            ParameterListing::PerEntry(map) => {
                map.get(service_id).map(Vec::as_slice).unwrap_or(&[])
            }
            ParameterListing::Flat(list) => list.as_slice(),
        }
    }

    /// Every distinct parameter in the listing, sorted
    pub fn all(&self) -> Vec<String> {
        let mut all: Vec<String> = match self {
            ParameterListing::PerEntry(map) => map.values().flatten().cloned().collect(),
            ParameterListing::Flat(list) => list.clone(),
        };
        all.sort();
        all.dedup();
        all
    }
}
