//! On-disk catalog and tag cache
//!
//! Layout: `<CACHE_DIR>/<provider>/<service>_catalog.json` and
//! `<service>_tags.json`. Files are replaced atomically.

use quest_core::error::Result;
use quest_core::fs::write_atomic;
use quest_core::models::CatalogEntry;
use quest_core::uri::ServiceUri;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::tags::TagCounts;

#[derive(Debug, Clone)]
pub struct CatalogCache {
    dir: PathBuf,
}

impl CatalogCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: cache_dir.into(),
        }
    }

    pub fn catalog_path(&self, service: &ServiceUri) -> PathBuf {
        self.dir
            .join(&service.provider)
            .join(format!("{}_catalog.json", service.service))
    }

    pub fn tags_path(&self, service: &ServiceUri) -> PathBuf {
        self.dir
            .join(&service.provider)
            .join(format!("{}_tags.json", service.service))
    }

    /// Cached entries of a service, relabeled for `service`
    pub fn load_catalog(&self, service: &ServiceUri) -> Option<Vec<CatalogEntry>> {
        let mut entries: Vec<CatalogEntry> = read_json(&self.catalog_path(service))?;
        for entry in &mut entries {
            entry.relabel(service);
        }
        debug!(service = %service.service_uri(), count = entries.len(), "Catalog cache hit");
        Some(entries)
    }

    pub fn store_catalog(&self, service: &ServiceUri, entries: &[CatalogEntry]) -> Result<()> {
        write_json(&self.catalog_path(service), &entries)
    }

    pub fn load_tags(&self, service: &ServiceUri) -> Option<TagCounts> {
        read_json(&self.tags_path(service))
    }

    pub fn store_tags(&self, service: &ServiceUri, tags: &TagCounts) -> Result<()> {
        write_json(&self.tags_path(service), tags)
    }
}

/// Read a cache file; unreadable files count as a miss
fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring corrupt cache file");
            None
        }
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    write_atomic(path, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_hit_is_relabeled() {
        let tmp = TempDir::new().unwrap();
        let cache = CatalogCache::new(tmp.path());
        let old = ServiceUri::new("nwis", "iv");
        let entries = vec![CatalogEntry::new(&old, "08158000")];

        let renamed = ServiceUri::new("usgs-nwis", "iv");
        assert!(cache.load_catalog(&renamed).is_none());

        // Simulate a cache written under a provider that was later renamed
        std::fs::create_dir_all(tmp.path().join("usgs-nwis")).unwrap();
        let bytes = serde_json::to_vec(&entries).unwrap();
        std::fs::write(cache.catalog_path(&renamed), bytes).unwrap();

        let loaded = cache.load_catalog(&renamed).unwrap();
        assert_eq!(loaded[0].name, "svc://usgs-nwis:iv/08158000");
        assert_eq!(loaded[0].service, "svc://usgs-nwis:iv");
    }

    #[test]
    fn test_reload_keeps_names() {
        let tmp = TempDir::new().unwrap();
        let cache = CatalogCache::new(tmp.path());
        let service = ServiceUri::new("usgs-nwis", "iv");
        let entries = vec![
            CatalogEntry::new(&service, "a"),
            CatalogEntry::new(&service, "b"),
        ];

        cache.store_catalog(&service, &entries).unwrap();
        assert_eq!(cache.load_catalog(&service).unwrap(), entries);
    }

    #[test]
    fn test_corrupt_file_is_a_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = CatalogCache::new(tmp.path());
        let service = ServiceUri::new("usgs-nwis", "iv");
        std::fs::create_dir_all(tmp.path().join("usgs-nwis")).unwrap();
        std::fs::write(cache.catalog_path(&service), "not json").unwrap();

        assert!(cache.load_catalog(&service).is_none());
    }
}
