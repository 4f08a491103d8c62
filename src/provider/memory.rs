//! In-memory canonical resolver.

use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use super::CanonicalResolver;
use crate::error::Result;
use crate::model::{resource_id, resource_type};

/// Resources indexed by `url`, `url|version` and `Type/id`.
///
/// An unversioned canonical resolves to the most recently added version.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRepository {
    resources: Vec<Value>,
    by_url: HashMap<String, usize>,
    by_canonical: HashMap<String, usize>,
    by_id: HashMap<String, usize>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_resources(resources: impl IntoIterator<Item = Value>) -> Self {
        let mut repository = Self::new();
        for resource in resources {
            repository.add(resource);
        }
        repository
    }

    /// Loads every `*.json` file in `dir`. Bundles contribute their entries.
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self> {
        let mut paths: Vec<_> = std::fs::read_dir(dir.as_ref())?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut repository = Self::new();
        for path in paths {
            let content = std::fs::read_to_string(&path)?;
            let resource: Value = serde_json::from_str(&content)?;
            repository.add(resource);
        }

        tracing::info!(
            "Loaded {} resources from {}",
            repository.len(),
            dir.as_ref().display()
        );
        Ok(repository)
    }

    pub fn add(&mut self, resource: Value) {
        if resource_type(&resource) == Some("Bundle") {
            if let Some(entries) = resource.get("entry").and_then(|e| e.as_array()) {
                for entry in entries {
                    if let Some(inner) = entry.get("resource") {
                        self.add(inner.clone());
                    }
                }
            }
            return;
        }

        let index = self.resources.len();
        if let (Some(rt), Some(id)) = (resource_type(&resource), resource_id(&resource)) {
            self.by_id.insert(format!("{rt}/{id}"), index);
        }
        if let Some(url) = resource.get("url").and_then(|u| u.as_str()) {
            self.by_url.insert(url.to_string(), index);
            if let Some(version) = resource.get("version").and_then(|v| v.as_str()) {
                self.by_canonical.insert(format!("{url}|{version}"), index);
            }
        }
        self.resources.push(resource);
    }

    pub fn resources(&self) -> &[Value] {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl CanonicalResolver for InMemoryRepository {
    fn search_by_canonical(&self, canonical: &str) -> Result<Option<Value>> {
        let index = match canonical.split_once('|') {
            Some((url, _)) => self
                .by_canonical
                .get(canonical)
                .or_else(|| {
                    tracing::debug!("No exact version for {}, falling back to {}", canonical, url);
                    self.by_url.get(url)
                }),
            None => self.by_url.get(canonical),
        }
        .or_else(|| self.by_id.get(canonical));

        Ok(index.map(|&i| self.resources[i].clone()))
    }

    fn read(&self, resource_type: &str, id: &str) -> Result<Option<Value>> {
        Ok(self
            .by_id
            .get(&format!("{resource_type}/{id}"))
            .map(|&i| self.resources[i].clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn activity(version: &str) -> Value {
        json!({
            "resourceType": "ActivityDefinition",
            "id": format!("order-{}", version.replace('.', "-")),
            "url": "http://example.org/ActivityDefinition/order",
            "version": version,
            "kind": "Task"
        })
    }

    #[test]
    fn test_canonical_lookup() {
        let repository = InMemoryRepository::from_resources([activity("1.0.0"), activity("2.0.0")]);

        let latest = repository
            .search_by_canonical("http://example.org/ActivityDefinition/order")
            .unwrap()
            .unwrap();
        assert_eq!(latest["version"], "2.0.0");

        let pinned = repository
            .search_by_canonical("http://example.org/ActivityDefinition/order|1.0.0")
            .unwrap()
            .unwrap();
        assert_eq!(pinned["version"], "1.0.0");

        assert!(
            repository
                .search_by_canonical("http://example.org/ActivityDefinition/missing")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_read_by_id_and_relative_canonical() {
        let repository = InMemoryRepository::from_resources([activity("1.0.0")]);
        assert!(repository.read("ActivityDefinition", "order-1-0-0").unwrap().is_some());
        assert!(
            repository
                .search_by_canonical("ActivityDefinition/order-1-0-0")
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn test_bundle_entries_are_indexed() {
        let bundle = json!({
            "resourceType": "Bundle",
            "type": "collection",
            "entry": [{"resource": activity("1.0.0")}, {"resource": {"resourceType": "Library", "id": "lib"}}]
        });
        let repository = InMemoryRepository::from_resources([bundle]);
        assert_eq!(repository.len(), 2);
        assert!(repository.read("Library", "lib").unwrap().is_some());
    }

    #[test]
    fn test_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("activity.json"),
            serde_json::to_string(&activity("1.0.0")).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let repository = InMemoryRepository::from_directory(dir.path()).unwrap();
        assert_eq!(repository.len(), 1);
    }
}
