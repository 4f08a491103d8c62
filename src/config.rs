use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::constants::{
    CPG_KNOWLEDGE_CAPABILITY, CPG_KNOWLEDGE_REPRESENTATION_LEVEL, CQF_CQL_OPTIONS,
    CQF_EXPANSION_PARAMETERS, DEFAULT_PACKAGE_OPERATION,
};
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyConfig {
    /// Embed resolved resources in the request tree instead of returning them flat.
    pub contain_resources: bool,
    /// Extension URLs that are not copied onto the request tree.
    pub excluded_extensions: Vec<String>,
    pub max_nesting_depth: usize,
    pub package_operation: String,
    #[serde(with = "duration_secs")]
    pub http_timeout: Duration,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            contain_resources: false,
            excluded_extensions: vec![
                CPG_KNOWLEDGE_CAPABILITY.to_string(),
                CPG_KNOWLEDGE_REPRESENTATION_LEVEL.to_string(),
                CQF_CQL_OPTIONS.to_string(),
                CQF_EXPANSION_PARAMETERS.to_string(),
            ],
            max_nesting_depth: 16,
            package_operation: DEFAULT_PACKAGE_OPERATION.to_string(),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl ApplyConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn with_containment(mut self, contain_resources: bool) -> Self {
        self.contain_resources = contain_resources;
        self
    }

    pub fn is_excluded(&self, url: &str) -> bool {
        self.excluded_extensions.iter().any(|excluded| excluded == url)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
