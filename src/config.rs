// ⚙️ Run configuration - passed explicitly into every analysis

use crate::error;
use crate::fields::FieldMapping;
use crate::linkage::{DuplicatePolicy, LinkageBuilder, DEFAULT_PARALLEL_THRESHOLD};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_TITLE: &str = "FRAUD RING NETWORK";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Field slots as display names, identifier first
    pub fields: FieldMapping,

    /// Drop entities without any connection from the graph
    pub filter_isolated: bool,

    pub duplicate_policy: DuplicatePolicy,

    /// Entity count at which grouping runs in parallel
    pub parallel_threshold: usize,

    /// Chart title handed to the exporter
    pub title: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            fields: FieldMapping::default_fraud_fields(),
            filter_isolated: false,
            duplicate_policy: DuplicatePolicy::Reject,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            title: DEFAULT_TITLE.to_string(),
        }
    }
}

impl AnalysisConfig {
    pub fn new(fields: FieldMapping) -> Self {
        AnalysisConfig {
            fields,
            ..Default::default()
        }
    }

    pub fn with_filter_isolated(mut self, filter: bool) -> Self {
        self.filter_isolated = filter;
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: AnalysisConfig =
            serde_json::from_str(json).context("Failed to parse analysis config")?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn validate(&self) -> error::Result<()> {
        self.fields.validate()
    }

    /// Blank titles fall back to the default chart title
    pub fn title(&self) -> &str {
        if self.title.trim().is_empty() {
            DEFAULT_TITLE
        } else {
            &self.title
        }
    }

    pub fn linkage_builder(&self) -> LinkageBuilder {
        LinkageBuilder::new(self.fields.clone())
            .with_duplicate_policy(self.duplicate_policy)
            .with_parallel_threshold(self.parallel_threshold)
    }
}
