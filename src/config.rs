//src/config.rs
//! Run metadata for one microbiome analysis.
//!
//! Loaded from a TOML file such as:
//!
//! ```toml
//! samples = ["S1-control", "S2-treated"]
//! taxa_hierarchy = ["phylum", "class", "order", "family", "genus", "species"]
//! taxa_offset = 2
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TreeError};
use crate::types::{self, SampleSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Sample names; the condition is derived from each name.
    pub samples: Vec<String>,

    /// Rank labels, outermost first (e.g. phylum .. species).
    pub taxa_hierarchy: Vec<String>,

    /// Tree height of the first rank in `taxa_hierarchy`.
    #[serde(default = "default_taxa_offset")]
    pub taxa_offset: usize,

    /// Ancestor columns per hierarchy line.
    #[serde(default = "default_hierarchy_columns")]
    pub hierarchy_columns: usize,

    /// Floor for absent normalized abundances.
    #[serde(default = "default_pseudocount")]
    pub pseudocount: f64,

    #[serde(default = "default_condition_delimiter")]
    pub condition_delimiter: String,

    #[serde(default = "default_condition_field")]
    pub condition_field: usize,

    /// Names marking unclassified taxa.
    #[serde(default = "default_placeholder_names")]
    pub placeholder_names: Vec<String>,

    /// Nodes above this height never get a top-aligned count.
    #[serde(default = "default_min_top_aligned_height")]
    pub min_top_aligned_height: usize,
}

fn default_taxa_offset() -> usize {
    2
}

fn default_hierarchy_columns() -> usize {
    7
}

fn default_pseudocount() -> f64 {
    1e-6
}

fn default_condition_delimiter() -> String {
    "-".to_string()
}

fn default_condition_field() -> usize {
    1
}

fn default_placeholder_names() -> Vec<String> {
    vec!["NA".to_string()]
}

fn default_min_top_aligned_height() -> usize {
    2
}

impl RunConfig {
    /// A config with every optional field at its default.
    pub fn new(samples: Vec<String>, taxa_hierarchy: Vec<String>) -> Self {
        Self {
            samples,
            taxa_hierarchy,
            taxa_offset: default_taxa_offset(),
            hierarchy_columns: default_hierarchy_columns(),
            pseudocount: default_pseudocount(),
            condition_delimiter: default_condition_delimiter(),
            condition_field: default_condition_field(),
            placeholder_names: default_placeholder_names(),
            min_top_aligned_height: default_min_top_aligned_height(),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| TreeError::io(path, e))?;
        let config: RunConfig = toml::from_str(&text)
            .map_err(|e| TreeError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        log::debug!(
            "Loaded run config from {} ({} samples, {} ranks)",
            path.display(),
            config.samples.len(),
            config.taxa_hierarchy.len()
        );
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: RunConfig =
            toml::from_str(text).map_err(|e| TreeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.samples.is_empty() {
            return Err(TreeError::Config("no samples listed".into()));
        }
        if self.taxa_hierarchy.is_empty() {
            return Err(TreeError::Config("taxa_hierarchy is empty".into()));
        }
        if self.hierarchy_columns == 0 {
            return Err(TreeError::Config("hierarchy_columns must be at least 1".into()));
        }
        if !(self.pseudocount.is_finite() && self.pseudocount > 0.0) {
            return Err(TreeError::Config(format!(
                "pseudocount must be a positive number, got {}",
                self.pseudocount
            )));
        }
        // duplicate names and missing condition fields
        self.sample_set().map(|_| ())
    }

    pub fn sample_set(&self) -> Result<SampleSet> {
        SampleSet::from_names(&self.samples, &self.condition_delimiter, self.condition_field)
    }

    pub fn is_placeholder(&self, name: &str) -> bool {
        types::is_placeholder(name, &self.placeholder_names)
    }
}
