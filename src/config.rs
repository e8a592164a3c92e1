//! Engine configuration
//!
//! Every field has a default, so a YAML file only needs the keys it changes:
//!
//! ```yaml
//! gate:
//!   override_threshold: 0.95
//! gardener:
//!   prune_threshold: 0.2
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid citation pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("{field} must be {expected}, got {value}")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
        value: f64,
    },
}

/// LouvainGate settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Raw similarity above which a pair is admitted regardless of communities
    pub override_threshold: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            override_threshold: 0.92,
        }
    }
}

/// CandidateExtractor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Regex family matched against content to find cited ids
    pub citation_patterns: Vec<String>,
    /// Shortest title keyword considered for MENTIONS
    pub min_keyword_len: usize,
    /// Added to the built-in stop-word list
    pub extra_stop_words: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            citation_patterns: vec![r"\b[A-Z][A-Z0-9]*-\d+\b".to_string()],
            min_keyword_len: 4,
            extra_stop_words: Vec::new(),
        }
    }
}

/// CommunityDetector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LouvainConfig {
    /// γ; higher values favor smaller communities
    pub resolution: f64,
    /// Cap on local-moving passes per level
    pub max_passes: usize,
    /// Stop aggregating once a level improves modularity by less than this
    pub min_gain: f64,
}

impl Default for LouvainConfig {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            max_passes: 100,
            min_gain: 1e-6,
        }
    }
}

/// PageRank settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageRankConfig {
    pub damping: f64,
    /// Convergence threshold on the L1 delta between iterations
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self {
            damping: 0.85,
            tolerance: 1e-6,
            max_iterations: 100,
        }
    }
}

/// GraphGardener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GardenerConfig {
    /// SIMILAR_TO edges weighing less than this are pruned
    pub prune_threshold: f64,
    /// How many hubs each pass reports
    pub hub_count: usize,
}

impl Default for GardenerConfig {
    fn default() -> Self {
        Self {
            prune_threshold: 0.15,
            hub_count: 5,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub gate: GateConfig,
    pub extractor: ExtractorConfig,
    pub louvain: LouvainConfig,
    pub pagerank: PageRankConfig,
    pub gardener: GardenerConfig,
}

fn check_unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            expected: "within [0, 1]",
            value,
        })
    }
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            expected: "greater than 0",
            value,
        })
    }
}

impl EngineConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("gate.override_threshold", self.gate.override_threshold)?;
        check_unit("gardener.prune_threshold", self.gardener.prune_threshold)?;
        check_unit("pagerank.damping", self.pagerank.damping)?;
        check_positive("pagerank.tolerance", self.pagerank.tolerance)?;
        check_positive("pagerank.max_iterations", self.pagerank.max_iterations as f64)?;
        check_positive("louvain.resolution", self.louvain.resolution)?;
        check_positive("louvain.max_passes", self.louvain.max_passes as f64)?;
        check_positive("louvain.min_gain", self.louvain.min_gain)?;
        check_positive("extractor.min_keyword_len", self.extractor.min_keyword_len as f64)?;

        for pattern in &self.extractor.citation_patterns {
            regex_lite::Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.gate.override_threshold, 0.92);
        assert_eq!(config.gardener.prune_threshold, 0.15);
        assert_eq!(config.louvain.max_passes, 100);
        assert_eq!(config.pagerank.damping, 0.85);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config = EngineConfig::from_yaml_str(
            "gate:\n  override_threshold: 0.97\nextractor:\n  extra_stop_words: [graph]\n",
        )
        .unwrap();
        assert_eq!(config.gate.override_threshold, 0.97);
        assert_eq!(config.extractor.extra_stop_words, vec!["graph".to_string()]);
        assert_eq!(config.extractor.min_keyword_len, 4);
        assert_eq!(config.gardener, GardenerConfig::default());
    }

    #[test]
    fn empty_document_is_all_defaults() {
        let config = EngineConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let err = EngineConfig::from_yaml_str("gardener:\n  prune_threshold: 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "gardener.prune_threshold", .. }));
    }

    #[test]
    fn invalid_citation_regex_is_rejected() {
        let err = EngineConfig::from_yaml_str("extractor:\n  citation_patterns: ['[unclosed']\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graphweave.yaml");
        std::fs::write(&path, "louvain:\n  resolution: 0.5\n").unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.louvain.resolution, 0.5);
    }
}
