use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Which pair of timestamps the merge window is measured against when a new
/// start arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapBasis {
    /// Last stop minus last start, i.e. the span of the previous fragment.
    /// This is the comparison the pipeline has always made and downstream
    /// numbers depend on it, so it stays the default.
    #[default]
    PreviousFragment,
    /// Incoming start minus last stop, i.e. how long the user was idle.
    IdleTime,
}

/// Analysis thresholds and policies, loadable from a YAML file
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Gaps under this many seconds continue the current session
    #[serde(default = "default_merge_window")]
    pub merge_window_secs: i64,
    /// Sessions longer than this many seconds count as valid for reporting
    #[serde(default = "default_validity_threshold")]
    pub validity_threshold_secs: i64,
    /// Accumulations at or under this many seconds are discarded as noise
    #[serde(default = "default_noise_floor")]
    pub noise_floor_secs: i64,
    /// Emit a session still accumulating when a user's events run out
    #[serde(default)]
    pub flush_trailing: bool,
    #[serde(default)]
    pub gap_basis: GapBasis,
}

fn default_merge_window() -> i64 {
    30
}

fn default_validity_threshold() -> i64 {
    60
}

fn default_noise_floor() -> i64 {
    1
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            merge_window_secs: default_merge_window(),
            validity_threshold_secs: default_validity_threshold(),
            noise_floor_secs: default_noise_floor(),
            flush_trailing: false,
            gap_basis: GapBasis::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load an analysis config from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .context(format!("Failed to read config: {:?}", path.as_ref()))?;
        let config: AnalysisConfig =
            serde_yaml::from_str(&content).context("Failed to parse config YAML")?;
        Ok(config)
    }
}
