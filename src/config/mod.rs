use std::path::{Path, PathBuf};

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::errors::{GhostSeedError, Result};

const DEFAULT_MAX_NON_SEEDING_MS: u64 = 259_200_000;
const DEFAULT_REQUIRED_SEEDING_MS: u64 = 604_800_000;

fn default_upload_ratio_target() -> f64 {
    -1.0
}

fn default_max_non_seeding_ms() -> u64 {
    DEFAULT_MAX_NON_SEEDING_MS
}

fn default_required_seeding_ms() -> u64 {
    DEFAULT_REQUIRED_SEEDING_MS
}

fn default_archive_on_too_many_failures() -> bool {
    false
}

/// The `config.json` schema. Unknown fields are ignored
/// (serde's default behavior for structs without `deny_unknown_fields`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub min_upload_rate: u64,
    pub max_upload_rate: u64,
    pub simultaneous_seed: i64,
    pub client: String,
    pub keep_torrent_with_zero_leechers: bool,
    #[serde(default = "default_upload_ratio_target")]
    pub upload_ratio_target: f64,
    #[serde(default = "default_max_non_seeding_ms")]
    pub max_non_seeding_time_ms: u64,
    #[serde(default = "default_required_seeding_ms")]
    pub required_seeding_time_ms: u64,
    /// Whether repeated announce failures archive the torrent and promote a
    /// replacement, or only log and drop it from the active set (the safer
    /// default; see DESIGN.md).
    #[serde(default = "default_archive_on_too_many_failures")]
    pub archive_on_too_many_failures: bool,
}

impl Config {
    /// Validate the configuration: invalid values fail with a
    /// descriptive [`GhostSeedError::ConfigInvalid`].
    pub fn validate(&self) -> Result<()> {
        if self.max_upload_rate < self.min_upload_rate {
            return Err(GhostSeedError::ConfigInvalid(format!(
                "maxUploadRate ({}) must be >= minUploadRate ({})",
                self.max_upload_rate, self.min_upload_rate
            )));
        }
        if self.simultaneous_seed != -1 && self.simultaneous_seed <= 0 {
            return Err(GhostSeedError::ConfigInvalid(format!(
                "simultaneousSeed must be > 0 or -1, got {}",
                self.simultaneous_seed
            )));
        }
        if self.client.trim().is_empty() {
            return Err(GhostSeedError::ConfigInvalid(
                "client must not be empty".to_string(),
            ));
        }
        if self.upload_ratio_target != -1.0 && self.upload_ratio_target < 0.0 {
            return Err(GhostSeedError::ConfigInvalid(format!(
                "uploadRatioTarget must be >= 0 or -1, got {}",
                self.upload_ratio_target
            )));
        }

        Ok(())
    }

    /// `true` when the simultaneous-seed cap is disabled.
    pub fn is_unbounded(&self) -> bool {
        self.simultaneous_seed == -1
    }
}

/// The resolved filesystem layout rooted at a configuration directory
/// `config.json`, `torrents/`, `torrents/archived/`, `clients/`, and
/// `elapsed-times.json`.
#[derive(Debug, Clone, Display)]
#[display(fmt = "{}", "root.display()")]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn torrents_dir(&self) -> PathBuf {
        self.root.join("torrents")
    }

    pub fn archived_dir(&self) -> PathBuf {
        self.torrents_dir().join("archived")
    }

    pub fn clients_dir(&self) -> PathBuf {
        self.root.join("clients")
    }

    pub fn elapsed_times_file(&self) -> PathBuf {
        self.root.join("elapsed-times.json")
    }

    /// Create `torrents/archived/` if absent. Fails fatally if the path
    /// exists and is not a directory.
    pub fn ensure_archived_dir(&self) -> Result<()> {
        let path = self.archived_dir();
        if path.exists() {
            if !path.is_dir() {
                return Err(GhostSeedError::ConfigInvalid(format!(
                    "{} exists and is not a directory",
                    path.display()
                )));
            }
            return Ok(());
        }
        std::fs::create_dir_all(&path)?;
        Ok(())
    }

    /// Load and validate `config.json`.
    pub fn load_config(&self) -> Result<Config> {
        let path = self.config_file();
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            GhostSeedError::ConfigIo(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }
}

/// Convenience: load and validate the configuration rooted at `root`,
/// ensuring `torrents/archived/` exists.
pub fn load<P: AsRef<Path>>(root: P) -> Result<(Config, Layout)> {
    let layout = Layout::new(root.as_ref().to_path_buf());
    let config = layout.load_config()?;
    layout.ensure_archived_dir()?;
    Ok((config, layout))
}
