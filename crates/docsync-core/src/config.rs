//! Configuration for the sync engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

/// Top-level configuration for the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub vs: VsConfig,
    #[serde(default)]
    pub xs: XsConfig,
    #[serde(default)]
    pub codec: CodecConfig,
    #[serde(default)]
    pub sync: SyncBehaviorConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            vs: VsConfig::default(),
            xs: XsConfig::default(),
            codec: CodecConfig::default(),
            sync: SyncBehaviorConfig::default(),
        }
    }
}

/// Configuration for the version store adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VsConfig {
    /// Path to the external CLI. Defaults to a platform-standard name on PATH.
    #[serde(default = "default_executable_path")]
    pub executable_path: String,

    #[serde(default = "default_repository_path")]
    pub repository_path: PathBuf,

    #[serde(default = "default_remote_name")]
    pub remote_name: String,

    #[serde(default)]
    pub remote_url: Option<String>,

    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl Default for VsConfig {
    fn default() -> Self {
        Self {
            executable_path: default_executable_path(),
            repository_path: default_repository_path(),
            remote_name: default_remote_name(),
            remote_url: None,
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

/// Configuration for the vector store adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XsConfig {
    #[serde(default = "default_xs_data_path")]
    pub data_path: PathBuf,
}

impl Default for XsConfig {
    fn default() -> Self {
        Self {
            data_path: default_xs_data_path(),
        }
    }
}

/// Configuration for the document codec (chunking).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// How chunk boundaries are placed. The default splits on the raw UTF-8
    /// byte stream; an implementation MAY split on other boundaries as long
    /// as it is captured here and remains deterministic for a fixed collection.
    #[serde(default = "default_chunk_strategy")]
    pub chunk_strategy: String,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            embedding_model: default_embedding_model(),
            chunk_strategy: default_chunk_strategy(),
        }
    }
}

impl CodecConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.chunk_overlap >= self.chunk_size {
            return Err(crate::error::SyncError::invalid_argument(format!(
                "codec.chunk_overlap ({}) must be less than codec.chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Behavioral toggles for the Sync Manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncBehaviorConfig {
    #[serde(default = "default_true")]
    pub auto_stage_on_commit: bool,

    /// Directory name for the side-band manifest, searched alongside a
    /// documented fallback; only the default is written on create.
    #[serde(default = "default_manifest_dir")]
    pub manifest_dir: String,

    #[serde(default = "default_manifest_dir_fallback")]
    pub manifest_dir_fallback: String,
}

impl Default for SyncBehaviorConfig {
    fn default() -> Self {
        Self {
            auto_stage_on_commit: true,
            manifest_dir: default_manifest_dir(),
            manifest_dir_fallback: default_manifest_dir_fallback(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_executable_path() -> String {
    "docvc".to_string()
}

fn default_repository_path() -> PathBuf {
    PathBuf::from("./data/repo")
}

fn default_remote_name() -> String {
    "origin".to_string()
}

fn default_command_timeout_ms() -> u64 {
    30_000
}

fn default_xs_data_path() -> PathBuf {
    PathBuf::from("./xs_data")
}

fn default_chunk_size() -> usize {
    512
}

fn default_chunk_overlap() -> usize {
    50
}

fn default_embedding_model() -> String {
    "default".to_string()
}

fn default_chunk_strategy() -> String {
    "bytes".to_string()
}

fn default_manifest_dir() -> String {
    ".docsync".to_string()
}

fn default_manifest_dir_fallback() -> String {
    ".sync-state".to_string()
}

impl SyncConfig {
    /// Load configuration from an explicit file path.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::error::SyncError::config(format!("failed to parse config: {e}")))?;
        config.codec.validate()?;
        Ok(config)
    }

    /// Load configuration from the user config directory, falling back to a
    /// local `docsync.toml`, falling back to defaults.
    pub fn load_default() -> crate::error::Result<Self> {
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("docsync").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        let local_config = PathBuf::from("docsync.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        let config = Self::default();
        config.codec.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.codec.chunk_size, 512);
        assert_eq!(config.codec.chunk_overlap, 50);
        assert_eq!(config.vs.remote_name, "origin");
        assert!(config.sync.auto_stage_on_commit);
    }

    #[test]
    fn test_overlap_must_be_less_than_size() {
        let mut config = CodecConfig::default();
        config.chunk_overlap = config.chunk_size;
        assert!(config.validate().is_err());
    }
}
