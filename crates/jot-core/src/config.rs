//! Configuration management for Jot.
//!
//! Configuration is stored in TOML format in a platform-appropriate location
//! and handed explicitly to the indexer and searcher; nothing reads it from
//! global state.

use crate::error::{JotError, Result};
use crate::highlight::Highlighter;
use crate::persistence::IndexStore;
use crate::search::{Searcher, DEFAULT_EXCERPT_LENGTH, DEFAULT_MAX_RESULTS};
use crate::source::FolderSource;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure for Jot.
///
/// ## Example Configuration File (jot.toml)
///
/// ```toml
/// [general]
/// notes_path = "/home/me/notes"
/// document_pattern = "*.md"
/// log_level = "info"
///
/// [search]
/// max_results = 20
/// excerpt_length = 120
/// highlight_start = "**"
/// highlight_end = "**"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Search and display settings
    pub search: SearchConfig,
}

/// General configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Folder holding the notes (None = default location)
    pub notes_path: Option<PathBuf>,

    /// Index directory (None = default location)
    pub index_path: Option<PathBuf>,

    /// Glob pattern selecting note files
    pub document_pattern: String,

    /// Compress segment files
    pub compress_index: bool,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            notes_path: None,
            index_path: None,
            document_pattern: FolderSource::DEFAULT_PATTERN.to_string(),
            compress_index: true,
            log_level: "info".to_string(),
        }
    }
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of hits returned when the caller does not say
    pub max_results: usize,

    /// Target excerpt length in bytes
    pub excerpt_length: usize,

    /// Marker inserted before each match
    pub highlight_start: String,

    /// Marker inserted after each match
    pub highlight_end: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            max_results: DEFAULT_MAX_RESULTS,
            excerpt_length: DEFAULT_EXCERPT_LENGTH,
            highlight_start: "**".to_string(),
            highlight_end: "**".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default config if no config file exists.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Config::default());
        }

        info!(path = %path.display(), "Loading configuration");
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents).map_err(|e| JotError::ConfigError {
            reason: format!("Failed to parse config: {}", e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path()?;
        self.save_to(&config_path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        info!(path = %path.display(), "Saving configuration");
        let contents = toml::to_string_pretty(self).map_err(|e| JotError::ConfigError {
            reason: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        glob::Pattern::new(&self.general.document_pattern).map_err(|e| JotError::ConfigError {
            reason: format!("Invalid document_pattern {:?}: {}", self.general.document_pattern, e),
        })?;
        if self.search.excerpt_length == 0 {
            return Err(JotError::ConfigError {
                reason: "excerpt_length must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "jot").ok_or_else(|| JotError::ConfigError {
            reason: "Could not determine config directory".to_string(),
        })?;

        Ok(dirs.config_dir().join("jot.toml"))
    }

    /// Get the default data directory path.
    pub fn default_data_dir() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "jot").ok_or_else(|| JotError::ConfigError {
            reason: "Could not determine data directory".to_string(),
        })?;

        Ok(dirs.data_dir().to_path_buf())
    }

    /// Get the notes directory (from config or default).
    pub fn notes_dir(&self) -> Result<PathBuf> {
        match &self.general.notes_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::default_data_dir()?.join("notes")),
        }
    }

    /// Get the index directory (from config or default).
    pub fn index_dir(&self) -> Result<PathBuf> {
        match &self.general.index_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::default_data_dir()?.join("index")),
        }
    }

    /// Document source over the configured notes folder
    pub fn document_source(&self) -> Result<FolderSource> {
        FolderSource::new(self.notes_dir()?, &self.general.document_pattern)
    }

    /// Index store at the configured location
    pub fn index_store(&self) -> Result<IndexStore> {
        Ok(IndexStore::new(self.index_dir()?).with_compression(self.general.compress_index))
    }

    /// Searcher with the configured markers, excerpt length and note pattern
    pub fn searcher(&self) -> Result<Searcher> {
        let highlighter = Highlighter::new(
            self.search.highlight_start.clone(),
            self.search.highlight_end.clone(),
        );
        Ok(Searcher::new(self.index_dir()?)
            .with_highlighter(highlighter)
            .with_excerpt_length(self.search.excerpt_length)
            .with_document_pattern(self.general.document_pattern.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.document_pattern, "*.md");
        assert!(config.general.compress_index);
        assert_eq!(config.search.max_results, 20);
        assert_eq!(config.search.excerpt_length, 120);
        assert_eq!(config.search.highlight_start, "**");
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("jot.toml");

        let mut config = Config::default();
        config.general.notes_path = Some(PathBuf::from("/home/me/notes"));
        config.general.document_pattern = "*.txt".to_string();
        config.search.max_results = 5;

        config.save_to(&config_path).unwrap();
        let loaded = Config::load_from(&config_path).unwrap();

        assert_eq!(loaded.general.notes_path, Some(PathBuf::from("/home/me/notes")));
        assert_eq!(loaded.general.document_pattern, "*.txt");
        assert_eq!(loaded.search.max_results, 5);
        assert_eq!(loaded.notes_dir().unwrap(), PathBuf::from("/home/me/notes"));
    }

    #[test]
    fn test_load_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.search.max_results, 20);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("jot.toml");
        fs::write(&config_path, "[search]\nhighlight_start = \"<b>\"\n").unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.search.highlight_start, "<b>");
        assert_eq!(config.search.highlight_end, "**");
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_invalid_files_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("jot.toml");

        fs::write(&config_path, "[general\n").unwrap();
        assert!(matches!(
            Config::load_from(&config_path),
            Err(JotError::ConfigError { .. })
        ));

        fs::write(&config_path, "[general]\ndocument_pattern = \"[md\"\n").unwrap();
        assert!(matches!(
            Config::load_from(&config_path),
            Err(JotError::ConfigError { .. })
        ));

        fs::write(&config_path, "[search]\nexcerpt_length = 0\n").unwrap();
        assert!(Config::load_from(&config_path).is_err());
    }

    #[test]
    fn test_explicit_paths() {
        let mut config = Config::default();
        config.general.index_path = Some(PathBuf::from("/tmp/jot-index"));

        assert_eq!(config.index_dir().unwrap(), PathBuf::from("/tmp/jot-index"));
        assert_eq!(
            config.index_store().unwrap().dir(),
            Path::new("/tmp/jot-index")
        );
    }
}
