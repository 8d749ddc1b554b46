//! Application state management.

use jot_core::{Config, Indexer, LoggingProgress};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Shared application state.
pub struct App {
    /// Configuration
    pub config: Config,

    /// Where the configuration is loaded from and saved to
    pub config_path: PathBuf,
}

impl App {
    /// Load configuration from `path`, or from the default location.
    pub fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let config_path = match path {
            Some(path) => path,
            None => Config::default_config_path()?,
        };
        let config = Config::load_from(&config_path)?;

        debug!(path = %config_path.display(), "Configuration loaded");
        Ok(App {
            config,
            config_path,
        })
    }

    /// Indexer writing to the configured index, logging its progress.
    pub fn indexer(&self) -> anyhow::Result<Indexer> {
        let notes_dir = self.config.notes_dir()?;
        let progress = Arc::new(LoggingProgress::new(notes_dir.display().to_string()));
        Ok(Indexer::new(self.config.index_store()?).with_progress(progress))
    }

    /// Save the configuration back to where it was loaded from.
    pub fn save_config(&self) -> anyhow::Result<()> {
        self.config.save_to(&self.config_path)?;
        Ok(())
    }
}
