//! Configure command - update and save settings.

use crate::app::App;
use std::path::PathBuf;

/// Run the configure command.
///
/// With no options, prints the current configuration.
pub fn run(
    mut app: App,
    notes_path: Option<PathBuf>,
    index_path: Option<PathBuf>,
    pattern: Option<String>,
) -> anyhow::Result<()> {
    if notes_path.is_none() && index_path.is_none() && pattern.is_none() {
        println!("# {}", app.config_path.display());
        print!("{}", toml::to_string_pretty(&app.config)?);
        return Ok(());
    }

    let general = &mut app.config.general;
    if let Some(path) = notes_path {
        general.notes_path = Some(path);
    }
    if let Some(path) = index_path {
        general.index_path = Some(path);
    }
    if let Some(pattern) = pattern {
        general.document_pattern = pattern;
    }

    app.config.validate()?;
    app.save_config()?;
    println!("Configuration saved to {}", app.config_path.display());

    Ok(())
}
