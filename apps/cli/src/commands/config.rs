//! Config command implementation.

use anyhow::Context;
use colored::Colorize;
use loupe_orchestrator::{LoupeConfig, Settings};
use std::path::Path;

/// Execute the config command.
///
/// Prints the environment settings with the credential redacted, then the
/// effective `loupe.toml` values.
pub fn execute(config_path: Option<&Path>) -> anyhow::Result<()> {
    let settings = Settings::load().context("Failed to load settings")?;
    let (config, source) = LoupeConfig::discover(config_path).context("Failed to load configuration")?;

    println!("{}", "Settings".bold().cyan());
    print!("{}", settings);
    println!();

    match source {
        Some(path) => println!("{} {}", "Configuration".bold().cyan(), format!("({})", path.display()).dimmed()),
        None => println!("{} {}", "Configuration".bold().cyan(), "(defaults)".dimmed()),
    }
    let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}
