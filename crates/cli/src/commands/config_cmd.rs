//! `deskpilot config`: configuration helpers.

use anyhow::Context;
use clap::Subcommand;
use deskpilot_config::AppConfig;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print a config file with every default filled in
    Default,

    /// Print where the config file is read from
    Path,

    /// Load the config, apply environment overrides, and validate it
    Validate,
}

pub fn run(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Default => print!("{}", AppConfig::default_toml()),
        ConfigAction::Path => println!("{}", AppConfig::config_dir().join("config.toml").display()),
        ConfigAction::Validate => {
            let config = AppConfig::load().context("Config error")?;
            println!("Config OK");
            println!("  Provider:     {}", config.provider);
            println!("  Model:        {}", config.model);
            println!("  Tool version: {}", config.tool_version);
            println!("  Exec mode:    {:?}", config.exec_mode);
            println!("  MCP servers:  {}", config.mcp_servers.len());
            if !config.has_credentials() {
                println!("  Warning: no credential for the selected provider");
            }
        }
    }
    Ok(())
}
