use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use deskpilot_core::{load_server_config, store_server_config, YamlSettingsStore};
use deskpilot_schema::{ServerConfig, ServerConfigPatch};

use super::settings_path;

#[derive(Subcommand)]
pub enum ConfigCommands {
    #[command(about = "Print the effective control server settings")]
    Show,
    #[command(about = "Change control server settings")]
    Set {
        #[arg(long, help = "Enable or disable the control server")]
        enabled: Option<bool>,
        #[arg(long, help = "Listen port (1024-65535)")]
        port: Option<u16>,
        #[arg(long, help = "Listen host")]
        host: Option<String>,
        #[arg(long, help = "Required X-API-Key value; empty clears it")]
        api_key: Option<String>,
    },
}

pub fn handle_config_command(config_root: &Path, command: ConfigCommands) -> Result<()> {
    let config = match command {
        ConfigCommands::Show => show_config(config_root)?,
        ConfigCommands::Set {
            enabled,
            port,
            host,
            api_key,
        } => set_config(
            config_root,
            ServerConfigPatch {
                enabled,
                port,
                host,
                api_key,
            },
        )?,
    };
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

pub fn show_config(config_root: &Path) -> Result<ServerConfig> {
    let store = open_store(config_root)?;
    Ok(load_server_config(&store)?)
}

/// Validates `patch` against the stored settings and persists the changed keys.
pub fn set_config(config_root: &Path, patch: ServerConfigPatch) -> Result<ServerConfig> {
    if patch.is_empty() {
        bail!("nothing to set; pass at least one of --enabled, --port, --host, --api-key");
    }
    let store = open_store(config_root)?;
    let current = load_server_config(&store)?;
    let next = current.merged(&patch)?;
    store_server_config(&store, &current, &next)?;
    tracing::info!(path = %store.path().display(), "control server settings updated");
    Ok(next)
}

fn open_store(config_root: &Path) -> Result<YamlSettingsStore> {
    let path = settings_path(config_root);
    YamlSettingsStore::open(&path)
        .with_context(|| format!("failed to open settings at {}", path.display()))
}
