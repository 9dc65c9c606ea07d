use std::path::Path;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::client::ControlClient;
use crate::commands::config::show_config;

#[derive(Args)]
pub struct RemoteArgs {
    #[arg(long, help = "Control server URL (defaults to the configured host and port)")]
    pub url: Option<String>,
    #[arg(long, help = "X-API-Key to send (defaults to the configured key)")]
    pub api_key: Option<String>,
}

pub enum RemoteCommand {
    Health,
    Status,
    Run(String),
    Stop,
}

pub async fn handle_remote_command(
    config_root: &Path,
    remote: RemoteArgs,
    command: RemoteCommand,
) -> Result<()> {
    let client = build_client(config_root, remote)?;
    match command {
        RemoteCommand::Health => print_json(&client.health().await?),
        RemoteCommand::Status => print_json(&client.status().await?),
        RemoteCommand::Run(instructions) => print_json(&client.run(&instructions).await?),
        RemoteCommand::Stop => print_json(&client.stop().await?),
    }
}

fn build_client(config_root: &Path, remote: RemoteArgs) -> Result<ControlClient> {
    if let (Some(url), Some(key)) = (&remote.url, &remote.api_key) {
        return Ok(ControlClient::new(url.clone(), Some(key.clone())));
    }
    let config = show_config(config_root)?;
    let url = remote.url.unwrap_or_else(|| config.base_url());
    let api_key = remote.api_key.or(config.api_key);
    Ok(ControlClient::new(url, api_key))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
