use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod client;
mod commands;

use commands::config::{handle_config_command, ConfigCommands};
use commands::remote::{handle_remote_command, RemoteArgs, RemoteCommand};
use commands::serve::{run_serve, ServeOptions};

#[derive(Parser)]
#[command(name = "deskpilot", version, about = "deskpilot desktop agent control plane")]
struct Cli {
    #[arg(
        long,
        default_value = "~/.deskpilot",
        help = "Config root directory (contains config/ and logs/)"
    )]
    config_root: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Host the agent and its HTTP control server")]
    Serve {
        #[arg(long, help = "Enable the control server before starting")]
        enable: bool,
        #[arg(long, default_value = "3", help = "Steps the dry-run agent walks per run")]
        steps: u32,
        #[arg(long, default_value = "500", help = "Delay between dry-run steps")]
        step_delay_ms: u64,
    },
    #[command(subcommand, about = "Control server settings")]
    Config(ConfigCommands),
    #[command(about = "Query /health on a running control server")]
    Health {
        #[command(flatten)]
        remote: RemoteArgs,
    },
    #[command(about = "Query /status on a running control server")]
    Status {
        #[command(flatten)]
        remote: RemoteArgs,
    },
    #[command(about = "Start an agent run")]
    Run {
        #[arg(help = "Natural-language task for the agent")]
        instructions: String,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    #[command(about = "Stop the current agent run")]
    Stop {
        #[command(flatten)]
        remote: RemoteArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    // Expand ~ to home directory
    if cli.config_root.starts_with("~") {
        if let Some(home) = std::env::var_os("HOME") {
            cli.config_root = PathBuf::from(home).join(
                cli.config_root
                    .strip_prefix("~")
                    .unwrap_or(&cli.config_root),
            );
        }
    }

    let log_dir = cli.config_root.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "deskpilot.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Serve {
            enable,
            steps,
            step_delay_ms,
        } => {
            run_serve(
                &cli.config_root,
                ServeOptions {
                    enable,
                    steps,
                    step_delay: Duration::from_millis(step_delay_ms),
                },
            )
            .await?;
        }
        Commands::Config(command) => handle_config_command(&cli.config_root, command)?,
        Commands::Health { remote } => {
            handle_remote_command(&cli.config_root, remote, RemoteCommand::Health).await?
        }
        Commands::Status { remote } => {
            handle_remote_command(&cli.config_root, remote, RemoteCommand::Status).await?
        }
        Commands::Run {
            instructions,
            remote,
        } => {
            handle_remote_command(&cli.config_root, remote, RemoteCommand::Run(instructions))
                .await?
        }
        Commands::Stop { remote } => {
            handle_remote_command(&cli.config_root, remote, RemoteCommand::Stop).await?
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_serve_flags() {
        let cli = Cli::try_parse_from(["deskpilot", "serve", "--enable", "--steps", "5"]).unwrap();
        match cli.command {
            Some(Commands::Serve {
                enable,
                steps,
                step_delay_ms,
            }) => {
                assert!(enable);
                assert_eq!(steps, 5);
                assert_eq!(step_delay_ms, 500);
            }
            _ => panic!("expected serve"),
        }
        assert_eq!(cli.config_root, PathBuf::from("~/.deskpilot"));
    }

    #[test]
    fn cli_parses_run_with_remote_args() {
        let cli = Cli::try_parse_from([
            "deskpilot",
            "run",
            "Open Calculator app",
            "--url",
            "http://127.0.0.1:4000",
            "--api-key",
            "secret",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Run {
                instructions,
                remote,
            }) => {
                assert_eq!(instructions, "Open Calculator app");
                assert_eq!(remote.url.as_deref(), Some("http://127.0.0.1:4000"));
                assert_eq!(remote.api_key.as_deref(), Some("secret"));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn cli_rejects_non_numeric_port() {
        assert!(Cli::try_parse_from(["deskpilot", "config", "set", "--port", "http"]).is_err());
    }

    #[test]
    fn cli_verifies() {
        Cli::command().debug_assert();
    }
}
