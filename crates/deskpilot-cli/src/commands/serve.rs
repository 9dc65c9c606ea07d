use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use deskpilot_core::{
    DryRunRunner, RunController, RunState, RunStateStore, SettingsProvider, YamlSettingsStore,
};
use deskpilot_schema::ServerConfigPatch;
use deskpilot_server::ControlService;
use tokio::sync::watch;

use super::settings_path;

pub struct ServeOptions {
    pub enable: bool,
    pub steps: u32,
    pub step_delay: Duration,
}

/// Hosts the control server and the dry-run agent until Ctrl-C.
pub async fn run_serve(config_root: &Path, options: ServeOptions) -> Result<()> {
    let path = settings_path(config_root);
    let settings: Arc<dyn SettingsProvider> = Arc::new(
        YamlSettingsStore::open(&path)
            .with_context(|| format!("failed to open settings at {}", path.display()))?,
    );

    let store = RunStateStore::new();
    let runner = Arc::new(DryRunRunner::new(options.steps, options.step_delay));
    let controller = RunController::new(store.clone(), runner);
    let mut service = ControlService::from_settings(settings, controller.clone())?;

    if options.enable && !service.config().enabled {
        service
            .set_config(ServerConfigPatch {
                enabled: Some(true),
                ..Default::default()
            })
            .await?;
    } else if service.config().enabled {
        service.start().await;
    }

    if !service.is_running() {
        tracing::warn!(
            "control server is not listening; enable it with `deskpilot config set --enabled true` or `deskpilot serve --enable`"
        );
    }

    let watcher = tokio::spawn(log_state_changes(store.subscribe()));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    controller.stop();
    service.stop().await;
    watcher.abort();
    Ok(())
}

/// Mirrors run-state changes into the log, one line per transition or new entry.
async fn log_state_changes(mut rx: watch::Receiver<RunState>) {
    let initial = rx.borrow_and_update().clone();
    let mut last = (initial.status, initial.thinking);
    let mut seen = 0;

    while rx.changed().await.is_ok() {
        let state = rx.borrow_and_update().clone();

        if (state.status, state.thinking) != last {
            last = (state.status, state.thinking);
            match &state.error_msg {
                Some(error) => tracing::warn!(
                    status = %state.status,
                    thinking = state.thinking,
                    "agent state changed: {error}"
                ),
                None => tracing::info!(
                    status = %state.status,
                    thinking = state.thinking,
                    instructions = %state.instructions,
                    "agent state changed"
                ),
            }
        }

        if state.messages.len() < seen {
            seen = 0;
        }
        for entry in &state.messages[seen..] {
            tracing::info!(from = ?entry.from, "{}", entry.value);
        }
        seen = state.messages.len();
    }
}
