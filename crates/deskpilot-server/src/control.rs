use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use deskpilot_core::{
    load_server_config, store_server_config, RunController, SettingsError, SettingsProvider,
};
use deskpilot_schema::{ConfigError, ServerConfig, ServerConfigPatch};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::create_router;
use crate::state::AppState;

/// How long `stop` waits for the serving task to release the socket.
const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
    #[error("failed to bind control server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read control server address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

struct ListenerHandle {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the control listener and the configuration it was started with.
///
/// Configuration changes are applied by restarting the listener, never by
/// patching a running one.
pub struct ControlService {
    config: ServerConfig,
    settings: Option<Arc<dyn SettingsProvider>>,
    controller: RunController,
    listener: Option<ListenerHandle>,
}

impl ControlService {
    pub fn new(config: ServerConfig, controller: RunController) -> Self {
        Self {
            config,
            settings: None,
            controller,
            listener: None,
        }
    }

    /// Loads the effective configuration from `settings` and writes later
    /// changes back to it.
    pub fn from_settings(
        settings: Arc<dyn SettingsProvider>,
        controller: RunController,
    ) -> Result<Self, SettingsError> {
        let config = load_server_config(settings.as_ref())?;
        Ok(Self {
            config,
            settings: Some(settings),
            controller,
            listener: None,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.listener.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(|handle| handle.addr)
    }

    /// Merges `patch`, persists the changed keys and reconciles the listener.
    ///
    /// Only invalid input is an error; listener and persistence failures are
    /// logged.
    pub async fn set_config(
        &mut self,
        patch: ServerConfigPatch,
    ) -> Result<ServerConfig, ControlError> {
        let next = self.config.merged(&patch)?;
        let previous = std::mem::replace(&mut self.config, next.clone());

        if let Some(settings) = &self.settings {
            if let Err(err) = store_server_config(settings.as_ref(), &previous, &next) {
                tracing::warn!("failed to persist control server settings: {err}");
            }
        }

        match (self.is_running(), next.enabled) {
            (true, false) => self.stop().await,
            (false, true) => self.start().await,
            (true, true) if previous.listener_differs(&next) => {
                tracing::info!("control server settings changed, restarting listener");
                self.stop().await;
                self.start().await;
            }
            _ => {}
        }

        Ok(next)
    }

    /// Starts the listener, logging instead of failing.
    pub async fn start(&mut self) {
        if let Err(err) = self.try_start().await {
            tracing::error!("control server not started: {err}");
        }
    }

    pub async fn try_start(&mut self) -> Result<SocketAddr, ControlError> {
        if let Some(handle) = &self.listener {
            tracing::warn!("control server already listening on {}", handle.addr);
            return Ok(handle.addr);
        }

        let bind_addr = self.config.bind_addr();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| ControlError::Bind {
                addr: bind_addr.clone(),
                source,
            })?;
        let addr = listener.local_addr().map_err(ControlError::LocalAddr)?;

        let app = create_router(AppState::new(
            self.controller.clone(),
            self.config.api_key.clone(),
        ));
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await;
            if let Err(err) = served {
                tracing::error!("control server stopped with error: {err}");
            }
        });

        tracing::info!(
            auth = self.config.api_key.is_some(),
            "deskpilot control server listening on {}",
            addr
        );
        self.listener = Some(ListenerHandle {
            addr,
            shutdown,
            task,
        });
        Ok(addr)
    }

    /// Closes the listener and waits for the socket to be released.
    pub async fn stop(&mut self) {
        let Some(handle) = self.listener.take() else {
            tracing::debug!("control server already stopped");
            return;
        };

        handle.shutdown.cancel();
        let mut task = handle.task;
        match tokio::time::timeout(STOP_GRACE, &mut task).await {
            Ok(_) => tracing::info!("control server on {} stopped", handle.addr),
            Err(_) => {
                tracing::warn!(
                    "control server on {} did not drain in time, aborting",
                    handle.addr
                );
                task.abort();
                let _ = task.await;
            }
        }
    }
}

impl Drop for ControlService {
    fn drop(&mut self) {
        if let Some(handle) = &self.listener {
            handle.shutdown.cancel();
        }
    }
}
