use std::any::Any;
use std::sync::Arc;

use tokio::task::JoinError;
use uuid::Uuid;

use crate::run_state::RunStateStore;
use crate::runner::{AgentRunner, RunContext};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StartError {
    #[error("Agent is already running")]
    AlreadyRunning,
}

/// Start/stop semantics over [`RunStateStore`], shared by every front end.
#[derive(Clone)]
pub struct RunController {
    store: RunStateStore,
    runner: Arc<dyn AgentRunner>,
}

impl RunController {
    pub fn new(store: RunStateStore, runner: Arc<dyn AgentRunner>) -> Self {
        Self { store, runner }
    }

    pub fn store(&self) -> &RunStateStore {
        &self.store
    }

    /// Accepts a run and launches the runner as a detached task.
    ///
    /// Returns as soon as the run is recorded; completion is observed through
    /// the store. Must be called from within a tokio runtime.
    pub fn start(&self, instructions: impl Into<String>) -> Result<Uuid, StartError> {
        let instructions = instructions.into();
        let ticket = self
            .store
            .begin_run(instructions.clone())
            .ok_or(StartError::AlreadyRunning)?;
        let run_id = ticket.run_id;
        let ctx = RunContext::new(self.store.clone(), ticket, instructions);
        let runner = Arc::clone(&self.runner);
        let store = self.store.clone();

        tracing::info!(%run_id, "agent run accepted");
        tokio::spawn(async move {
            // Inner task so a panicking runner still releases the run.
            let joined = tokio::spawn(async move { runner.run(ctx).await }).await;
            let outcome = match joined {
                Ok(Ok(())) => {
                    tracing::info!(%run_id, "agent run settled");
                    Ok(())
                }
                Ok(Err(err)) => {
                    tracing::warn!(%run_id, "agent run failed: {err:#}");
                    Err(err.to_string())
                }
                Err(err) => {
                    let message = join_error_message(err);
                    tracing::error!(%run_id, "agent run aborted: {message}");
                    Err(message)
                }
            };
            if !store.settle_run(run_id, outcome) {
                tracing::debug!(%run_id, "run settled after a newer run took over");
            }
        });

        Ok(run_id)
    }

    /// Requests a cooperative stop. Returns whether a cancellation token was signalled.
    pub fn stop(&self) -> bool {
        match self.store.request_stop() {
            Some(token) => {
                token.cancel();
                tracing::info!("agent stop requested");
                true
            }
            None => {
                tracing::debug!("stop requested with no active run");
                false
            }
        }
    }
}

fn join_error_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload: Box<dyn Any + Send> = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("agent runner panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("agent runner panicked: {message}")
    } else {
        "agent runner panicked".to_string()
    }
}
