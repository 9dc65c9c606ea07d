use std::sync::Arc;

use deskpilot_schema::{AgentStatus, ConversationEntry};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Shared record of what the agent is doing right now.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    pub status: AgentStatus,
    /// True exactly while a runner invocation is in flight.
    pub thinking: bool,
    pub instructions: String,
    pub messages: Vec<ConversationEntry>,
    pub error_msg: Option<String>,
    /// Run that currently owns `cancellation`.
    pub run_id: Option<Uuid>,
    pub cancellation: Option<CancellationToken>,
}

impl RunState {
    /// A new run may only start when this is false.
    pub fn is_busy(&self) -> bool {
        self.thinking || self.status == AgentStatus::Running
    }
}

/// Shallow update for [`RunState`]. `None` fields are left untouched.
///
/// Run ownership (`run_id`, `cancellation`) is not part of the patch; it only
/// changes through [`RunStateStore::begin_run`], [`RunStateStore::settle_run`]
/// and [`RunStateStore::request_stop`].
#[derive(Debug, Clone, Default)]
pub struct RunStatePatch {
    pub status: Option<AgentStatus>,
    pub thinking: Option<bool>,
    pub instructions: Option<String>,
    pub messages: Option<Vec<ConversationEntry>>,
    pub error_msg: Option<Option<String>>,
}

impl RunStatePatch {
    pub fn status(status: AgentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    fn apply(self, state: &mut RunState) {
        if let Some(status) = self.status {
            state.status = status;
        }
        if let Some(thinking) = self.thinking {
            state.thinking = thinking;
        }
        if let Some(instructions) = self.instructions {
            state.instructions = instructions;
        }
        if let Some(messages) = self.messages {
            state.messages = messages;
        }
        if let Some(error_msg) = self.error_msg {
            state.error_msg = error_msg;
        }
    }
}

/// Handed out when a run is accepted.
#[derive(Debug, Clone)]
pub struct RunTicket {
    pub run_id: Uuid,
    pub cancellation: CancellationToken,
}

/// Cloneable handle to the process-wide [`RunState`].
///
/// Every mutation goes through the underlying watch channel, which serializes
/// writers and publishes the new snapshot to subscribers (the UI layer).
#[derive(Clone)]
pub struct RunStateStore {
    tx: Arc<watch::Sender<RunState>>,
}

impl Default for RunStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStateStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(RunState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> RunState {
        self.tx.borrow().clone()
    }

    pub fn merge(&self, patch: RunStatePatch) {
        self.tx.send_modify(|state| patch.apply(state));
    }

    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut RunState),
    {
        self.tx.send_modify(f);
    }

    /// Applies `f` only while `run_id` still owns the state. Returns whether it ran.
    pub fn update_if_current<F>(&self, run_id: Uuid, f: F) -> bool
    where
        F: FnOnce(&mut RunState),
    {
        self.tx.send_if_modified(|state| {
            if state.run_id != Some(run_id) {
                return false;
            }
            f(state);
            true
        })
    }

    /// Like [`Self::update_if_current`], but also refuses once the run was stopped.
    pub fn update_if_active<F>(&self, run_id: Uuid, f: F) -> bool
    where
        F: FnOnce(&mut RunState),
    {
        self.tx.send_if_modified(|state| {
            if state.run_id != Some(run_id) || !state.thinking {
                return false;
            }
            f(state);
            true
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.tx.subscribe()
    }

    /// Compare-and-set gate for starting a run.
    ///
    /// Returns `None` without touching the state when a run is already in
    /// flight. Otherwise records the instructions, a fresh cancellation token,
    /// `thinking = true` and clears the last error, all under one write.
    pub fn begin_run(&self, instructions: impl Into<String>) -> Option<RunTicket> {
        let instructions = instructions.into();
        let mut ticket = None;
        self.tx.send_if_modified(|state| {
            if state.is_busy() {
                return false;
            }
            let run_id = Uuid::new_v4();
            let cancellation = CancellationToken::new();
            state.instructions = instructions;
            state.thinking = true;
            state.error_msg = None;
            state.run_id = Some(run_id);
            state.cancellation = Some(cancellation.clone());
            ticket = Some(RunTicket {
                run_id,
                cancellation,
            });
            true
        });
        ticket
    }

    /// Records how a run ended and releases its cancellation token.
    ///
    /// Ignored when a newer run has taken over since `run_id` started.
    pub fn settle_run(&self, run_id: Uuid, outcome: Result<(), String>) -> bool {
        self.update_if_current(run_id, |state| {
            state.thinking = false;
            state.run_id = None;
            state.cancellation = None;
            if let Err(message) = outcome {
                state.status = AgentStatus::Error;
                state.error_msg = Some(message);
            }
        })
    }

    /// Marks the agent as stopped and hands back the token to signal.
    ///
    /// The token stays in the state until the run settles.
    pub fn request_stop(&self) -> Option<CancellationToken> {
        let mut token = None;
        self.tx.send_modify(|state| {
            state.status = AgentStatus::End;
            state.thinking = false;
            token = state.cancellation.clone();
        });
        token
    }
}
