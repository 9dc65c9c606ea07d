use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use deskpilot_schema::{AgentStatus, ConversationEntry, Speaker};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::run_state::{RunState, RunStateStore, RunTicket};

/// The agent loop itself (VLM inference, action parsing, input injection).
///
/// Implementations read and write run state through [`RunContext`], observe
/// `ctx.cancellation` cooperatively, and must eventually return so the run is
/// released.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, ctx: RunContext) -> Result<()>;
}

/// Everything a runner gets for one run.
#[derive(Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub instructions: String,
    pub cancellation: CancellationToken,
    store: RunStateStore,
}

impl RunContext {
    pub fn new(store: RunStateStore, ticket: RunTicket, instructions: impl Into<String>) -> Self {
        Self {
            run_id: ticket.run_id,
            instructions: instructions.into(),
            cancellation: ticket.cancellation,
            store,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    pub fn snapshot(&self) -> RunState {
        self.store.snapshot()
    }

    /// Mutates the shared state while this run is in flight.
    ///
    /// Returns false (and drops the write) once the run was stopped or a newer
    /// run has taken over.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut RunState),
    {
        self.store.update_if_active(self.run_id, f)
    }

    pub fn set_status(&self, status: AgentStatus) -> bool {
        self.update(|state| state.status = status)
    }

    pub fn push_message(&self, entry: ConversationEntry) -> bool {
        self.update(|state| state.messages.push(entry))
    }
}

/// Stand-in runner used when no VLM backend is attached.
///
/// Records the instruction, walks a fixed number of steps and then ends.
pub struct DryRunRunner {
    steps: u32,
    step_delay: Duration,
}

impl DryRunRunner {
    pub fn new(steps: u32, step_delay: Duration) -> Self {
        Self { steps, step_delay }
    }
}

impl Default for DryRunRunner {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

#[async_trait]
impl AgentRunner for DryRunRunner {
    async fn run(&self, ctx: RunContext) -> Result<()> {
        let instructions = ctx.instructions.clone();
        let started = ctx.update(|state| {
            state.status = AgentStatus::Running;
            state.messages.clear();
            state
                .messages
                .push(ConversationEntry::new(Speaker::Human, instructions));
        });
        if !started {
            tracing::debug!(run_id = %ctx.run_id, "dry run stopped before it began");
            return Ok(());
        }

        for step in 1..=self.steps {
            tokio::select! {
                _ = ctx.cancelled() => {
                    tracing::info!(run_id = %ctx.run_id, step, "dry run cancelled");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.step_delay) => {}
            }
            ctx.push_message(ConversationEntry::new(
                Speaker::Gpt,
                format!("step {step}/{}: {}", self.steps, ctx.instructions),
            ));
        }

        ctx.set_status(AgentStatus::End);
        tracing::info!(run_id = %ctx.run_id, steps = self.steps, "dry run finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(store: &RunStateStore, instructions: &str) -> RunContext {
        let ticket = store.begin_run(instructions).unwrap();
        RunContext::new(store.clone(), ticket, instructions)
    }

    #[tokio::test]
    async fn dry_run_records_transcript_and_ends() {
        let store = RunStateStore::new();
        let ctx = context(&store, "Open Calculator app");
        DryRunRunner::new(2, Duration::from_millis(1))
            .run(ctx)
            .await
            .unwrap();

        let state = store.snapshot();
        assert_eq!(state.status, AgentStatus::End);
        assert_eq!(state.messages.len(), 3);
        assert_eq!(state.messages[0].from, Speaker::Human);
        assert_eq!(state.messages[0].value, "Open Calculator app");
        assert_eq!(state.messages[2].from, Speaker::Gpt);
    }

    #[tokio::test]
    async fn dry_run_stops_on_cancellation() {
        let store = RunStateStore::new();
        let ctx = context(&store, "long task");
        let token = ctx.cancellation.clone();
        let mut rx = store.subscribe();
        let handle = tokio::spawn({
            let ctx = ctx.clone();
            async move { DryRunRunner::new(100, Duration::from_secs(60)).run(ctx).await }
        });

        rx.wait_for(|state| state.status == AgentStatus::Running)
            .await
            .unwrap();
        store.request_stop();
        token.cancel();
        handle.await.unwrap().unwrap();

        let state = store.snapshot();
        assert_eq!(state.status, AgentStatus::End);
        assert_eq!(state.messages.len(), 1);
    }

    #[tokio::test]
    async fn dry_run_skips_work_when_stopped_first() {
        let store = RunStateStore::new();
        let ctx = context(&store, "task");
        store.request_stop();
        ctx.cancellation.cancel();

        DryRunRunner::new(1, Duration::from_millis(1))
            .run(ctx)
            .await
            .unwrap();

        let state = store.snapshot();
        assert_eq!(state.status, AgentStatus::End);
        assert!(state.messages.is_empty());
    }

    #[tokio::test]
    async fn context_writes_are_scoped_to_its_run() {
        let store = RunStateStore::new();
        let stale = context(&store, "old");
        store.settle_run(stale.run_id, Ok(()));
        let _fresh = context(&store, "new");

        assert!(!stale.push_message(ConversationEntry::new(Speaker::Gpt, "late")));
        assert!(!stale.set_status(AgentStatus::Error));
        assert!(store.snapshot().messages.is_empty());
    }
}
