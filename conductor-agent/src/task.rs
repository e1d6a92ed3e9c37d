// ABOUTME: WorkerTask - one backend session bound to a conversation.
// ABOUTME: Owns the lifecycle state, the command channel to its backend worker, and the event fan-out.

use crate::backends::{self, BackendKind, BackendSpec};
use crate::error::WorkerError;
use crate::handle::{EventReceiver, TaskShared, WorkerCommand};
use crate::lifecycle::LifecycleState;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot, watch};

/// One live or idle backend session for a conversation.
///
/// The task is the sole producer of its conversation's event stream. It is
/// created `Idle`; nothing is spawned until [`WorkerTask::start`] is called.
pub struct WorkerTask {
    spec: BackendSpec,
    shared: Arc<TaskShared>,
    commands: Mutex<Option<mpsc::Sender<WorkerCommand>>>,
}

impl WorkerTask {
    pub fn new(conversation_id: impl Into<String>, spec: BackendSpec) -> Self {
        Self {
            spec,
            shared: Arc::new(TaskShared::new(conversation_id.into())),
            commands: Mutex::new(None),
        }
    }

    pub fn conversation_id(&self) -> &str {
        self.shared.conversation_id()
    }

    /// Which backend variant this task wraps
    pub fn kind(&self) -> BackendKind {
        self.spec.kind()
    }

    pub fn spec(&self) -> &BackendSpec {
        &self.spec
    }

    pub fn state(&self) -> LifecycleState {
        self.shared.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.shared.watch_state()
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> EventReceiver {
        self.shared.subscribe()
    }

    /// Spawn the backend and wait until it is ready for input.
    ///
    /// Calling `start` on a task that is already starting waits for that
    /// start to finish; on a running task it returns immediately.
    pub async fn start(&self) -> Result<(), WorkerError> {
        if !self.shared.transition(LifecycleState::Starting) {
            return self.await_running().await;
        }

        tracing::info!(
            conversation_id = %self.conversation_id(),
            kind = %self.kind(),
            "Starting worker task"
        );

        let (ready_tx, ready_rx) = oneshot::channel();
        let commands = backends::spawn(&self.spec, Arc::clone(&self.shared), ready_tx);
        *self.commands() = Some(commands);

        match ready_rx.await {
            Ok(Ok(())) => {
                if self.shared.transition(LifecycleState::Running) {
                    tracing::info!(conversation_id = %self.conversation_id(), "Worker task running");
                    Ok(())
                } else {
                    // Killed while the backend was starting
                    self.commands().take();
                    Err(WorkerError::Terminated)
                }
            }
            Ok(Err(message)) => {
                self.commands().take();
                self.shared.mark_exited(&message);
                Err(WorkerError::StartFailed(message))
            }
            Err(_) => {
                self.commands().take();
                if self.state() == LifecycleState::Killed {
                    return Err(WorkerError::Terminated);
                }
                let message = "backend worker stopped during startup".to_string();
                self.shared.mark_exited(&message);
                Err(WorkerError::StartFailed(message))
            }
        }
    }

    async fn await_running(&self) -> Result<(), WorkerError> {
        let mut state = self.watch_state();
        let settled = state
            .wait_for(|s| *s != LifecycleState::Starting)
            .await
            .map(|s| *s)
            .unwrap_or(LifecycleState::Killed);

        match settled {
            LifecycleState::Running => Ok(()),
            LifecycleState::Idle | LifecycleState::Starting => Err(WorkerError::NotStarted),
            LifecycleState::Exited | LifecycleState::Killed => Err(WorkerError::Terminated),
        }
    }

    /// Forward user input to the backend session
    pub async fn send_input(&self, text: impl Into<String>) -> Result<(), WorkerError> {
        match self.state() {
            LifecycleState::Running => {}
            LifecycleState::Idle | LifecycleState::Starting => return Err(WorkerError::NotStarted),
            LifecycleState::Exited | LifecycleState::Killed => return Err(WorkerError::Terminated),
        }

        let tx = self.commands().clone().ok_or(WorkerError::NotStarted)?;
        tx.send(WorkerCommand::Prompt { text: text.into() })
            .await
            .map_err(|_| WorkerError::ChannelClosed)
    }

    /// Terminate the task. Idempotent, never fails, and safe before `start`.
    ///
    /// Signals the backend and returns without waiting for the process to exit.
    pub fn kill(&self) {
        let transitioned = self.shared.transition(LifecycleState::Killed);
        self.shared.cancel();
        self.commands().take();

        if transitioned {
            tracing::info!(
                conversation_id = %self.conversation_id(),
                kind = %self.kind(),
                "Worker task killed"
            );
        } else {
            tracing::debug!(
                conversation_id = %self.conversation_id(),
                state = %self.state(),
                "Kill on terminated task ignored"
            );
        }
    }

    fn commands(&self) -> MutexGuard<'_, Option<mpsc::Sender<WorkerCommand>>> {
        self.commands.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for WorkerTask {
    fn drop(&mut self) {
        if !self.shared.is_cancelled() {
            self.shared.cancel();
        }
    }
}

impl std::fmt::Debug for WorkerTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerTask")
            .field("conversation_id", &self.conversation_id())
            .field("kind", &self.kind())
            .field("state", &self.state())
            .finish()
    }
}
