// ABOUTME: Channel plumbing shared between a WorkerTask and its backend worker.
// ABOUTME: Commands flow in over mpsc; events fan out over broadcast to every subscriber.

use crate::event::AgentEvent;
use crate::lifecycle::LifecycleState;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

/// Per-task event buffer. Slow subscribers past this lag lose events.
pub(crate) const EVENT_BUFFER: usize = 2048;

/// Commands sent from a WorkerTask to its backend worker
#[derive(Debug)]
pub(crate) enum WorkerCommand {
    Prompt { text: String },
}

/// State shared by a task and the worker driving its backend
pub(crate) struct TaskShared {
    conversation_id: String,
    events: broadcast::Sender<AgentEvent>,
    state: watch::Sender<LifecycleState>,
    cancel: CancellationToken,
}

impl TaskShared {
    pub(crate) fn new(conversation_id: String) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (state, _) = watch::channel(LifecycleState::Idle);
        Self {
            conversation_id,
            events,
            state,
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Publish an event to every current subscriber
    pub(crate) fn emit(&self, event: AgentEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!(
                conversation_id = %self.conversation_id,
                "No subscribers, event dropped"
            );
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub(crate) fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Apply `next` if it is a legal transition from the current state
    pub(crate) fn transition(&self, next: LifecycleState) -> bool {
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    /// Record that the backend ended on its own
    pub(crate) fn mark_exited(&self, reason: &str) {
        if self.transition(LifecycleState::Exited) {
            tracing::info!(
                conversation_id = %self.conversation_id,
                reason = %reason,
                "Worker backend exited"
            );
        }
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the task has been killed or dropped
    pub(crate) async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub(crate) fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.events.subscribe(), self.state.subscribe())
    }
}

/// Receiver for a task's event stream.
///
/// Events arrive in emission order. The stream ends once the task reaches a
/// terminal state and every buffered event has been delivered.
pub struct EventReceiver {
    events: broadcast::Receiver<AgentEvent>,
    state: watch::Receiver<LifecycleState>,
}

impl EventReceiver {
    pub(crate) fn new(
        events: broadcast::Receiver<AgentEvent>,
        state: watch::Receiver<LifecycleState>,
    ) -> Self {
        Self { events, state }
    }

    /// Receive the next event, or None once the task has terminated
    pub async fn recv(&mut self) -> Option<AgentEvent> {
        loop {
            let received = tokio::select! {
                biased;
                result = self.events.recv() => Some(result),
                _ = self.state.wait_for(LifecycleState::is_terminal) => None,
            };

            match received {
                Some(Ok(event)) => return Some(event),
                Some(Err(RecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "Event subscriber lagged, events dropped");
                }
                Some(Err(RecvError::Closed)) => return None,
                None => return self.try_recv(),
            }
        }
    }

    /// Take an already-buffered event without waiting
    pub fn try_recv(&mut self) -> Option<AgentEvent> {
        loop {
            match self.events.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event subscriber lagged, events dropped");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}
