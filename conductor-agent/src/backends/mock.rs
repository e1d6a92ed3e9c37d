// ABOUTME: Mock backend for testing - replays pre-configured events per prompt.
// ABOUTME: Allows deterministic tests without spawning real agent processes.
//!
//! # Example
//!
//! ```no_run
//! use conductor_agent::backends::{BackendSpec, MockConfig};
//! use conductor_agent::{AgentEvent, WorkerTask};
//!
//! # async fn example() {
//! let mock = MockConfig::new().respond_text("hello", "Hi there!");
//! let task = WorkerTask::new("conv-1", BackendSpec::Mock(mock));
//! let mut events = task.subscribe();
//!
//! task.start().await.unwrap();
//! task.send_input("hello").await.unwrap();
//!
//! while let Some(event) = events.recv().await {
//!     if let AgentEvent::TaskComplete { last_message, .. } = event {
//!         assert_eq!(last_message.as_deref(), Some("Hi there!"));
//!         break;
//!     }
//! }
//! # }
//! ```

use super::{ReadySender, COMMAND_BUFFER};
use crate::event::AgentEvent;
use crate::handle::{TaskShared, WorkerCommand};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Scripted mock backend configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockConfig {
    /// Responses matched against prompts by substring
    #[serde(default)]
    pub responses: Vec<MockResponse>,
    /// End the session on its own after this many prompts
    #[serde(default)]
    pub exit_after: Option<usize>,
    /// Fail startup with this message
    #[serde(default)]
    pub fail_start: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockResponse {
    pub pattern: String,
    pub events: Vec<AgentEvent>,
}

impl MockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay `events` for a prompt containing `pattern`
    pub fn on_prompt(mut self, pattern: &str, events: Vec<AgentEvent>) -> Self {
        self.responses.push(MockResponse {
            pattern: pattern.to_string(),
            events,
        });
        self
    }

    /// Reply with a single message and complete the turn
    pub fn respond_text(self, pattern: &str, text: &str) -> Self {
        self.on_prompt(
            pattern,
            vec![
                AgentEvent::AgentMessageDelta {
                    delta: text.to_string(),
                },
                AgentEvent::TaskComplete {
                    last_message: Some(text.to_string()),
                    usage: None,
                },
            ],
        )
    }

    pub fn exit_after(mut self, prompts: usize) -> Self {
        self.exit_after = Some(prompts);
        self
    }

    pub fn fail_start(mut self, message: &str) -> Self {
        self.fail_start = Some(message.to_string());
        self
    }
}

pub(crate) fn spawn(
    config: MockConfig,
    shared: Arc<TaskShared>,
    ready: ReadySender,
) -> mpsc::Sender<WorkerCommand> {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    tokio::spawn(run_worker(config, shared, rx, ready));
    tx
}

async fn run_worker(
    config: MockConfig,
    shared: Arc<TaskShared>,
    mut commands: mpsc::Receiver<WorkerCommand>,
    ready: ReadySender,
) {
    if let Some(message) = config.fail_start {
        let _ = ready.send(Err(message));
        return;
    }

    let session_id = format!("mock-session-{}", uuid::Uuid::new_v4());
    shared.emit(AgentEvent::SessionConfigured { session_id });
    if ready.send(Ok(())).is_err() {
        return;
    }

    let mut expectations: VecDeque<MockResponse> = config.responses.into();
    let mut handled = 0usize;

    loop {
        let command = tokio::select! {
            _ = shared.cancelled() => break,
            command = commands.recv() => command,
        };
        let Some(WorkerCommand::Prompt { text }) = command else {
            break;
        };

        // FIFO preference: the front expectation wins if it matches,
        // otherwise the first matching one anywhere in the queue.
        let front_matches = expectations
            .front()
            .is_some_and(|front| text.contains(&front.pattern));
        let events = if front_matches {
            expectations.pop_front().map(|e| e.events)
        } else {
            expectations
                .iter()
                .position(|e| text.contains(&e.pattern))
                .and_then(|i| expectations.remove(i))
                .map(|e| e.events)
        };

        let events = events.unwrap_or_else(|| {
            let reply = format!("Mock: no expectation for '{}'", text);
            vec![
                AgentEvent::AgentMessageDelta {
                    delta: reply.clone(),
                },
                AgentEvent::TaskComplete {
                    last_message: Some(reply),
                    usage: None,
                },
            ]
        });

        for event in events {
            shared.emit(event);
        }

        handled += 1;
        if config.exit_after.is_some_and(|limit| handled >= limit) {
            shared.mark_exited("mock script finished");
            break;
        }
    }
}
