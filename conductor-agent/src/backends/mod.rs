// ABOUTME: Backend variants (ACP, Codex CLI, mock) and the tagged union that selects one.
// ABOUTME: Adding a backend adds a BackendKind variant, a BackendSpec variant, and one match arm each.

pub mod acp;
pub mod codex;
pub mod mock;

use crate::handle::{TaskShared, WorkerCommand};
pub use acp::AcpConfig;
pub use codex::CodexConfig;
pub use mock::{MockConfig, MockResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Capacity of the task -> worker command channel
pub(crate) const COMMAND_BUFFER: usize = 32;

/// Reply sent by a worker once its backend is ready (or failed to start)
pub(crate) type ReadySender = oneshot::Sender<Result<(), String>>;

/// Supported backend variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Acp,
    Codex,
    Mock,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [Self::Acp, Self::Codex, Self::Mock];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acp => "acp",
            Self::Codex => "codex",
            Self::Mock => "mock",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conversation type with no backend variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported backend type: {0}")]
pub struct UnknownBackendKind(pub String);

impl FromStr for BackendKind {
    type Err = UnknownBackendKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "acp" => Ok(Self::Acp),
            "codex" => Ok(Self::Codex),
            "mock" => Ok(Self::Mock),
            _ => Err(UnknownBackendKind(s.to_string())),
        }
    }
}

/// Backend variant together with its configuration
#[derive(Debug, Clone)]
pub enum BackendSpec {
    Acp(AcpConfig),
    Codex(CodexConfig),
    Mock(MockConfig),
}

impl BackendSpec {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Acp(_) => BackendKind::Acp,
            Self::Codex(_) => BackendKind::Codex,
            Self::Mock(_) => BackendKind::Mock,
        }
    }

    /// Build the spec for `kind` from backend-specific JSON config.
    ///
    /// A `null` config is treated as an empty object so every field falls
    /// back to its default.
    pub fn from_config(kind: BackendKind, config: &Value) -> Result<Self, serde_json::Error> {
        let config = match config {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };

        Ok(match kind {
            BackendKind::Acp => Self::Acp(serde_json::from_value(config)?),
            BackendKind::Codex => Self::Codex(serde_json::from_value(config)?),
            BackendKind::Mock => Self::Mock(serde_json::from_value(config)?),
        })
    }
}

/// Spawn the worker for `spec`, returning the command sender.
///
/// The worker reports readiness through `ready`; dropping it without a reply
/// means the worker stopped before the backend came up.
pub(crate) fn spawn(
    spec: &BackendSpec,
    shared: Arc<TaskShared>,
    ready: ReadySender,
) -> mpsc::Sender<WorkerCommand> {
    match spec {
        BackendSpec::Acp(config) => acp::spawn(config.clone(), shared, ready),
        BackendSpec::Codex(config) => codex::spawn(config.clone(), shared, ready),
        BackendSpec::Mock(config) => mock::spawn(config.clone(), shared, ready),
    }
}
