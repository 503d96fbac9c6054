//! Progress status stream and best-effort step results.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub message: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl StatusUpdate {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Fire-and-forget sender of [`StatusUpdate`]s. A dropped receiver is ignored.
#[derive(Debug, Clone, Default)]
pub struct StatusReporter {
    sender: Option<mpsc::UnboundedSender<StatusUpdate>>,
}

impl StatusReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StatusUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { sender: Some(tx) }, rx)
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn report(&self, message: impl Into<String>) {
        let update = StatusUpdate::now(message);
        debug!(status = %update.message);
        if let Some(sender) = &self.sender {
            let _ = sender.send(update);
        }
    }
}

/// Outcome of a recovery step whose failure must not abort the operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BestEffort {
    Done,
    Ignored(String),
}

impl BestEffort {
    /// Collapse a fallible step, logging the swallowed failure at debug.
    pub fn from_result<T, E: Display>(step: &str, result: Result<T, E>) -> Self {
        match result {
            Ok(_) => Self::Done,
            Err(e) => {
                let reason = format!("{step}: {e}");
                debug!("Ignored best-effort failure: {}", reason);
                Self::Ignored(reason)
            }
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}
