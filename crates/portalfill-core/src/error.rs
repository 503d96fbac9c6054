//! Automation error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    /// The host cannot run a browser at all; raised before any page interaction.
    #[error("Browser runtime unavailable: {0}")]
    Environment(String),

    #[error("{0}")]
    Precondition(String),

    #[error("Mapping config error: {0}")]
    Config(String),

    #[error("Browser error: {0}")]
    Browser(String),
}

impl AutomationError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }
}

impl From<anyhow::Error> for AutomationError {
    fn from(error: anyhow::Error) -> Self {
        Self::Browser(format!("{error:#}"))
    }
}

impl From<serde_json::Error> for AutomationError {
    fn from(error: serde_json::Error) -> Self {
        Self::Config(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AutomationError>;
