use std::time::Duration;
use thiserror::Error;

/// Failure taxonomy for the automation engine.
///
/// `AssetMissing` and `CaptureFailed` are fatal configuration/environment
/// defects and are never retried. `StepTimeout` and `Interrupted` are the
/// two terminal causes a retryable step can surface; they are deliberately
/// distinct variants so callers can tell a deliberate user abort from a
/// step that exhausted its attempt budget.
#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Template asset missing: {0}")]
    AssetMissing(String),

    #[error("Screen capture failed: {0}")]
    CaptureFailed(String),

    #[error("No visible window for process: {0}")]
    WindowNotFound(String),

    #[error("Step '{step}' timed out after {attempts} attempts ({elapsed:?})")]
    StepTimeout {
        step: String,
        attempts: u32,
        elapsed: Duration,
    },

    #[error("Operation cancelled by user")]
    Interrupted,

    #[error("Another procedure is already running")]
    Busy,

    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    #[error("Input dispatch failed: {0}")]
    InputError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),
}

impl AutomationError {
    /// Whether this error must abort the surrounding procedure immediately,
    /// bypassing any retry envelope.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AutomationError::AssetMissing(_) | AutomationError::CaptureFailed(_)
        )
    }
}
