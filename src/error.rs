//! Unified error type hierarchy for Prime Switch
//!
//! Provides `SwitchError` for tool and process failures inside the controller,
//! and `ConfigError` for settings loading. None of these cross the controller
//! boundary: `GpuSwitch` converts them into sentinels, booleans and log lines.

use crate::models::{GpuProfile, ToolRole};
use std::io;
use thiserror::Error;

/// Failures raised while driving the external GPU tools.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwitchError {
    /// A required external tool could not be resolved on PATH
    #[error("Tool for role '{role}' not found ({})", role.disables())]
    ToolUnavailable { role: ToolRole },

    /// A subprocess exited non-zero or could not be spawned
    #[error("Command '{cmd}' failed with status {status}: {stderr}")]
    ProcessFailure {
        cmd: String,
        status: i32,
        stderr: String,
    },

    /// The status file watch could not be established
    #[error("File monitor unavailable: {0}")]
    MonitorFailure(String),

    /// The requested profile is not a valid switch target here
    #[error("Profile '{0}' is not offered by prime-select")]
    InvalidProfile(GpuProfile),
}

impl SwitchError {
    /// Get a user-facing error message suitable for UI display
    pub fn user_message(&self) -> String {
        match self {
            SwitchError::ToolUnavailable { role } => {
                format!("Can't find {} command, {}", role, role.disables())
            }
            SwitchError::ProcessFailure { stderr, .. } if !stderr.trim().is_empty() => {
                format!("GPU switch failed: {}", stderr.trim())
            }
            SwitchError::ProcessFailure { status, .. } => {
                format!("GPU switch failed with status {}", status)
            }
            SwitchError::MonitorFailure(msg) => {
                format!("External profile changes will not be detected: {}", msg)
            }
            SwitchError::InvalidProfile(profile) => {
                format!("{} is not available on this system", profile.label())
            }
        }
    }
}

/// Settings file parsing and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid JSON in settings: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Settings validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error during settings operations: {0}")]
    IoError(#[from] io::Error),
}
