//! Prime Switch
//!
//! Controller for NVIDIA PRIME profile switching on multi-GPU laptops. It
//! drives `prime-select` (through `pkexec` for switches), tracks whether a
//! switch needs a logout to take effect, and watches `/etc/prime-discrete` for
//! changes made behind its back.
//!
//! The system is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Core data structures and types
//! - **system**: Process execution and tool resolution
//! - **prime**: Switch controller, event bus and status file monitor
//! - **config**: Controller configuration and user settings
//! - **ui**: Headless menu model and session logout
//! - **log_collector**: Append-only process log
//!
//! Everything except the log writer runs on a single thread inside a
//! `tokio::task::LocalSet`.

// Core foundational modules
pub mod error;
pub mod models;

// Process execution and tool discovery
pub mod system;

// Switch controller, events, file monitor
pub mod prime;

pub mod config;

// Headless menu model consumed by the panel
pub mod ui;

pub mod log_collector;

// Re-export the log crate for macro usage
pub use log;

// ============================================================================
// PUBLIC RE-EXPORTS FOR CONVENIENCE
// ============================================================================

pub use error::{ConfigError, SwitchError};

pub use models::{GpuProfile, ProcessOutput, SwitchRequest, SwitchResult, ToolRole};

pub use system::{CommandResolver, ProcessExecutor, SystemExecutor, ToolSet, WhichResolver};

pub use prime::{EventBus, FileMonitor, GpuSwitch, SubscriptionId, SwitchEvent, SwitchState};

pub use config::{AppSettings, SettingsManager, SwitchConfig};

pub use ui::{GnomeSession, MenuState, MenuSync, SessionControl};

pub use log_collector::{LogCollector, LogLine};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constant() {
        assert_eq!(VERSION, "0.1.0");
    }

    #[test]
    fn test_models_reexport() {
        let _profile = GpuProfile::OnDemand;
        let _role = ToolRole::QuerySelect;
    }

    #[test]
    fn test_error_reexport() {
        let err = SwitchError::MonitorFailure("x".to_string());
        assert!(err.to_string().contains("x"));
    }
}
