//! Core data types for Prime Switch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Configured graphics rendering profile as reported by `prime-select`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GpuProfile {
    Intel,
    Nvidia,
    OnDemand,
    Unknown,
}

impl GpuProfile {
    /// Profiles that may ever be a switch target.
    pub const SWITCHABLE: [GpuProfile; 3] =
        [GpuProfile::Intel, GpuProfile::Nvidia, GpuProfile::OnDemand];

    /// Tool-facing name, as accepted on the `prime-select` command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            GpuProfile::Intel => "intel",
            GpuProfile::Nvidia => "nvidia",
            GpuProfile::OnDemand => "on-demand",
            GpuProfile::Unknown => "unknown",
        }
    }

    /// Human readable label for menus.
    pub fn label(&self) -> &'static str {
        match self {
            GpuProfile::Intel => "Intel",
            GpuProfile::Nvidia => "NVidia",
            GpuProfile::OnDemand => "NVidia On-Demand",
            GpuProfile::Unknown => "Unknown",
        }
    }

    /// Parse tool output leniently: anything unrecognised is `Unknown`.
    pub fn from_output(s: &str) -> Self {
        s.parse().unwrap_or(GpuProfile::Unknown)
    }

    pub fn is_switchable(&self) -> bool {
        !matches!(self, GpuProfile::Unknown)
    }
}

impl fmt::Display for GpuProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GpuProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "intel" => Ok(GpuProfile::Intel),
            "nvidia" => Ok(GpuProfile::Nvidia),
            "on-demand" => Ok(GpuProfile::OnDemand),
            "unknown" => Ok(GpuProfile::Unknown),
            other => Err(format!("Unknown GPU profile: {}", other)),
        }
    }
}

impl Default for GpuProfile {
    fn default() -> Self {
        GpuProfile::Unknown
    }
}

/// Logical role of an external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolRole {
    /// Polkit-style frontend used to run the switch with elevated rights.
    PrivilegeEscalation,
    /// `prime-select`: reads and writes the configured profile.
    QuerySelect,
    /// `nvidia-smi`: reports whether the discrete GPU is active.
    ManagementQuery,
    /// `nvidia-settings`: vendor settings application.
    SettingsLauncher,
}

impl ToolRole {
    pub const ALL: [ToolRole; 4] = [
        ToolRole::PrivilegeEscalation,
        ToolRole::QuerySelect,
        ToolRole::ManagementQuery,
        ToolRole::SettingsLauncher,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolRole::PrivilegeEscalation => "privilege-escalation",
            ToolRole::QuerySelect => "query-select",
            ToolRole::ManagementQuery => "management-query",
            ToolRole::SettingsLauncher => "settings-launcher",
        }
    }

    /// Executable names tried in order when resolving this role.
    pub fn candidates(&self) -> &'static [&'static str] {
        match self {
            ToolRole::PrivilegeEscalation => &["pkexec", "gksudo"],
            ToolRole::QuerySelect => &["prime-select"],
            ToolRole::ManagementQuery => &["nvidia-smi"],
            ToolRole::SettingsLauncher => &["nvidia-settings"],
        }
    }

    /// What stops working when this role is missing.
    pub fn disables(&self) -> &'static str {
        match self {
            ToolRole::PrivilegeEscalation => "switch disabled",
            ToolRole::QuerySelect => "query/switch disabled",
            ToolRole::ManagementQuery => "active gpu probe disabled",
            ToolRole::SettingsLauncher => "settings disabled",
        }
    }
}

impl fmt::Display for ToolRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Captured result of one subprocess run.
///
/// `status` is the exit code, or `-1` when the process could not be spawned
/// (or was killed by a signal); in the spawn case `stderr` carries the reason.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn new(status: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        ProcessOutput {
            status,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Result for a process that never started.
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        ProcessOutput {
            status: -1,
            stdout: String::new(),
            stderr: reason.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }

    pub fn spawned(&self) -> bool {
        self.status != -1
    }
}

/// Outcome of one switch attempt, handed to the completion callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchResult {
    pub profile: GpuProfile,
    pub succeeded: bool,
    pub raw_error: String,
}

/// Which branch `switch()` took. Callers are free to ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchRequest {
    /// The switch command was spawned; the callback will fire once.
    Started,
    /// Privilege escalation or query-select tool is missing.
    Unavailable,
    /// Target is not advertised by the query-select tool.
    Unsupported,
    /// Target already configured.
    AlreadyActive,
    /// Another switch is still running.
    Busy,
}
