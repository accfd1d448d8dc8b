//! PRIME profile switch controller.
//!
//! `GpuSwitch` drives `prime-select` (through a polkit frontend for switches)
//! and keeps the small amount of state a panel indicator needs:
//!
//! - the restart baseline (profile seen when the session started)
//! - the cached list of profiles the tool offers
//! - the cached active-GPU probe from `nvidia-smi`
//! - an in-flight marker for the one switch that may run at a time
//!
//! Everything here runs on one thread. Async completions are delivered by the
//! executor on that same thread, so plain `Cell`/`OnceCell` state is enough.
//! Tool and process failures never escape: they become `GpuProfile::Unknown`,
//! an empty switch list, or `SwitchResult::succeeded == false`, plus a log line.

pub mod events;
pub mod monitor;

use crate::config::SwitchConfig;
use crate::error::SwitchError;
use crate::models::{GpuProfile, ProcessOutput, SwitchRequest, SwitchResult, ToolRole};
use crate::system::{ProcessExecutor, SystemExecutor, ToolSet, WhichResolver};
use crate::log_parsed;
use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use regex::Regex;
use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

pub use events::{EventBus, SubscriptionId, SwitchEvent};
pub use monitor::FileMonitor;

/// Pipe-delimited option list in `prime-select` usage output,
/// e.g. `Usage: /usr/bin/prime-select nvidia|intel|on-demand|query`.
static OPTIONS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z][A-Za-z-]*(?:\|[A-Za-z][A-Za-z-]*)+").expect("Invalid options regex")
});

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    Idle,
    SwitchInFlight,
}

/// Extract valid switch targets from `prime-select` usage text.
///
/// Takes the last pipe-delimited list (or, failing that, the last word),
/// drops the `query` subcommand and anything that is not a known profile.
pub fn parse_switches(usage: &str) -> BTreeSet<GpuProfile> {
    let usage = usage.trim();
    let list = OPTIONS_REGEX
        .find_iter(usage)
        .last()
        .map(|m| m.as_str())
        .or_else(|| usage.split_whitespace().last())
        .unwrap_or("");

    list.split('|')
        .map(str::trim)
        .filter(|item| !item.is_empty() && *item != "query")
        .filter_map(|item| item.parse::<GpuProfile>().ok())
        .filter(GpuProfile::is_switchable)
        .collect()
}

/// PRIME switch controller. Construct with [`GpuSwitch::new`] or
/// [`GpuSwitch::detect`]; it always lives behind an `Rc`.
pub struct GpuSwitch {
    tools: ToolSet,
    executor: Rc<dyn ProcessExecutor>,
    bus: Rc<EventBus>,
    monitor: FileMonitor,
    baseline: OnceCell<GpuProfile>,
    switches: OnceCell<BTreeSet<GpuProfile>>,
    gpu: OnceCell<GpuProfile>,
    state: Cell<SwitchState>,
    this: Weak<GpuSwitch>,
}

impl GpuSwitch {
    /// Create a controller from an already resolved tool set.
    ///
    /// The restart baseline is `config.baseline` when given, otherwise the
    /// result of a first `query()` made here. Either way it is fixed for the
    /// lifetime of this controller.
    pub fn new(tools: ToolSet, executor: Rc<dyn ProcessExecutor>, config: SwitchConfig) -> Rc<Self> {
        let bus = Rc::new(EventBus::new());

        let controller = Rc::new_cyclic(|this: &Weak<GpuSwitch>| GpuSwitch {
            tools,
            executor,
            bus: Rc::clone(&bus),
            monitor: FileMonitor::new(
                config.status_file.clone(),
                config.poll_interval,
                this.clone(),
                Rc::clone(&bus),
            ),
            baseline: OnceCell::new(),
            switches: OnceCell::new(),
            gpu: OnceCell::new(),
            state: Cell::new(SwitchState::Idle),
            this: this.clone(),
        });

        let baseline = match config.baseline {
            Some(profile) => {
                log::info!("[Prime.Switch] using {} as default prime option (configured)", profile);
                profile
            }
            None => {
                let profile = controller.query();
                log::info!("[Prime.Switch] detected {} as default prime option", profile);
                profile
            }
        };
        let _ = controller.baseline.set(baseline);

        controller
    }

    /// Resolve tools on PATH and run them with the system executor.
    pub fn detect(config: SwitchConfig) -> Rc<Self> {
        let tools = ToolSet::resolve(&WhichResolver);
        GpuSwitch::new(tools, Rc::new(SystemExecutor::new()), config)
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    /// Resolved command for a role.
    pub fn command(&self, role: ToolRole) -> Option<String> {
        self.tools.command(role)
    }

    /// Event bus carrying `profile-changed` notifications.
    pub fn bus(&self) -> Rc<EventBus> {
        Rc::clone(&self.bus)
    }

    pub fn state(&self) -> SwitchState {
        self.state.get()
    }

    pub fn is_busy(&self) -> bool {
        self.state.get() == SwitchState::SwitchInFlight
    }

    /// Profile observed (or configured) when this controller was created.
    pub fn baseline(&self) -> GpuProfile {
        self.baseline.get().copied().unwrap_or(GpuProfile::Unknown)
    }

    /// Currently configured profile from `prime-select query`.
    pub fn query(&self) -> GpuProfile {
        let Some(select) = self.tools.command(ToolRole::QuerySelect) else {
            return GpuProfile::Unknown;
        };

        let out = self.executor.run_sync(&format!("{} query", select));
        if !out.success() {
            log::debug!("[Prime.Switch] query failed with status {}: {}", out.status, out.stderr.trim());
            return GpuProfile::Unknown;
        }

        GpuProfile::from_output(out.stdout.trim())
    }

    /// Profiles `prime-select` accepts as switch targets.
    ///
    /// Cached after the first run that yields at least one profile.
    pub fn switches(&self) -> BTreeSet<GpuProfile> {
        if let Some(cached) = self.switches.get() {
            return cached.clone();
        }

        let Some(select) = self.tools.command(ToolRole::QuerySelect) else {
            return BTreeSet::new();
        };

        // Usage text goes to stdout or stderr depending on the distribution,
        // and the exit status is usually non-zero.
        let out = self.executor.run_sync(&select);
        if !out.spawned() {
            log::warn!("[Prime.Switch] can't list prime switches: {}", out.stderr.trim());
            return BTreeSet::new();
        }

        let usage = if out.stdout.trim().is_empty() { &out.stderr } else { &out.stdout };
        let parsed = parse_switches(usage);
        if parsed.is_empty() {
            log::warn!("[Prime.Switch] can't find any prime switch, select disabled");
            return parsed;
        }

        let _ = self.switches.set(parsed.clone());
        parsed
    }

    /// Active renderer from `nvidia-smi -L`: exit status 0 means the discrete
    /// GPU is in use. Cached, since it cannot change without a restart.
    pub fn gpu(&self) -> GpuProfile {
        *self.gpu.get_or_init(|| match self.tools.command(ToolRole::ManagementQuery) {
            Some(management) => {
                let out = self.executor.run_sync(&format!("{} -L", management));
                if out.success() {
                    GpuProfile::Nvidia
                } else {
                    GpuProfile::Intel
                }
            }
            None => GpuProfile::Unknown,
        })
    }

    /// Whether the configured profile differs from the session baseline.
    ///
    /// Spawns `prime-select query` on every call; cache per refresh.
    pub fn is_restart_needed(&self) -> bool {
        self.tools.has(ToolRole::QuerySelect) && self.query() != self.baseline()
    }

    /// Switch to `target`, calling `on_complete` once when the command exits.
    ///
    /// Nothing is spawned and `on_complete` is never called when the tools are
    /// missing, the target is not offered, the target is already configured,
    /// or another switch is still in flight. The returned [`SwitchRequest`]
    /// says which of those happened.
    ///
    /// When the executor cannot spawn (no runtime on this thread) the
    /// completion runs before this returns, with `succeeded == false`, and the
    /// controller is back to `Idle`.
    pub fn switch<F>(&self, target: GpuProfile, on_complete: F) -> SwitchRequest
    where
        F: FnOnce(SwitchResult) + 'static,
    {
        let (Some(sudo), Some(select)) = (
            self.tools.command(ToolRole::PrivilegeEscalation),
            self.tools.command(ToolRole::QuerySelect),
        ) else {
            return SwitchRequest::Unavailable;
        };

        if self.is_busy() {
            log::warn!("[Prime.Switch] switch to {} rejected, another switch is in flight", target);
            return SwitchRequest::Busy;
        }

        if !self.switches().contains(&target) {
            log::warn!("[Prime.Switch] {}", SwitchError::InvalidProfile(target));
            return SwitchRequest::Unsupported;
        }

        if self.query() == target {
            log::debug!("[Prime.Switch] {} already configured", target);
            return SwitchRequest::AlreadyActive;
        }

        let command = format!("{} {} {}", sudo, select, target);
        let completed_command = command.clone();
        let this = self.this.clone();

        self.state.set(SwitchState::SwitchInFlight);
        log_parsed!("[Prime.Switch] switching to {}", target);

        self.executor.run_async(
            &command,
            Box::new(move |out| {
                let result = SwitchResult {
                    profile: target,
                    succeeded: out.success(),
                    raw_error: out.stderr.trim().to_string(),
                };

                match this.upgrade() {
                    Some(controller) => {
                        controller.finish_switch(&completed_command, &result, out.status)
                    }
                    None => log::warn!("[Prime.Switch] switch to {} finished after teardown", target),
                }

                on_complete(result);
            }),
        );

        SwitchRequest::Started
    }

    fn finish_switch(&self, command: &str, result: &SwitchResult, status: i32) {
        self.state.set(SwitchState::Idle);

        if result.succeeded {
            log_parsed!("[Prime.Switch] switched to {}", result.profile);
            if self.is_restart_needed() {
                log_parsed!("[Prime.Switch] system restart required");
            }
        } else {
            let err = SwitchError::ProcessFailure {
                cmd: command.to_string(),
                status,
                stderr: result.raw_error.clone(),
            };
            log_parsed!("[Prime.Switch] not switched to {} ({})", result.profile, err);
        }
    }

    /// Launch the vendor settings application, fire and forget.
    pub fn settings(&self) -> bool {
        self.settings_with(|out| {
            if !out.success() {
                log::warn!(
                    "[Prime.Switch] settings launcher exited with status {}: {}",
                    out.status,
                    out.stderr.trim()
                );
            }
        })
    }

    /// Launch the vendor settings application and call `on_exit` once it
    /// exits (or fails to spawn). Returns false, without calling `on_exit`,
    /// when the launcher is not available.
    pub fn settings_with<F>(&self, on_exit: F) -> bool
    where
        F: FnOnce(ProcessOutput) + 'static,
    {
        let Some(settings) = self.tools.command(ToolRole::SettingsLauncher) else {
            log::debug!("[Prime.Switch] settings launcher not available");
            return false;
        };

        log::info!("[Prime.Switch] launching {}", settings);
        self.executor.run_async(&settings, Box::new(on_exit));
        true
    }

    /// Subscribe to `profile-changed`.
    pub fn on_profile_changed<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(GpuProfile) + 'static,
    {
        self.bus.on(move |event| match event {
            SwitchEvent::ProfileChanged(profile) => handler(*profile),
        })
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        self.bus.off(id)
    }

    /// Start watching the status file. Returns false when watching could not
    /// be established; the controller keeps working without it.
    pub fn monitor(&self) -> bool {
        self.monitor.start()
    }

    pub fn unmonitor(&self) {
        self.monitor.stop();
    }

    pub fn monitor_handle(&self) -> &FileMonitor {
        &self.monitor
    }
}

impl Drop for GpuSwitch {
    fn drop(&mut self) {
        self.monitor.stop();
    }
}

impl std::fmt::Debug for GpuSwitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuSwitch")
            .field("tools", &self.tools)
            .field("baseline", &self.baseline.get())
            .field("state", &self.state.get())
            .field("monitoring", &self.monitor.is_watching())
            .finish()
    }
}
