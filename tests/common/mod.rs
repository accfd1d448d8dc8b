//! Shared fixtures: a scripted executor and tool sets with fixed paths.

#![allow(dead_code)]

use prime_switch::system::OnComplete;
use prime_switch::{GpuProfile, ProcessExecutor, ProcessOutput, ToolRole, ToolSet};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

pub const PKEXEC: &str = "/usr/bin/pkexec";
pub const PRIME_SELECT: &str = "/usr/bin/prime-select";
pub const NVIDIA_SMI: &str = "/usr/bin/nvidia-smi";
pub const NVIDIA_SETTINGS: &str = "/usr/bin/nvidia-settings";

pub const USAGE: &str = "Usage: /usr/bin/prime-select nvidia|intel|on-demand|query\n";

pub fn full_tools() -> ToolSet {
    ToolSet::empty()
        .with(ToolRole::PrivilegeEscalation, PKEXEC)
        .with(ToolRole::QuerySelect, PRIME_SELECT)
        .with(ToolRole::ManagementQuery, NVIDIA_SMI)
        .with(ToolRole::SettingsLauncher, NVIDIA_SETTINGS)
}

pub fn query_command() -> String {
    format!("{} query", PRIME_SELECT)
}

pub fn switch_command(target: GpuProfile) -> String {
    format!("{} {} {}", PKEXEC, PRIME_SELECT, target)
}

/// Executor answering from a script.
///
/// Sync commands return their scripted output (unscripted ones fail to
/// spawn). Async commands are queued until the test calls `complete_next`,
/// which mimics a subprocess exiting later on the scheduling thread. A
/// successful scripted switch updates the scripted `query` answer, like the
/// real `prime-select` would.
#[derive(Default)]
pub struct FakeExecutor {
    sync_script: RefCell<HashMap<String, ProcessOutput>>,
    async_script: RefCell<HashMap<String, ProcessOutput>>,
    pending: RefCell<VecDeque<(String, OnComplete)>>,
    pub sync_calls: RefCell<Vec<String>>,
    pub async_calls: RefCell<Vec<String>>,
    complete_immediately: Cell<bool>,
}

impl FakeExecutor {
    pub fn new() -> Rc<Self> {
        Rc::new(FakeExecutor::default())
    }

    /// Executor scripted like a machine offering all three profiles.
    pub fn prime(current: GpuProfile) -> Rc<Self> {
        let fake = FakeExecutor::new();
        fake.script_sync(PRIME_SELECT, ProcessOutput::new(1, "", USAGE));
        fake.set_query(current);
        fake
    }

    pub fn script_sync(&self, command: &str, output: ProcessOutput) {
        self.sync_script.borrow_mut().insert(command.to_string(), output);
    }

    pub fn script_async(&self, command: &str, output: ProcessOutput) {
        self.async_script.borrow_mut().insert(command.to_string(), output);
    }

    pub fn set_query(&self, profile: GpuProfile) {
        self.script_sync(&query_command(), ProcessOutput::new(0, format!("{}\n", profile), ""));
    }

    /// Deliver async completions inside `run_async` instead of queueing.
    pub fn complete_immediately(&self) {
        self.complete_immediately.set(true);
    }

    pub fn call_count(&self) -> usize {
        self.sync_calls.borrow().len() + self.async_calls.borrow().len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Finish the oldest queued async command. Returns false if none.
    pub fn complete_next(&self) -> bool {
        let next = self.pending.borrow_mut().pop_front();
        match next {
            Some((command, on_complete)) => {
                let output = self.async_output(&command);
                on_complete(output);
                true
            }
            None => false,
        }
    }

    fn async_output(&self, command: &str) -> ProcessOutput {
        let output = self
            .async_script
            .borrow()
            .get(command)
            .cloned()
            .unwrap_or_else(|| ProcessOutput::new(0, "", ""));

        let switch_prefix = format!("{} {} ", PKEXEC, PRIME_SELECT);
        if output.success() {
            if let Some(target) = command.strip_prefix(&switch_prefix) {
                if let Ok(profile) = target.parse::<GpuProfile>() {
                    self.set_query(profile);
                }
            }
        }
        output
    }
}

impl ProcessExecutor for FakeExecutor {
    fn run_sync(&self, command_line: &str) -> ProcessOutput {
        self.sync_calls.borrow_mut().push(command_line.to_string());
        self.sync_script
            .borrow()
            .get(command_line)
            .cloned()
            .unwrap_or_else(|| ProcessOutput::spawn_failed(format!("not scripted: {}", command_line)))
    }

    fn run_async(&self, command_line: &str, on_complete: OnComplete) {
        self.async_calls.borrow_mut().push(command_line.to_string());
        if self.complete_immediately.get() {
            let output = self.async_output(command_line);
            on_complete(output);
        } else {
            self.pending
                .borrow_mut()
                .push_back((command_line.to_string(), on_complete));
        }
    }
}

/// Collects completion results for assertions.
pub fn result_sink() -> (
    Rc<RefCell<Vec<prime_switch::SwitchResult>>>,
    impl FnOnce(prime_switch::SwitchResult) + 'static,
) {
    let results = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&results);
    (results, move |result| sink.borrow_mut().push(result))
}
