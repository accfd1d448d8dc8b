//! Status file watcher.
//!
//! `prime-select` rewrites `/etc/prime-discrete` whenever the profile changes,
//! including changes made outside this process. The monitor polls the file's
//! presence, size and modification time on the local task set and, on any
//! change, re-queries the controller and emits `profile-changed`.

use super::events::{EventBus, SwitchEvent};
use super::GpuSwitch;
use crate::error::SwitchError;
use crate::log_info;
use std::cell::RefCell;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;

/// Observable file state. `None` means the file does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

fn stamp_from(result: std::io::Result<std::fs::Metadata>, path: &Path) -> Option<Option<FileStamp>> {
    match result {
        Ok(metadata) => Some(Some(FileStamp {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        })),
        Err(err) if err.kind() == ErrorKind::NotFound => Some(None),
        Err(err) => {
            log::warn!("[Prime.Monitor] metadata probe failed for {}: {}", path.display(), err);
            // Keep the last known state; a transient error is not a change.
            None
        }
    }
}

/// Re-query the controller and publish the result.
fn publish_change(controller: &Weak<GpuSwitch>, bus: &EventBus) {
    let Some(controller) = controller.upgrade() else {
        log::debug!("[Prime.Monitor] change ignored, controller is gone");
        return;
    };

    let profile = controller.query();
    log_info!("[Prime.Monitor] status file changed, profile is {}", profile);
    bus.emit(SwitchEvent::ProfileChanged(profile));
}

/// Watches the status file and republishes profile changes.
///
/// Holds only a weak reference to its controller, used to re-query; it never
/// mutates controller state.
pub struct FileMonitor {
    path: PathBuf,
    interval: Duration,
    controller: Weak<GpuSwitch>,
    bus: Rc<EventBus>,
    task: RefCell<Option<JoinHandle<()>>>,
}

impl FileMonitor {
    pub fn new(path: PathBuf, interval: Duration, controller: Weak<GpuSwitch>, bus: Rc<EventBus>) -> Self {
        FileMonitor {
            path,
            interval,
            controller,
            bus,
            task: RefCell::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_watching(&self) -> bool {
        self.task.borrow().is_some()
    }

    /// Begin watching. A second call while watching does nothing.
    ///
    /// Must be called from inside a `tokio::task::LocalSet`. Without a tokio
    /// runtime the watch cannot be established: this is logged and `false` is
    /// returned, and the rest of the controller keeps working.
    pub fn start(&self) -> bool {
        if self.is_watching() {
            return true;
        }

        if tokio::runtime::Handle::try_current().is_err() {
            let err = SwitchError::MonitorFailure("no tokio runtime on this thread".to_string());
            log::warn!("[Prime.Monitor] {}", err.user_message());
            return false;
        }

        let path = self.path.clone();
        let interval = self.interval;
        let controller = self.controller.clone();
        let bus = Rc::clone(&self.bus);
        let mut last = stamp_from(std::fs::metadata(&path), &path).unwrap_or(None);

        let handle = tokio::task::spawn_local(async move {
            loop {
                tokio::time::sleep(interval).await;

                let Some(current) = stamp_from(tokio::fs::metadata(&path).await, &path) else {
                    continue;
                };
                if current != last {
                    last = current;
                    publish_change(&controller, &bus);
                }
            }
        });

        log::debug!("[Prime.Monitor] watching {} every {:?}", self.path.display(), self.interval);
        *self.task.borrow_mut() = Some(handle);
        true
    }

    /// Stop watching. Safe to call when not watching.
    pub fn stop(&self) {
        if let Some(handle) = self.task.borrow_mut().take() {
            handle.abort();
            log::debug!("[Prime.Monitor] stopped watching {}", self.path.display());
        }
    }

    /// Handle one change event as if the watch had fired.
    pub fn notify_changed(&self) {
        publish_change(&self.controller, &self.bus);
    }
}

impl Drop for FileMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_missing_file_is_none() {
        let path = Path::new("/nonexistent/prime-switch/prime-discrete");
        assert_eq!(stamp_from(std::fs::metadata(path), path), Some(None));
    }

    #[test]
    fn test_stamp_tracks_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prime-discrete");
        std::fs::write(&path, "on\n").unwrap();
        let first = stamp_from(std::fs::metadata(&path), &path).unwrap();
        std::fs::write(&path, "off\n").unwrap();
        let second = stamp_from(std::fs::metadata(&path), &path).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_start_without_runtime_degrades() {
        let monitor = FileMonitor::new(
            PathBuf::from("/etc/prime-discrete"),
            Duration::from_millis(10),
            Weak::new(),
            Rc::new(EventBus::new()),
        );
        assert!(!monitor.start());
        assert!(!monitor.is_watching());
        monitor.stop();
    }

    #[test]
    fn test_notify_without_controller_emits_nothing() {
        let bus = Rc::new(EventBus::new());
        let hits = Rc::new(std::cell::Cell::new(0));
        let h = Rc::clone(&hits);
        bus.on(move |_| h.set(h.get() + 1));

        let monitor = FileMonitor::new(
            PathBuf::from("/etc/prime-discrete"),
            Duration::from_millis(10),
            Weak::new(),
            Rc::clone(&bus),
        );
        monitor.notify_changed();
        assert_eq!(hits.get(), 0);
    }
}
