//! UI Module - headless menu model and session integration
//!
//! Widget rendering belongs to the host shell. This module provides what the
//! host needs to draw a "Prime Select" submenu: the derived [`MenuState`],
//! click handling with the switch/logout delays, and a single "request logout"
//! call into the session manager.

pub mod menu;

use crate::system::{CommandResolver, ProcessExecutor};
use std::rc::Rc;

pub use menu::{MenuItemState, MenuState, MenuSync};

/// Trait for session-manager operations
pub trait SessionControl {
    /// Ask the session manager to log the user out without a confirmation dialog.
    fn request_logout(&self);
}

/// Logout through `gnome-session-quit`.
pub struct GnomeSession {
    command: Option<String>,
    executor: Rc<dyn ProcessExecutor>,
}

impl GnomeSession {
    pub fn new(resolver: &dyn CommandResolver, executor: Rc<dyn ProcessExecutor>) -> Self {
        let command = resolver
            .resolve("gnome-session-quit")
            .map(|path| path.to_string_lossy().into_owned());

        if command.is_none() {
            log::warn!("[Menu.Session] can't find gnome-session-quit command, logout disabled");
        }

        GnomeSession { command, executor }
    }

    pub fn is_available(&self) -> bool {
        self.command.is_some()
    }
}

impl SessionControl for GnomeSession {
    fn request_logout(&self) {
        let Some(command) = &self.command else {
            log::warn!("[Menu.Session] logout requested but no session command available");
            return;
        };

        log::info!("[Menu.Session] gnome session logout");
        self.executor.run_async(
            &format!("{} --logout --no-prompt", command),
            Box::new(|out| {
                if !out.success() {
                    log::error!(
                        "[Menu.Session] logout request failed with status {}: {}",
                        out.status,
                        out.stderr.trim()
                    );
                }
            }),
        );
    }
}
