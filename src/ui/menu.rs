//! Headless "Prime Select" menu.
//!
//! `MenuSync` mirrors what the panel submenu shows: one item per advertised
//! profile, a check mark on the configured one, and one of three status
//! messages (pending, restart needed, logging out). Clicks are delayed by
//! [`SWITCH_DELAY`] so the switch starts after the panel menu has closed.

use super::SessionControl;
use crate::config::AppSettings;
use crate::log_info;
use crate::models::{GpuProfile, SwitchRequest, SwitchResult, ToolRole};
use crate::prime::{GpuSwitch, SubscriptionId};
use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Delay between a menu click and the switch request.
pub const SWITCH_DELAY: Duration = Duration::from_millis(50);

/// One selectable profile in the menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItemState {
    pub profile: GpuProfile,
    pub label: &'static str,
    pub sensitive: bool,
    pub checked: bool,
}

/// Everything a renderer needs to draw the submenu.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MenuState {
    pub items: Vec<MenuItemState>,
    /// False when no profile is offered at all.
    pub reactive: bool,
    pub separator_visible: bool,
    pub pending_message: bool,
    pub restart_message: bool,
    pub logging_out_message: bool,
}

impl MenuState {
    pub fn item(&self, profile: GpuProfile) -> Option<&MenuItemState> {
        self.items.iter().find(|item| item.profile == profile)
    }

    pub fn checked(&self) -> Option<GpuProfile> {
        self.items.iter().find(|item| item.checked).map(|item| item.profile)
    }
}

/// Keeps a [`MenuState`] in sync with the controller.
///
/// Must be used from inside a `tokio::task::LocalSet`: click and logout
/// delays are local tasks.
pub struct MenuSync {
    controller: Rc<GpuSwitch>,
    settings: AppSettings,
    session: Rc<dyn SessionControl>,
    switches: BTreeSet<GpuProfile>,
    pending: Cell<bool>,
    logging_out: Cell<bool>,
    timer: RefCell<Option<JoinHandle<()>>>,
    state: RefCell<MenuState>,
    subscription: Cell<Option<SubscriptionId>>,
    this: Weak<MenuSync>,
}

impl MenuSync {
    pub fn new(
        controller: Rc<GpuSwitch>,
        settings: AppSettings,
        session: Rc<dyn SessionControl>,
    ) -> Rc<Self> {
        let switches = controller.switches();

        let menu = Rc::new_cyclic(|this: &Weak<MenuSync>| MenuSync {
            controller: Rc::clone(&controller),
            settings,
            session,
            switches,
            pending: Cell::new(false),
            logging_out: Cell::new(false),
            timer: RefCell::new(None),
            state: RefCell::new(MenuState::default()),
            subscription: Cell::new(None),
            this: this.clone(),
        });

        let weak = Rc::downgrade(&menu);
        let id = controller.on_profile_changed(move |_| {
            if let Some(menu) = weak.upgrade() {
                menu.refresh();
            }
        });
        menu.subscription.set(Some(id));

        if menu.switches.is_empty() {
            log::warn!("[Menu.Widget] can't find any prime switch, select disabled");
        }
        if !controller.tools().has(ToolRole::ManagementQuery) {
            log::info!("[Menu.Widget] can't find nvidia-smi command, active gpu probe disabled");
        }

        menu.refresh();
        menu
    }

    pub fn state(&self) -> MenuState {
        self.state.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.get()
    }

    pub fn is_logging_out(&self) -> bool {
        self.logging_out.get()
    }

    /// Recompute the menu from the controller. Runs one `prime-select query`.
    pub fn refresh(&self) {
        let query = self.controller.query();
        let pending = self.pending.get();
        let logging_out = self.logging_out.get();
        let restart =
            self.controller.tools().has(ToolRole::QuerySelect) && query != self.controller.baseline();
        let sensitive = !pending && !logging_out && self.controller.tools().can_switch();

        let items = self
            .switches
            .iter()
            .map(|profile| MenuItemState {
                profile: *profile,
                label: profile.label(),
                sensitive,
                checked: query == *profile,
            })
            .collect();

        *self.state.borrow_mut() = MenuState {
            items,
            reactive: !self.switches.is_empty(),
            separator_visible: pending || restart || logging_out,
            pending_message: pending && !logging_out,
            restart_message: restart && !pending && !logging_out,
            logging_out_message: logging_out,
        };
    }

    /// Handle a click on the item for `profile`.
    ///
    /// Returns false when the click was ignored: unknown, insensitive or
    /// checked item, or another delayed action already scheduled.
    pub fn activate(&self, profile: GpuProfile) -> bool {
        let (checked, sensitive) = match self.state.borrow().item(profile) {
            Some(item) => (item.checked, item.sensitive),
            None => {
                log::warn!("[Menu.Widget] unknown GPU switch {}", profile);
                return false;
            }
        };
        if checked || !sensitive {
            return false;
        }

        self.delay_execute(SWITCH_DELAY, move |menu| menu.switch_gpu(profile))
    }

    fn switch_gpu(&self, profile: GpuProfile) {
        self.pending.set(true);
        self.refresh();

        let weak = self.this.clone();
        let request = self.controller.switch(profile, move |result| {
            if let Some(menu) = weak.upgrade() {
                menu.on_switch_complete(result);
            }
        });

        if request != SwitchRequest::Started {
            log::info!("[Menu.Widget] switch to {} not started: {:?}", profile, request);
            self.pending.set(false);
            self.refresh();
        }
    }

    fn on_switch_complete(&self, result: SwitchResult) {
        let do_logout = result.succeeded
            && self.settings.auto_logout
            && self.controller.is_restart_needed();

        self.pending.set(false);
        if !do_logout {
            self.refresh();
            return;
        }

        log_info!("[Menu.Widget] logout on gpu switch enabled, logging out");
        self.logging_out.set(true);
        self.refresh();

        let session = Rc::clone(&self.session);
        self.delay_execute(self.settings.logout_delay(), move |_| session.request_logout());
    }

    /// Run `action` after `delay` on the local task set. Only one delayed
    /// action may be scheduled at a time. Returns false when nothing was
    /// scheduled.
    fn delay_execute<F>(&self, delay: Duration, action: F) -> bool
    where
        F: FnOnce(&MenuSync) + 'static,
    {
        if self.timer.borrow().is_some() {
            log::debug!("[Menu.Widget] delayed action already scheduled");
            return false;
        }

        let weak = self.this.clone();
        // spawn_local panics outside a LocalSet.
        let spawned = catch_unwind(AssertUnwindSafe(move || {
            tokio::task::spawn_local(async move {
                tokio::time::sleep(delay).await;
                if let Some(menu) = weak.upgrade() {
                    menu.timer.borrow_mut().take();
                    action(&menu);
                }
            })
        }));

        match spawned {
            Ok(handle) => {
                *self.timer.borrow_mut() = Some(handle);
                true
            }
            Err(_) => {
                log::warn!("[Menu.Widget] delayed action dropped: no tokio LocalSet on this thread");
                false
            }
        }
    }
}

impl Drop for MenuSync {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.borrow_mut().take() {
            handle.abort();
        }
        if let Some(id) = self.subscription.take() {
            self.controller.off(id);
        }
    }
}
