//! Menu model: item state, status messages, click delay and auto-logout.
//!
//! Runs on a paused tokio clock so the 50 ms click delay and the logout delay
//! elapse instantly and deterministically.

mod common;

use common::*;
use prime_switch::config::{AppSettings, SwitchConfig};
use prime_switch::ui::menu::SWITCH_DELAY;
use prime_switch::{
    GpuProfile, GpuSwitch, MenuSync, ProcessOutput, SessionControl, ToolRole, ToolSet,
};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::LocalSet;

#[derive(Default)]
struct FakeSession {
    logouts: Cell<usize>,
}

impl SessionControl for FakeSession {
    fn request_logout(&self) {
        self.logouts.set(self.logouts.get() + 1);
    }
}

struct Fixture {
    fake: Rc<FakeExecutor>,
    gpu: Rc<GpuSwitch>,
    session: Rc<FakeSession>,
    menu: Rc<MenuSync>,
}

fn fixture_with(current: GpuProfile, tools: ToolSet, settings: AppSettings) -> Fixture {
    let fake = FakeExecutor::prime(current);
    let gpu = GpuSwitch::new(tools, fake.clone(), SwitchConfig::default());
    let session = Rc::new(FakeSession::default());
    let menu = MenuSync::new(Rc::clone(&gpu), settings, session.clone());
    Fixture {
        fake,
        gpu,
        session,
        menu,
    }
}

fn fixture(current: GpuProfile, settings: AppSettings) -> Fixture {
    fixture_with(current, full_tools(), settings)
}

fn auto_logout() -> AppSettings {
    AppSettings {
        auto_logout: true,
        logout_delay_ms: 1000,
    }
}

async fn past_click_delay() {
    tokio::time::sleep(SWITCH_DELAY + Duration::from_millis(10)).await;
}

#[test]
fn test_initial_state_lists_offered_profiles() {
    let f = fixture(GpuProfile::Intel, AppSettings::default());
    let state = f.menu.state();

    assert!(state.reactive);
    assert_eq!(state.items.len(), 3);
    assert_eq!(state.checked(), Some(GpuProfile::Intel));
    assert!(state.items.iter().all(|item| item.sensitive));
    assert_eq!(state.item(GpuProfile::OnDemand).map(|i| i.label), Some("NVidia On-Demand"));
    assert!(!state.separator_visible);
    assert!(!state.pending_message && !state.restart_message && !state.logging_out_message);
}

#[test]
fn test_no_offered_profiles_disables_menu() {
    let fake = FakeExecutor::prime(GpuProfile::Intel);
    fake.script_sync(PRIME_SELECT, ProcessOutput::new(1, "", "Usage: prime-select query\n"));
    let gpu = GpuSwitch::new(full_tools(), fake.clone(), SwitchConfig::default());
    let menu = MenuSync::new(gpu, AppSettings::default(), Rc::new(FakeSession::default()));

    let state = menu.state();
    assert!(!state.reactive);
    assert!(state.items.is_empty());
}

#[test]
fn test_profile_change_event_refreshes_check_mark() {
    let f = fixture(GpuProfile::Intel, AppSettings::default());

    f.fake.set_query(GpuProfile::OnDemand);
    f.gpu.monitor_handle().notify_changed();

    let state = f.menu.state();
    assert_eq!(state.checked(), Some(GpuProfile::OnDemand));
    assert!(state.restart_message);
    assert!(state.separator_visible);
}

#[test]
fn test_refresh_queries_once() {
    let f = fixture(GpuProfile::Intel, AppSettings::default());
    f.fake.set_query(GpuProfile::Nvidia);

    let queries = || {
        f.fake
            .sync_calls
            .borrow()
            .iter()
            .filter(|cmd| **cmd == query_command())
            .count()
    };
    let before = queries();
    f.menu.refresh();

    assert_eq!(queries() - before, 1);
    assert!(f.menu.state().restart_message);
}

#[test]
fn test_click_outside_local_set_is_dropped() {
    let f = fixture(GpuProfile::Intel, AppSettings::default());

    assert!(!f.menu.activate(GpuProfile::Nvidia));
    assert!(!f.menu.is_pending());
    assert!(f.fake.async_calls.borrow().is_empty());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_click_switches_after_delay() {
    LocalSet::new()
        .run_until(async {
            let f = fixture(GpuProfile::Intel, AppSettings::default());

            assert!(!f.menu.activate(GpuProfile::Intel), "checked item ignores clicks");
            assert!(f.menu.activate(GpuProfile::Nvidia));
            assert!(!f.menu.activate(GpuProfile::OnDemand), "one delayed action at a time");
            assert!(f.fake.async_calls.borrow().is_empty());

            past_click_delay().await;

            assert_eq!(*f.fake.async_calls.borrow(), vec![switch_command(GpuProfile::Nvidia)]);
            assert!(f.menu.is_pending());
            let state = f.menu.state();
            assert!(state.pending_message);
            assert!(state.separator_visible);
            assert!(state.items.iter().all(|item| !item.sensitive));

            f.fake.complete_next();

            let state = f.menu.state();
            assert!(!f.menu.is_pending());
            assert_eq!(state.checked(), Some(GpuProfile::Nvidia));
            assert!(state.restart_message);
            assert!(!state.pending_message);
            assert!(state.items.iter().all(|item| item.sensitive));

            tokio::time::sleep(Duration::from_secs(5)).await;
            assert_eq!(f.session.logouts.get(), 0, "auto-logout is off by default");
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_auto_logout_after_successful_switch() {
    LocalSet::new()
        .run_until(async {
            let f = fixture(GpuProfile::Intel, auto_logout());

            assert!(f.menu.activate(GpuProfile::OnDemand));
            past_click_delay().await;
            f.fake.complete_next();

            let state = f.menu.state();
            assert!(f.menu.is_logging_out());
            assert!(state.logging_out_message);
            assert!(!state.restart_message);
            assert!(!state.pending_message);
            assert!(state.items.iter().all(|item| !item.sensitive));

            tokio::time::sleep(Duration::from_millis(500)).await;
            assert_eq!(f.session.logouts.get(), 0);

            tokio::time::sleep(Duration::from_millis(600)).await;
            assert_eq!(f.session.logouts.get(), 1);

            // Clicks are ignored while logging out.
            assert!(!f.menu.activate(GpuProfile::Intel));
            past_click_delay().await;
            assert_eq!(f.fake.async_calls.borrow().len(), 1);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_failed_switch_does_not_log_out() {
    LocalSet::new()
        .run_until(async {
            let f = fixture(GpuProfile::Intel, auto_logout());
            f.fake.script_async(
                &switch_command(GpuProfile::Nvidia),
                ProcessOutput::new(126, "", "Request dismissed\n"),
            );

            assert!(f.menu.activate(GpuProfile::Nvidia));
            past_click_delay().await;
            f.fake.complete_next();

            let state = f.menu.state();
            assert!(!f.menu.is_logging_out());
            assert_eq!(state.checked(), Some(GpuProfile::Intel));
            assert!(!state.restart_message);
            assert!(!state.separator_visible);

            tokio::time::sleep(Duration::from_secs(5)).await;
            assert_eq!(f.session.logouts.get(), 0);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_switch_back_to_baseline_does_not_log_out() {
    LocalSet::new()
        .run_until(async {
            let f = fixture(GpuProfile::Intel, auto_logout());

            f.fake.set_query(GpuProfile::Nvidia);
            f.gpu.monitor_handle().notify_changed();
            assert!(f.menu.state().restart_message);

            assert!(f.menu.activate(GpuProfile::Intel));
            past_click_delay().await;
            f.fake.complete_next();

            assert!(!f.menu.is_logging_out());
            assert!(!f.menu.state().restart_message);
            tokio::time::sleep(Duration::from_secs(5)).await;
            assert_eq!(f.session.logouts.get(), 0);
        })
        .await;
}

#[test]
fn test_missing_privilege_tool_makes_items_insensitive() {
    let tools = ToolSet::empty().with(ToolRole::QuerySelect, PRIME_SELECT);
    let f = fixture_with(GpuProfile::Intel, tools, AppSettings::default());

    let state = f.menu.state();
    assert!(state.reactive);
    assert!(state.items.iter().all(|item| !item.sensitive));
    assert!(!f.menu.activate(GpuProfile::Nvidia));
    assert!(f.fake.async_calls.borrow().is_empty());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_rejected_switch_clears_pending() {
    LocalSet::new()
        .run_until(async {
            let f = fixture(GpuProfile::Intel, AppSettings::default());

            // A switch started elsewhere keeps the controller busy.
            f.gpu.switch(GpuProfile::OnDemand, |_| {});
            assert!(f.gpu.is_busy());

            assert!(f.menu.activate(GpuProfile::Nvidia));
            past_click_delay().await;

            assert!(!f.menu.is_pending());
            assert!(!f.menu.state().pending_message);
            assert_eq!(f.fake.async_calls.borrow().len(), 1);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_dropping_menu_cancels_pending_click() {
    LocalSet::new()
        .run_until(async {
            let f = fixture(GpuProfile::Intel, AppSettings::default());
            let subscribers = f.gpu.bus().subscriber_count();

            assert!(f.menu.activate(GpuProfile::Nvidia));
            drop(f.menu);
            past_click_delay().await;

            assert!(f.fake.async_calls.borrow().is_empty());
            assert_eq!(f.gpu.bus().subscriber_count(), subscribers - 1);
        })
        .await;
}
