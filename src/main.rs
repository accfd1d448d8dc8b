use std::rc::Rc;

use anyhow::{bail, Context};
use tokio::sync::oneshot;
use tokio::task::LocalSet;

use prime_switch::config::{export_baseline, SettingsManager, SwitchConfig};
use prime_switch::log_collector::get_global_log_path;
use prime_switch::{
    GnomeSession, GpuProfile, GpuSwitch, LogCollector, MenuState, MenuSync, SwitchRequest,
    SystemExecutor, ToolRole, WhichResolver,
};

const USAGE: &str = "\
Usage: prime_switch <command>

Commands:
  query              print the configured profile
  gpu                print the active GPU (nvidia-smi probe)
  list               print the profiles prime-select offers
  status             print profile, baseline and restart state
  switch <profile>   switch to intel, nvidia or on-demand
  settings           run nvidia-settings until it exits
  watch              follow profile changes until interrupted";

/// Debug-level file logging when set.
const DEBUG_ENV: &str = "PRIME_SWITCH_DEBUG";

fn init_logging() {
    let level = if std::env::var_os(DEBUG_ENV).is_some() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let installed = get_global_log_path()
        .and_then(|path| LogCollector::new(path, level))
        .and_then(|collector| collector.install());

    if let Err(e) = installed {
        eprintln!("[prime-switch] WARNING: file logging disabled: {}", e);
    }
}

fn print_menu(state: &MenuState) {
    for item in &state.items {
        println!(
            "  [{}] {}{}",
            if item.checked { "x" } else { " " },
            item.label,
            if item.sensitive { "" } else { " (disabled)" }
        );
    }
    if state.pending_message {
        println!("  Please wait for the operation to complete");
    }
    if state.restart_message {
        println!("  Please log out and log back in to apply the changes");
    }
    if state.logging_out_message {
        println!("  Logging out...");
    }
}

async fn run(args: Vec<String>) -> anyhow::Result<i32> {
    let command = args.first().map(String::as_str).unwrap_or("status");

    let controller = GpuSwitch::detect(SwitchConfig::from_env());
    export_baseline(controller.baseline());

    match command {
        "query" => println!("{}", controller.query()),
        "gpu" => println!("{}", controller.gpu()),
        "list" => {
            for profile in controller.switches() {
                println!("{}", profile);
            }
        }
        "status" => {
            println!("configured: {}", controller.query());
            println!("baseline:   {}", controller.baseline());
            println!("active gpu: {}", controller.gpu());
            println!(
                "restart:    {}",
                if controller.is_restart_needed() { "needed" } else { "not needed" }
            );
            for role in controller.tools().missing() {
                println!("missing:    {}", role);
            }
        }
        "switch" => {
            let Some(target) = args.get(1) else {
                bail!("switch needs a profile\n\n{}", USAGE);
            };
            let target: GpuProfile = target
                .parse()
                .map_err(anyhow::Error::msg)
                .context("invalid profile")?;

            let (tx, rx) = oneshot::channel();
            match controller.switch(target, move |result| {
                let _ = tx.send(result);
            }) {
                SwitchRequest::Started => {}
                SwitchRequest::AlreadyActive => {
                    println!("already using {}", target);
                    return Ok(0);
                }
                SwitchRequest::Unavailable => {
                    let missing: Vec<String> = [ToolRole::PrivilegeEscalation, ToolRole::QuerySelect]
                        .into_iter()
                        .filter(|role| !controller.tools().has(*role))
                        .map(|role| role.to_string())
                        .collect();
                    eprintln!("switch unavailable, missing: {}", missing.join(", "));
                    return Ok(2);
                }
                other => {
                    eprintln!("switch to {} not started: {:?}", target, other);
                    return Ok(2);
                }
            }

            let result = rx.await.context("switch completion was dropped")?;
            if !result.succeeded {
                eprintln!("failed to switch to {}: {}", target, result.raw_error);
                return Ok(1);
            }
            println!("switched to {}", target);
            if controller.is_restart_needed() {
                println!("log out and log back in to apply the changes");
            }
        }
        "settings" => {
            let (tx, rx) = oneshot::channel();
            if !controller.settings_with(move |out| {
                let _ = tx.send(out);
            }) {
                eprintln!("nvidia-settings not found");
                return Ok(2);
            }

            let out = rx.await.context("settings launcher completion was dropped")?;
            if !out.success() {
                eprintln!("nvidia-settings exited with status {}: {}", out.status, out.stderr.trim());
                return Ok(1);
            }
        }
        "watch" => {
            let session = Rc::new(GnomeSession::new(&WhichResolver, Rc::new(SystemExecutor::new())));
            let menu = MenuSync::new(Rc::clone(&controller), SettingsManager::load(), session);

            let printer = Rc::clone(&menu);
            let id = controller.on_profile_changed(move |profile| {
                println!("profile-changed: {}", profile);
                print_menu(&printer.state());
            });

            if !controller.monitor() {
                bail!("could not watch the status file");
            }
            print_menu(&menu.state());

            tokio::signal::ctrl_c().await.context("failed to wait for Ctrl-C")?;
            controller.unmonitor();
            controller.off(id);
        }
        "help" | "-h" | "--help" => println!("{}", USAGE),
        other => bail!("unknown command '{}'\n\n{}", other, USAGE),
    }

    Ok(0)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let local = LocalSet::new();
    let code = local.run_until(run(args)).await?;

    log::logger().flush();
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
