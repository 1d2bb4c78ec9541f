//! loudctl: keeps the output volume comfortable relative to the room noise.
//!
//! Wires the settings file and CLI flags into a `ControlEngine`, renders
//! tick statuses to the terminal and shuts down cleanly on Ctrl+C.

mod cli;
mod console;
mod settings;

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use loudctl_core::{
    list_input_devices, ActuatorHandle, ControlEngine, EngineStatus, PactlActuator,
    SoftwareActuator, TickStatus,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::cli::Cli;
use crate::console::{format_status_line, RollingMeter};
use crate::settings::{default_settings_path, load_settings, save_settings, AppSettings};

/// Starting level of the in-process actuator used by `--dry-run`.
const DRY_RUN_INITIAL_LEVEL: f32 = 0.5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so the status line on stdout stays readable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loudctl=info,loudctl_core=info".into()),
        )
        .init();

    let cli = Cli::parse();

    if cli.list_devices {
        print_devices();
        return Ok(());
    }

    let settings_path = cli.settings.clone().unwrap_or_else(default_settings_path);
    let mut app_settings = load_settings(&settings_path);
    cli.apply_to(&mut app_settings);
    info!(
        settings_path = ?settings_path,
        actuator = %app_settings.actuator,
        policy = %app_settings.policy,
        device = ?app_settings.preferred_input_device,
        "settings loaded"
    );

    if cli.write_settings {
        save_settings(&settings_path, &app_settings)
            .with_context(|| format!("failed to write {}", settings_path.display()))?;
        info!(settings_path = ?settings_path, "settings saved");
    }

    let config = app_settings.to_control_config();
    let actuator = build_actuator(&app_settings);
    let engine = Arc::new(ControlEngine::new(config, actuator).context("invalid configuration")?);

    let mut ticks = engine.subscribe_ticks();
    let mut status_events = engine.subscribe_status();
    engine
        .start_with_device(app_settings.preferred_input_device.clone())
        .context("failed to start volume control")?;

    let mut meter = cli
        .meter
        .then(|| RollingMeter::new(app_settings.meter_width));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    warn!("failed to listen for Ctrl+C: {e}");
                }
                break;
            }
            recv = ticks.recv() => match recv {
                Ok(status) => render(&status, meter.as_mut()),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "console fell behind"),
                Err(RecvError::Closed) => break,
            },
            event = status_events.recv() => {
                if let Ok(event) = event {
                    if matches!(event.status, EngineStatus::Stopped | EngineStatus::Error) {
                        warn!(status = ?event.status, detail = ?event.detail, "control loop ended");
                        break;
                    }
                }
            }
        }
    }

    if engine.is_running() {
        engine.stop()?;
    }
    engine.join().await;

    let diag = engine.diagnostics_snapshot();
    info!(
        ticks = diag.ticks,
        adjustments = diag.adjustments,
        recalibrations = diag.recalibrations,
        capture_errors = diag.capture_errors,
        actuator_errors = diag.actuator_errors,
        "session summary"
    );
    println!("\nStopped");
    Ok(())
}

fn build_actuator(settings: &AppSettings) -> ActuatorHandle {
    match settings.actuator.as_str() {
        "software" => {
            info!(initial_level = DRY_RUN_INITIAL_LEVEL, "dry run: system volume will not change");
            ActuatorHandle::new(SoftwareActuator::new(DRY_RUN_INITIAL_LEVEL))
        }
        _ => ActuatorHandle::new(PactlActuator::new(settings.pactl_sink.clone())),
    }
}

fn render(status: &TickStatus, meter: Option<&mut RollingMeter>) {
    let mut out = std::io::stdout().lock();
    let written = match meter {
        Some(meter) => {
            meter.push(status);
            // Home the cursor and clear, then redraw the whole meter.
            write!(
                out,
                "\x1b[H\x1b[2Jloudctl  {}\n{}",
                chrono::Local::now().format("%H:%M:%S"),
                meter.render()
            )
        }
        None => write!(out, "\r{}  ", format_status_line(status)),
    };
    if written.and_then(|_| out.flush()).is_err() {
        debug!("stdout closed, skipping status output");
    }
}

fn print_devices() {
    let devices = list_input_devices();
    if devices.is_empty() {
        println!("No input devices found.");
        return;
    }
    println!("Input devices (best candidate first):");
    for device in devices {
        let mut tags = Vec::new();
        if device.is_recommended {
            tags.push("recommended");
        }
        if device.is_default {
            tags.push("default");
        }
        if device.is_loopback_like {
            tags.push("loopback: hears the speakers, not the room");
        }
        if tags.is_empty() {
            println!("  {}", device.name);
        } else {
            println!("  {} [{}]", device.name, tags.join(", "));
        }
    }
}
