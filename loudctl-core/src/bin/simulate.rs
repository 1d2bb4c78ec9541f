//! Offline controller simulation.
//!
//! Drives the real control loop with scripted white noise, a manual clock and
//! an in-memory actuator, then prints a JSON summary per scenario.

use std::path::PathBuf;
use std::sync::{atomic::AtomicBool, Arc};

use loudctl_core::{
    actuator::{ActuatorHandle, SoftwareActuator},
    audio::synthetic::{Segment, SyntheticCapture},
    engine::{
        control_loop::{self, DiagnosticsSnapshot, LoopContext, LoopDiagnostics},
        schedule::{FixedTicks, ManualClock},
    },
    ipc::{events::EngineStatus, slot::LatestStatus},
    ControlConfig, LoudnessEstimator, PolicyKind, TickStatus,
};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;

const SCENARIOS: &[&str] = &["quiet", "loud", "steps", "ramp", "bursts"];

fn main() {
    if let Err(e) = run() {
        eprintln!("simulation failed: {e}");
        std::process::exit(1);
    }
}

#[derive(Debug)]
struct Args {
    scenarios: Vec<String>,
    policy: PolicyKind,
    initial_level: f32,
    seed: u64,
    trace: bool,
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct TracePoint {
    second: f64,
    noise: f32,
    low: f32,
    high: f32,
    level: f32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioSummary {
    scenario: String,
    policy: &'static str,
    simulated_secs: f64,
    initial_level: f32,
    final_level: f32,
    min_level: f32,
    max_level: f32,
    final_low_threshold: f32,
    final_high_threshold: f32,
    mean_noise: f32,
    diagnostics: DiagnosticsSnapshot,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    trace: Vec<TracePoint>,
}

fn parse_args() -> Result<Args, String> {
    let mut scenarios = Vec::new();
    let mut policy = PolicyKind::Hysteresis;
    let mut initial_level = 0.5f32;
    let mut seed = 42u64;
    let mut trace = false;
    let mut output = None;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--scenario" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --scenario".into());
                };
                if v != "all" && !SCENARIOS.contains(&v.as_str()) {
                    return Err(format!(
                        "unknown scenario '{v}', expected one of {} or all",
                        SCENARIOS.join(", ")
                    ));
                }
                scenarios.push(v);
            }
            "--policy" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --policy".into());
                };
                policy = match v.as_str() {
                    "hysteresis" => PolicyKind::Hysteresis,
                    "proportional" => PolicyKind::proportional_default(),
                    other => return Err(format!("unknown policy: {other}")),
                };
            }
            "--initial-level" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --initial-level".into());
                };
                initial_level = v
                    .parse::<f32>()
                    .map_err(|_| "invalid value for --initial-level".to_string())?
                    .clamp(0.0, 1.0);
            }
            "--seed" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --seed".into());
                };
                seed = v
                    .parse::<u64>()
                    .map_err(|_| "invalid value for --seed".to_string())?;
            }
            "--trace" => trace = true,
            "--output" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --output".into());
                };
                output = Some(PathBuf::from(v));
            }
            "--help" | "-h" => {
                println!(
                    "Usage: loudctl-sim [--scenario <{}|all>]... [--policy hysteresis|proportional] \\
  [--initial-level <0..1>] [--seed <n>] [--trace] [--output <file.json>]",
                    SCENARIOS.join("|")
                );
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    if scenarios.is_empty() || scenarios.iter().any(|s| s == "all") {
        scenarios = SCENARIOS.iter().map(|s| s.to_string()).collect();
    }
    Ok(Args {
        scenarios,
        policy,
        initial_level,
        seed,
        trace,
        output,
    })
}

/// Scripts are written in seconds of simulated time; one block per tick.
fn script_for(name: &str, ticks_per_sec: usize) -> Vec<Segment> {
    let secs = |s: usize, loudness: f32| Segment::new(s * ticks_per_sec, loudness);
    match name {
        "quiet" => vec![secs(60, 0.0)],
        "loud" => vec![secs(60, 90.0)],
        "steps" => vec![secs(45, 40.0), secs(45, 80.0), secs(45, 20.0)],
        "ramp" => (0..9).map(|i| secs(10, 10.0 + 10.0 * i as f32)).collect(),
        "bursts" => (0..6)
            .flat_map(|_| [secs(12, 35.0), secs(3, 85.0)])
            .collect(),
        _ => Vec::new(),
    }
}

fn simulate(
    name: &str,
    config: &ControlConfig,
    initial_level: f32,
    seed: u64,
    trace: bool,
) -> ScenarioSummary {
    let tick_ms = config.tick_interval.as_millis().max(1) as usize;
    let ticks_per_sec = (1_000 / tick_ms).max(1);
    let capture = SyntheticCapture::new(
        script_for(name, ticks_per_sec),
        LoudnessEstimator::from_config(config),
        config.block_size,
        config.sample_rate,
        seed,
    );
    let total = capture.total_blocks();

    let clock = ManualClock::new();
    let software = SoftwareActuator::new(initial_level);
    let (tick_tx, mut tick_rx) = broadcast::channel(total.max(1));
    let (status_tx, _) = broadcast::channel(4);
    let diagnostics = Arc::new(LoopDiagnostics::default());

    let control = control_loop::run(LoopContext {
        config: config.clone(),
        source: Box::new(capture),
        actuator: ActuatorHandle::new(software.clone()),
        ticker: Box::new(FixedTicks::new(total).advancing(clock.clone(), config.tick_interval)),
        clock: Box::new(clock.clone()),
        running: Arc::new(AtomicBool::new(true)),
        tick_tx,
        status_tx,
        status: Arc::new(Mutex::new(EngineStatus::Running)),
        latest: LatestStatus::new(),
        diagnostics: Arc::clone(&diagnostics),
    });

    let mut statuses: Vec<TickStatus> = Vec::with_capacity(total);
    while let Ok(status) = tick_rx.try_recv() {
        statuses.push(status);
    }

    let levels = statuses.iter().map(|s| s.applied_level);
    let min_level = levels.clone().fold(initial_level, f32::min);
    let max_level = levels.fold(initial_level, f32::max);
    let mean_noise = if statuses.is_empty() {
        0.0
    } else {
        statuses.iter().map(|s| s.noise).sum::<f32>() / statuses.len() as f32
    };
    let trace = if trace {
        statuses
            .iter()
            .filter(|s| s.seq as usize % ticks_per_sec == ticks_per_sec - 1)
            .map(|s| TracePoint {
                second: s.timestamp_ms as f64 / 1_000.0,
                noise: s.noise,
                low: s.low_threshold,
                high: s.high_threshold,
                level: s.applied_level,
            })
            .collect()
    } else {
        Vec::new()
    };
    let thresholds = control.thresholds();

    ScenarioSummary {
        scenario: name.to_string(),
        policy: control.policy_name(),
        simulated_secs: clock.elapsed().as_secs_f64(),
        initial_level,
        final_level: software.level(),
        min_level,
        max_level,
        final_low_threshold: thresholds.low,
        final_high_threshold: thresholds.high,
        mean_noise,
        diagnostics: diagnostics.snapshot(),
        trace,
    }
}

fn run() -> Result<(), String> {
    let args = parse_args()?;
    let config = ControlConfig {
        policy: args.policy,
        ..ControlConfig::default()
    };
    config.validate().map_err(|e| e.to_string())?;

    let summaries = args
        .scenarios
        .iter()
        .map(|name| simulate(name, &config, args.initial_level, args.seed, args.trace))
        .collect::<Vec<_>>();

    for s in &summaries {
        eprintln!(
            "{:<8} {:<12} level {:.3} → {:.3} (range {:.3}..{:.3}) thresholds {:.1}/{:.1}",
            s.scenario,
            s.policy,
            s.initial_level,
            s.final_level,
            s.min_level,
            s.max_level,
            s.final_low_threshold,
            s.final_high_threshold,
        );
    }

    let json = serde_json::to_string_pretty(&summaries).map_err(|e| e.to_string())?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, json).map_err(|e| format!("{}: {e}", path.display()))?;
            eprintln!("summary written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
