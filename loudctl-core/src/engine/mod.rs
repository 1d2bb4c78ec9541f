//! `ControlEngine`: top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! ControlEngine::new()          → config validated, status = Idle
//!     └─► start()               → actuator probed, capture open, loop spawned, status = Running
//!         └─► stop()            → running=false; loop exits at the next tick boundary
//!             └─► join().await  → stream released, status = Stopped
//! ```
//!
//! `start()`/`stop()` return an error when called in the wrong state rather
//! than panicking. A stopped engine may be started again once its previous
//! loop has exited; `join()` waits for that.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS (COM / CoreAudio thread affinity).
//! The capture source is therefore built *inside* the `spawn_blocking` closure
//! so it never crosses a thread boundary. A sync oneshot channel carries any
//! open-device error back to the `start()` caller.

pub mod control_loop;
pub mod schedule;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    actuator::ActuatorHandle,
    audio::source::{CaptureSource, DeviceCapture},
    config::ControlConfig,
    error::{LoudctlError, Result},
    ipc::{
        events::{EngineStatus, EngineStatusEvent, TickStatus},
        slot::LatestStatus,
    },
};

use control_loop::{DiagnosticsSnapshot, LoopContext, LoopDiagnostics};
use schedule::{IntervalTicker, SystemClock};

/// Tick statuses buffered for slow subscribers (~25 s at the default rate).
const TICK_BROADCAST_CAP: usize = 256;
const STATUS_BROADCAST_CAP: usize = 16;

/// The top-level engine handle.
///
/// `ControlEngine` is `Send + Sync`; all fields use interior mutability.
/// Wrap in `Arc<ControlEngine>` to share with event-forwarding tasks.
pub struct ControlEngine {
    config: ControlConfig,
    actuator: ActuatorHandle,
    /// `true` while the control loop is active.
    running: Arc<AtomicBool>,
    status: Arc<Mutex<EngineStatus>>,
    tick_tx: broadcast::Sender<TickStatus>,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    latest: LatestStatus,
    diagnostics: Arc<LoopDiagnostics>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ControlEngine {
    /// # Errors
    /// `LoudctlError::InvalidConfig` when `config` fails validation.
    pub fn new(config: ControlConfig, actuator: ActuatorHandle) -> Result<Self> {
        config.validate()?;
        let (tick_tx, _) = broadcast::channel(TICK_BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(STATUS_BROADCAST_CAP);
        Ok(Self {
            config,
            actuator,
            running: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(EngineStatus::Idle)),
            tick_tx,
            status_tx,
            latest: LatestStatus::new(),
            diagnostics: Arc::new(LoopDiagnostics::default()),
            worker: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Start on the default input device.
    pub fn start(&self) -> Result<()> {
        self.start_with_device(None)
    }

    /// Start on a preferred input device; `None` uses default selection.
    ///
    /// Blocks until the device is confirmed open (or fails), then returns.
    ///
    /// # Errors
    /// - `LoudctlError::AlreadyRunning` if already started.
    /// - `LoudctlError::Stopping` if the previous loop has not exited yet.
    /// - `LoudctlError::Actuator` if the volume backend is unreachable.
    /// - `LoudctlError::NoDefaultInputDevice` / `LoudctlError::AudioStream`
    ///   when the capture stream cannot be acquired.
    pub fn start_with_device(&self, preferred_input_device: Option<String>) -> Result<()> {
        self.start_with_source(move |config| {
            let capture = DeviceCapture::start(config, preferred_input_device.as_deref())?;
            Ok(Box::new(capture) as Box<dyn CaptureSource>)
        })
    }

    /// Start with any capture source. `open` runs on the loop thread, so the
    /// source it builds does not need to be `Send`.
    pub fn start_with_source<F>(&self, open: F) -> Result<()>
    where
        F: FnOnce(&ControlConfig) -> Result<Box<dyn CaptureSource>> + Send + 'static,
    {
        if self.running.load(Ordering::SeqCst) {
            return Err(LoudctlError::AlreadyRunning);
        }
        {
            // One loop per engine: a stopped loop still shares `running`.
            let mut worker = self.worker.lock();
            if worker.as_ref().is_some_and(|w| !w.is_finished()) {
                return Err(LoudctlError::Stopping);
            }
            worker.take();
        }

        // Fail before touching the audio device if the actuator is unreachable.
        let initial_level = match self.actuator.0.lock().probe() {
            Ok(level) => level,
            Err(e) => {
                self.set_status(EngineStatus::Error, Some(e.to_string()));
                return Err(e);
            }
        };
        info!(
            actuator = self.actuator.name().as_str(),
            initial_level, "actuator reachable"
        );

        self.diagnostics.reset();
        self.latest.clear();
        self.running.store(true, Ordering::SeqCst);
        self.set_status(EngineStatus::Running, None);

        let config = self.config.clone();
        let actuator = self.actuator.clone();
        let running = Arc::clone(&self.running);
        let tick_tx = self.tick_tx.clone();
        let status_tx = self.status_tx.clone();
        let status = Arc::clone(&self.status);
        let latest = self.latest.clone();
        let diagnostics = Arc::clone(&self.diagnostics);

        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<()>>();

        let worker = tokio::task::spawn_blocking(move || {
            // Built on THIS thread: cpal::Stream is !Send.
            let source = match open(&config) {
                Ok(source) => {
                    let _ = open_tx.send(Ok(()));
                    source
                }
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            };

            let ticker = Box::new(IntervalTicker::new(config.tick_interval));
            control_loop::run(LoopContext {
                config,
                source,
                actuator,
                ticker,
                clock: Box::new(SystemClock),
                running: Arc::clone(&running),
                tick_tx,
                status_tx,
                status,
                latest,
                diagnostics,
            });
            running.store(false, Ordering::SeqCst);
        });

        match open_rx.recv() {
            Ok(Ok(())) => {
                *self.worker.lock() = Some(worker);
                info!("engine started");
                Ok(())
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some(e.to_string()));
                Err(e)
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some("control loop failed to start".into()));
                Err(LoudctlError::Other(anyhow::anyhow!(
                    "control loop task died unexpectedly"
                )))
            }
        }
    }

    /// Ask the loop to stop. It finishes the tick in progress, releases the
    /// capture stream and moves the status to `Stopped`.
    ///
    /// # Errors
    /// `LoudctlError::NotRunning` if not currently running.
    pub fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(LoudctlError::NotRunning);
        }
        info!("engine stop requested");
        Ok(())
    }

    /// Wait for the loop thread to finish teardown. Returns immediately if
    /// nothing was started.
    pub async fn join(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("control loop task panicked: {e}");
                self.set_status(EngineStatus::Error, Some(e.to_string()));
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    /// Most recent tick, if any tick completed since the last start.
    pub fn latest_status(&self) -> Option<TickStatus> {
        self.latest.latest()
    }

    pub fn subscribe_ticks(&self) -> broadcast::Receiver<TickStatus> {
        self.tick_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// Read the actuator level directly.
    pub fn current_level(&self) -> Result<f32> {
        self.actuator.0.lock().get_current_level()
    }

    fn set_status(&self, new_status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(EngineStatusEvent {
            status: new_status,
            detail,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use crate::actuator::{SoftwareActuator, VolumeActuator};
    use crate::buffering::block::AudioBlock;
    use crate::audio::synthetic::{Segment, SyntheticCapture};
    use crate::loudness::LoudnessEstimator;

    struct UnreachableActuator;

    impl VolumeActuator for UnreachableActuator {
        fn get_current_level(&mut self) -> Result<f32> {
            Err(LoudctlError::Actuator("mixer offline".into()))
        }
        fn set_level(&mut self, _level: f32) -> Result<()> {
            Err(LoudctlError::Actuator("mixer offline".into()))
        }
        fn name(&self) -> &str {
            "unreachable"
        }
    }

    fn fast_config() -> ControlConfig {
        ControlConfig {
            tick_interval: Duration::from_millis(5),
            ..ControlConfig::default()
        }
    }

    fn loud_source(config: &ControlConfig) -> Result<Box<dyn CaptureSource>> {
        Ok(Box::new(SyntheticCapture::new(
            vec![Segment::new(10_000, 90.0)],
            LoudnessEstimator::from_config(config),
            config.block_size,
            config.sample_rate,
            7,
        )))
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ControlConfig {
            min_volume: 0.9,
            max_volume: 0.1,
            ..ControlConfig::default()
        };
        let err = ControlEngine::new(config, ActuatorHandle::new(SoftwareActuator::default()))
            .err()
            .expect("inverted volume bounds must fail");
        assert!(matches!(err, LoudctlError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn start_stop_lifecycle() {
        let software = SoftwareActuator::new(0.5);
        let engine =
            ControlEngine::new(fast_config(), ActuatorHandle::new(software.clone())).unwrap();
        assert_eq!(engine.status(), EngineStatus::Idle);
        let mut ticks = engine.subscribe_ticks();

        engine.start_with_source(loud_source).unwrap();
        assert_eq!(engine.status(), EngineStatus::Running);
        assert!(matches!(
            engine.start_with_source(loud_source),
            Err(LoudctlError::AlreadyRunning)
        ));

        let first = tokio::time::timeout(Duration::from_secs(5), ticks.recv())
            .await
            .expect("tick within timeout")
            .expect("tick channel open");
        assert_eq!(first.seq, 0);
        assert!(first.adjusted);

        engine.stop().unwrap();
        engine.join().await;
        assert_eq!(engine.status(), EngineStatus::Stopped);
        assert!(!engine.is_running());
        assert!(software.level() > 0.5);
        assert!(engine.diagnostics_snapshot().ticks >= 1);
        assert!(engine.latest_status().is_some());
        assert!(matches!(engine.stop(), Err(LoudctlError::NotRunning)));
    }

    #[tokio::test]
    async fn failed_source_open_reports_error() {
        let engine =
            ControlEngine::new(fast_config(), ActuatorHandle::new(SoftwareActuator::default()))
                .unwrap();
        let err = engine
            .start_with_source(|_| Err(LoudctlError::NoDefaultInputDevice))
            .unwrap_err();
        assert!(matches!(err, LoudctlError::NoDefaultInputDevice));
        assert_eq!(engine.status(), EngineStatus::Error);
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn unreachable_actuator_fails_before_capture_opens() {
        let engine =
            ControlEngine::new(fast_config(), ActuatorHandle::new(UnreachableActuator)).unwrap();
        let opened = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&opened);
        let err = engine
            .start_with_source(move |config| {
                flag.store(true, Ordering::SeqCst);
                loud_source(config)
            })
            .unwrap_err();
        assert!(matches!(err, LoudctlError::Actuator(_)));
        assert!(!opened.load(Ordering::SeqCst));
        assert_eq!(engine.status(), EngineStatus::Error);
    }

    #[tokio::test]
    async fn engine_can_restart_after_stop() {
        let engine =
            ControlEngine::new(fast_config(), ActuatorHandle::new(SoftwareActuator::new(0.5)))
                .unwrap();
        for _ in 0..2 {
            let mut ticks = engine.subscribe_ticks();
            engine.start_with_source(loud_source).unwrap();
            tokio::time::timeout(Duration::from_secs(5), ticks.recv())
                .await
                .expect("tick within timeout")
                .expect("tick channel open");
            engine.stop().unwrap();
            engine.join().await;
            assert_eq!(engine.status(), EngineStatus::Stopped);
        }
    }

    struct CountingSource {
        reads: Arc<AtomicUsize>,
        read_time: Duration,
    }

    impl CaptureSource for CountingSource {
        fn read_block(&mut self, _timeout: Duration) -> Result<AudioBlock> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.read_time);
            Ok(AudioBlock::new(vec![0.1; 256], 44_100))
        }
    }

    fn counting(
        reads: &Arc<AtomicUsize>,
    ) -> impl FnOnce(&ControlConfig) -> Result<Box<dyn CaptureSource>> + Send + 'static {
        let reads = Arc::clone(reads);
        move |_| {
            Ok(Box::new(CountingSource {
                reads,
                read_time: Duration::from_millis(100),
            }) as Box<dyn CaptureSource>)
        }
    }

    #[tokio::test]
    async fn restart_waits_for_previous_loop_to_exit() {
        let engine =
            ControlEngine::new(fast_config(), ActuatorHandle::new(SoftwareActuator::new(0.5)))
                .unwrap();
        let first_reads = Arc::new(AtomicUsize::new(0));
        let second_reads = Arc::new(AtomicUsize::new(0));

        engine.start_with_source(counting(&first_reads)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        engine.stop().unwrap();

        let err = engine.start_with_source(counting(&second_reads)).unwrap_err();
        assert!(matches!(err, LoudctlError::Stopping));
        assert!(!engine.is_running());
        assert_eq!(second_reads.load(Ordering::SeqCst), 0);

        engine.join().await;
        let first_total = first_reads.load(Ordering::SeqCst);
        engine.start_with_source(counting(&second_reads)).unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;
        engine.stop().unwrap();
        engine.join().await;

        assert_eq!(first_reads.load(Ordering::SeqCst), first_total);
        assert!(second_reads.load(Ordering::SeqCst) >= 2);
        assert_eq!(engine.status(), EngineStatus::Stopped);
    }
}
