use super::types::DeviceStatus;
use crate::activity_log::ActivityLog;
use crate::bridge::{AdbRunner, CommandRunner, DeviceBridge, DeviceSession, SessionState};
use crate::config::BoothConfig;
use crate::device::{prober_for, DeviceProber};
use crate::error::{BoothError, Result};
use crate::events::{BoothEvent, CameraAction, EventBus, LoopKind};
use crate::timer::PeriodicLoop;
use crate::transfer::DownloadPipeline;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// State guarded by the download gate
#[derive(Debug, Default)]
pub(super) struct DownloadState {
    pub last_counter: u64,
    pub last_initiated: Option<Instant>,
}

enum RunnerSource {
    /// Rebuilt from the bridge settings whenever they change
    Adb,
    Fixed,
}

/// Top-level controller driving the phone.
///
/// Interactive operations (open camera, unlock, photo, focus, lock) are
/// serialized through one gate; download passes through another. Auto-lock
/// and the post-photo download cascade are cancellable timers, each replaced
/// when a newer instance starts.
#[derive(Clone)]
pub struct CameraController {
    pub(super) inner: Arc<ControllerInner>,
}

pub(super) struct ControllerInner {
    pub config: RwLock<Arc<BoothConfig>>,
    runner_source: RunnerSource,
    runner: RwLock<Arc<dyn CommandRunner>>,
    prober: RwLock<Arc<dyn DeviceProber>>,
    pipeline: RwLock<Arc<DownloadPipeline>>,
    session: AsyncMutex<Option<DeviceSession>>,

    pub interactive_gate: Arc<Semaphore>,
    pub download_gate: AsyncMutex<DownloadState>,
    /// Mirror of `DownloadState::last_counter` for lock-free status reads
    pub published_counter: AtomicU64,

    pub last_camera_action: Mutex<Option<Instant>>,
    pub lock_timer: Mutex<Option<CancellationToken>>,
    pub download_cascade: Mutex<Option<CancellationToken>>,
    pub focus_loop: PeriodicLoop,
    pub download_loop: PeriodicLoop,

    pub event_bus: EventBus,
    pub log: Arc<ActivityLog>,
    pub shutdown: CancellationToken,
}

impl CameraController {
    /// Create a controller talking to the real bridge binary
    pub fn with_adb(config: BoothConfig) -> Result<Self> {
        let runner: Arc<dyn CommandRunner> = Arc::new(AdbRunner::new(
            &config.bridge.binary_dir,
            &config.bridge.binary_name,
        ));
        Self::build(config, runner, RunnerSource::Adb)
    }

    /// Create a controller on top of any command runner
    pub fn new(config: BoothConfig, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        Self::build(config, runner, RunnerSource::Fixed)
    }

    fn build(
        config: BoothConfig,
        runner: Arc<dyn CommandRunner>,
        runner_source: RunnerSource,
    ) -> Result<Self> {
        config.validate()?;

        let event_bus = EventBus::new(config.system.event_bus_capacity);
        let log = Arc::new(ActivityLog::new(config.system.log_capacity));
        let pipeline = DownloadPipeline::from_config(&config, Arc::clone(&log))?;
        let prober = prober_for(config.bridge.probe_mode);

        info!(
            "Camera controller created (probe mode {:?})",
            config.bridge.probe_mode
        );

        Ok(Self {
            inner: Arc::new(ControllerInner {
                config: RwLock::new(Arc::new(config)),
                runner_source,
                runner: RwLock::new(runner),
                prober: RwLock::new(prober),
                pipeline: RwLock::new(Arc::new(pipeline)),
                session: AsyncMutex::new(None),
                interactive_gate: Arc::new(Semaphore::new(1)),
                download_gate: AsyncMutex::new(DownloadState::default()),
                published_counter: AtomicU64::new(0),
                last_camera_action: Mutex::new(None),
                lock_timer: Mutex::new(None),
                download_cascade: Mutex::new(None),
                focus_loop: PeriodicLoop::new(LoopKind::Focus, event_bus.clone()),
                download_loop: PeriodicLoop::new(LoopKind::Download, event_bus.clone()),
                event_bus,
                log,
                shutdown: CancellationToken::new(),
            }),
        })
    }

    pub(super) fn downgrade(&self) -> Weak<ControllerInner> {
        Arc::downgrade(&self.inner)
    }

    pub(super) fn upgrade(weak: &Weak<ControllerInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    pub fn activity_log(&self) -> &Arc<ActivityLog> {
        &self.inner.log
    }

    pub fn config(&self) -> Arc<BoothConfig> {
        self.inner.config.read().clone()
    }

    pub(super) fn prober(&self) -> Arc<dyn DeviceProber> {
        self.inner.prober.read().clone()
    }

    pub(super) fn pipeline(&self) -> Arc<DownloadPipeline> {
        self.inner.pipeline.read().clone()
    }

    /// Replace the settings. The device session is dropped and re-created on
    /// next use; running loops restart with the new intervals.
    pub async fn apply_config(&self, config: BoothConfig) -> Result<()> {
        config.validate()?;
        let pipeline = DownloadPipeline::from_config(&config, Arc::clone(&self.inner.log))?;

        *self.inner.prober.write() = prober_for(config.bridge.probe_mode);
        *self.inner.pipeline.write() = Arc::new(pipeline);
        if matches!(self.inner.runner_source, RunnerSource::Adb) {
            *self.inner.runner.write() = Arc::new(AdbRunner::new(
                &config.bridge.binary_dir,
                &config.bridge.binary_name,
            ));
        }
        *self.inner.config.write() = Arc::new(config);

        self.reset_session().await;
        self.inner.log.info("Settings applied");

        if self.inner.download_loop.stop() {
            self.start_periodic_download();
        }
        if self.inner.focus_loop.stop() {
            self.start_focus_keepalive();
        }
        Ok(())
    }

    pub async fn reset_session(&self) {
        let previous = self.inner.session.lock().await.take();
        if previous.is_some() {
            debug!("Device session dropped");
        }
        self.inner.event_bus.publish(BoothEvent::SessionReset);
    }

    pub async fn session_state(&self) -> SessionState {
        match self.inner.session.lock().await.as_ref() {
            Some(session) => session.state(),
            None => SessionState::Unbound,
        }
    }

    /// Bridge addressed to the bound device, binding lazily
    pub(super) async fn bridge(&self) -> Result<DeviceBridge> {
        let runner = self.inner.runner.read().clone();
        let mut session = self.inner.session.lock().await;

        let current = match session.as_ref() {
            Some(current) => current.clone(),
            None => {
                let opened = DeviceSession::open(&runner).await?;
                *session = Some(opened.clone());
                opened
            }
        };

        Ok(current.bridge(&runner))
    }

    pub(super) async fn acquire_interactive(&self) -> Result<OwnedSemaphorePermit> {
        Arc::clone(&self.inner.interactive_gate)
            .acquire_owned()
            .await
            .map_err(|_| BoothError::Cancelled)
    }

    /// Gate wait for background timers: bounded, and abandoned on cancellation
    pub(super) async fn acquire_interactive_bounded(
        &self,
        token: &CancellationToken,
    ) -> Result<OwnedSemaphorePermit> {
        let waited = self.config().camera.gate_wait();
        tokio::select! {
            _ = token.cancelled() => Err(BoothError::Cancelled),
            acquired = tokio::time::timeout(waited, self.acquire_interactive()) => {
                acquired.map_err(|_| BoothError::GateTimeout {
                    gate: "camera",
                    waited,
                })?
            }
        }
    }

    /// Time since the last camera action, `None` if there was none yet
    pub fn idle_for(&self) -> Option<Duration> {
        self.inner.last_camera_action.lock().map(|at| at.elapsed())
    }

    /// Stamp a camera action: restarts the inactivity lock timer and tells
    /// UIs to refresh
    pub(super) fn record_camera_action(&self, action: CameraAction) {
        *self.inner.last_camera_action.lock() = Some(Instant::now());
        self.restart_lock_timer();
        self.inner
            .event_bus
            .publish(BoothEvent::CameraAction { action });
    }

    /// Log a failed operation once. Cancellation stays silent; a broken
    /// bridge binary also drops the session.
    pub(super) async fn report_failure(&self, operation: &str, error: &BoothError) {
        match error {
            BoothError::Cancelled => debug!("{} cancelled", operation),
            e if e.is_fatal() => {
                self.inner
                    .log
                    .error(format!("{} failed: {}. Check the bridge folder", operation, e));
                self.reset_session().await;
            }
            e => self.inner.log.error(format!("{} failed: {}", operation, e)),
        }
    }

    pub async fn status(&self) -> DeviceStatus {
        let (interactive, locked) = match self.bridge().await {
            Ok(bridge) => {
                let prober = self.prober();
                (
                    prober.is_interactive(&bridge).await.ok(),
                    prober.is_locked(&bridge).await.ok(),
                )
            }
            Err(e) => {
                debug!("Status probe unavailable: {}", e);
                (None, None)
            }
        };
        let session = self.inner.session.lock().await.clone();

        DeviceStatus {
            session: session
                .as_ref()
                .map(DeviceSession::state)
                .unwrap_or(SessionState::Unbound),
            serial: session.as_ref().and_then(|s| s.serial.clone()),
            authorized: session.as_ref().map(|s| s.authorized).unwrap_or(false),
            interactive,
            locked,
            last_counter: self.inner.published_counter.load(Ordering::Relaxed),
            focus_running: self.inner.focus_loop.is_running(),
            download_running: self.inner.download_loop.is_running(),
        }
    }

    /// Cancel every timer and loop; queued gate waits fail with `Cancelled`
    pub fn shutdown(&self) {
        info!("Shutting down camera controller");
        self.inner.shutdown.cancel();
        self.inner.focus_loop.stop();
        self.inner.download_loop.stop();
        self.inner.interactive_gate.close();
    }
}
