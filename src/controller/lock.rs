use super::CameraController;
use crate::bridge::{commands, DeviceBridge};
use crate::error::{BoothError, Result};
use crate::events::{BoothEvent, CameraAction};
use std::time::Instant;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

impl CameraController {
    /// Lock the phone now and drop any pending auto-lock
    pub async fn lock_now(&self) -> Result<()> {
        let _permit = self.acquire_interactive().await?;
        if let Some(pending) = self.inner.lock_timer.lock().take() {
            pending.cancel();
        }

        let started = Instant::now();
        let result = async {
            let bridge = self.bridge().await?;
            self.send_lock_sequence(&bridge).await
        }
        .await;

        match result {
            Ok(()) => {
                self.inner.log.timed("Device locked", started.elapsed());
                Ok(())
            }
            Err(e) => {
                self.report_failure("Locking the device", &e).await;
                Err(e)
            }
        }
    }

    /// (Re)arm the inactivity lock. Any earlier timer is cancelled so only
    /// the most recent camera action counts.
    pub(super) fn restart_lock_timer(&self) {
        let token = self.inner.shutdown.child_token();
        if let Some(previous) = self.inner.lock_timer.lock().replace(token.clone()) {
            previous.cancel();
        }

        let delay = self.config().camera.inactivity_lock();
        let weak = self.downgrade();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = sleep(delay) => {}
            }
            if let Some(controller) = Self::upgrade(&weak) {
                controller.auto_lock(&token).await;
            }
        });
        debug!("Inactivity lock armed for {:?}", delay);
    }

    async fn auto_lock(&self, token: &CancellationToken) {
        let _permit = match self.acquire_interactive_bounded(token).await {
            Ok(permit) => permit,
            Err(BoothError::Cancelled) => return,
            Err(e) => {
                self.inner.log.warning(format!("Skipping auto-lock: {}", e));
                return;
            }
        };
        // A camera action may have re-armed the timer while we queued
        if token.is_cancelled() {
            return;
        }

        let result = async {
            let bridge = self.bridge().await?;
            self.send_lock_sequence(&bridge).await
        }
        .await;

        match result {
            Ok(()) => self.inner.log.info("Device locked after inactivity"),
            Err(e) => self.report_failure("Auto-lock", &e).await,
        }
    }

    /// Back out of the camera app, switch the screen off, and forget the
    /// last camera action. Skipped when the screen is already off.
    async fn send_lock_sequence(&self, bridge: &DeviceBridge) -> Result<()> {
        let interactive = self.prober().is_interactive(bridge).await?;

        if interactive {
            for key in commands::LOCK_SEQUENCE {
                bridge.keyevent(key).await?;
            }
            sleep(self.config().camera.lock_animation()).await;
        } else {
            debug!("Screen already off, nothing to lock");
        }

        *self.inner.last_camera_action.lock() = None;
        self.inner.event_bus.publish(BoothEvent::CameraAction {
            action: CameraAction::Lock,
        });
        Ok(())
    }
}
