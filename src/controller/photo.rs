use super::{CameraController, PhotoOutcome};
use crate::bridge::commands;
use crate::countdown::CaptureCountdown;
use crate::error::Result;
use crate::events::CameraAction;
use std::time::Instant;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

impl CameraController {
    /// Count down, make sure the camera is ready, and press the shutter when
    /// the countdown reaches zero.
    ///
    /// Queues behind any running camera operation. A successful shutter
    /// schedules the download cascade, replacing the one from the previous
    /// photo.
    pub async fn take_photo(&self) -> Result<PhotoOutcome> {
        let _permit = self.acquire_interactive().await?;
        let config = self.config();
        let photo_id = Uuid::new_v4();
        debug!("Photo {} started", photo_id);

        let countdown = CaptureCountdown::start(
            config.camera.countdown(),
            self.inner.event_bus.clone(),
        );

        let result: Result<PhotoOutcome> = async {
            let bridge = self.bridge().await?;

            // An idle camera app may have been closed or the screen may have
            // gone dark; reopen rather than trust it
            let stale = match self.idle_for() {
                Some(idle) => idle > config.camera.camera_open_timeout(),
                None => true,
            };
            // A probe that cannot be read leaves the device in an unknown
            // state, so nothing is sent
            let ready = !stale
                && self
                    .prober()
                    .is_interactive_and_unlocked(&bridge)
                    .await?;

            if !ready {
                self.ensure_awake_and_unlocked(&bridge, &config).await?;
                if stale {
                    bridge.start_intent(&config.camera.intent_action).await?;
                }
                sleep(config.camera.settle()).await;
            }

            let wait = countdown
                .remaining()
                .saturating_sub(config.camera.shutter_adjustment());
            sleep(wait).await;

            bridge.keyevent(commands::KEY_SHUTTER).await?;
            Ok(PhotoOutcome {
                woke_device: !ready,
                shutter_delay: countdown.elapsed(),
            })
        }
        .await;

        match result {
            Ok(outcome) => {
                countdown.finish();
                self.record_camera_action(CameraAction::TakePhoto);
                self.schedule_download_cascade();
                let message = if outcome.woke_device {
                    "Photo taken (camera prepared first)"
                } else {
                    "Photo taken"
                };
                self.inner.log.timed(message, outcome.shutter_delay);
                debug!("Photo {} finished", photo_id);
                Ok(outcome)
            }
            Err(e) => {
                countdown.cancel();
                self.report_failure("Taking a photo", &e).await;
                Err(e)
            }
        }
    }

    /// Wake, unlock and bring the camera app to the front
    pub async fn open_camera(&self) -> Result<()> {
        let _permit = self.acquire_interactive().await?;
        let config = self.config();
        let started = Instant::now();

        let result: Result<()> = async {
            let bridge = self.bridge().await?;
            self.ensure_awake_and_unlocked(&bridge, &config).await?;
            bridge.start_intent(&config.camera.intent_action).await?;
            sleep(config.camera.settle()).await;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.record_camera_action(CameraAction::OpenCamera);
                self.inner.log.timed("Camera opened", started.elapsed());
                Ok(())
            }
            Err(e) => {
                self.report_failure("Opening the camera", &e).await;
                Err(e)
            }
        }
    }

    /// Spawn one download attempt per cascade delay. All attempts share a
    /// scope that the next photo cancels.
    pub(super) fn schedule_download_cascade(&self) {
        let scope = self.inner.shutdown.child_token();
        if let Some(previous) = self.inner.download_cascade.lock().replace(scope.clone()) {
            previous.cancel();
        }

        let delays = self.config().download.cascade();
        info!("Scheduling {} download attempts", delays.len());

        for delay in delays {
            let weak = self.downgrade();
            let scope = scope.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = scope.cancelled() => return,
                    _ = sleep(delay) => {}
                }
                let Some(controller) = Self::upgrade(&weak) else {
                    return;
                };
                controller.cascade_attempt(&scope).await;
            });
        }
    }

    async fn cascade_attempt(&self, scope: &CancellationToken) {
        if let Err(e) = self.download_pass(Instant::now(), Some(scope)).await {
            self.report_failure("Scheduled download", &e).await;
        }
    }
}
