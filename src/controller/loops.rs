use super::CameraController;
use crate::bridge::commands;
use crate::error::{BoothError, Result};
use crate::timer::LoopStart;
use tracing::debug;

impl CameraController {
    /// Download on a fixed interval until stopped
    pub fn start_periodic_download(&self) -> LoopStart {
        let period = self.config().download.interval();
        let weak = self.downgrade();
        self.inner.download_loop.start(period, move || {
            let weak = weak.clone();
            async move {
                if let Some(controller) = Self::upgrade(&weak) {
                    // Failures are already logged by download_now
                    let _ = controller.download_now().await;
                }
            }
        })
    }

    pub fn stop_periodic_download(&self) -> bool {
        self.inner.download_loop.stop()
    }

    /// Tap the focus key on a fixed interval so the camera app stays awake
    pub fn start_focus_keepalive(&self) -> LoopStart {
        let period = self.config().camera.focus_interval();
        let weak = self.downgrade();
        self.inner.focus_loop.start(period, move || {
            let weak = weak.clone();
            async move {
                if let Some(controller) = Self::upgrade(&weak) {
                    controller.focus_once().await;
                }
            }
        })
    }

    pub fn stop_focus_keepalive(&self) -> bool {
        self.inner.focus_loop.stop()
    }

    pub fn is_download_running(&self) -> bool {
        self.inner.download_loop.is_running()
    }

    pub fn is_focus_running(&self) -> bool {
        self.inner.focus_loop.is_running()
    }

    pub(super) async fn focus_once(&self) {
        let token = self.inner.shutdown.child_token();
        let _permit = match self.acquire_interactive_bounded(&token).await {
            Ok(permit) => permit,
            Err(BoothError::Cancelled) => return,
            Err(e) => {
                self.inner.log.warning(format!("Skipping focus: {}", e));
                return;
            }
        };

        let result: Result<()> = async {
            let bridge = self.bridge().await?;
            // Never wake or unlock the phone just to focus
            if self.prober().is_interactive_and_unlocked(&bridge).await? {
                bridge.keyevent(commands::KEY_FOCUS).await?;
                debug!("Focus key sent");
            } else {
                debug!("Device not ready, skipping focus");
            }
            Ok(())
        }
        .await;

        if let Err(e) = result {
            self.report_failure("Focus keepalive", &e).await;
        }
    }
}
