use super::CameraController;
use crate::bridge::{commands, DeviceBridge};
use crate::config::BoothConfig;
use crate::error::{BoothError, Result};
use crate::events::CameraAction;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info};

impl CameraController {
    /// Wake and unlock the phone, queueing behind any other camera operation
    pub async fn unlock(&self) -> Result<()> {
        let _permit = self.acquire_interactive().await?;
        let started = Instant::now();

        let result = async {
            let bridge = self.bridge().await?;
            let config = self.config();
            self.ensure_awake_and_unlocked(&bridge, &config).await
        }
        .await;

        match result {
            Ok(()) => {
                self.record_camera_action(CameraAction::Unlock);
                self.inner
                    .log
                    .timed("Device awake and unlocked", started.elapsed());
                Ok(())
            }
            Err(e) => {
                self.report_failure("Unlocking the device", &e).await;
                Err(e)
            }
        }
    }

    /// Make sure the screen is on and the keyguard is gone.
    ///
    /// Both waits are bounded; running out of attempts yields
    /// `DeviceNotInteractive` or `DeviceLocked`. An initial probe that cannot
    /// be read is returned as is and no key is sent. Callers hold the camera
    /// gate.
    pub(super) async fn ensure_awake_and_unlocked(
        &self,
        bridge: &DeviceBridge,
        config: &BoothConfig,
    ) -> Result<()> {
        let prober = self.prober();
        let prober = prober.as_ref();
        let interval = config.unlock.poll_interval();

        let interactive = prober.is_interactive(bridge).await?;
        if !interactive {
            debug!("Screen is off, waking device");
            bridge.keyevent(commands::KEY_WAKE).await?;

            let attempts = config.unlock.wake_attempts;
            let woke =
                poll_until(attempts, interval, move || prober.is_interactive(bridge)).await?;
            if !woke {
                return Err(BoothError::DeviceNotInteractive { attempts });
            }
        }

        let locked = prober.is_locked(bridge).await?;
        if locked {
            debug!("Device is locked, entering unlock sequence");
            send_unlock_sequence(bridge, config).await?;

            let attempts = config.unlock.unlock_attempts;
            let unlocked = poll_until(attempts, interval, move || async move {
                prober.is_locked(bridge).await.map(|locked| !locked)
            })
            .await?;
            if !unlocked {
                return Err(BoothError::DeviceLocked { attempts });
            }
            info!("Device unlocked");
        }

        Ok(())
    }
}

/// Wake, optional PIN, confirm
async fn send_unlock_sequence(bridge: &DeviceBridge, config: &BoothConfig) -> Result<()> {
    let delay = config.unlock.keystroke_delay();

    bridge.keyevent(commands::KEY_WAKE).await?;
    sleep(delay).await;

    if !config.unlock.pin.is_empty() {
        bridge.text(&config.unlock.pin).await?;
        sleep(delay).await;
    }

    bridge.keyevent(commands::KEY_ENTER).await
}

/// Wait `interval`, probe, and repeat up to `attempts` times. Ordinary probe
/// failures count as a negative answer; only a launch failure aborts.
pub(super) async fn poll_until<F, Fut>(
    attempts: u32,
    interval: Duration,
    mut probe: F,
) -> Result<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    for attempt in 1..=attempts {
        sleep(interval).await;
        match probe().await {
            Ok(true) => {
                debug!("Condition met after {} of {} polls", attempt, attempts);
                return Ok(true);
            }
            Ok(false) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => debug!("Poll {} of {} failed: {}", attempt, attempts, e),
        }
    }
    Ok(false)
}
