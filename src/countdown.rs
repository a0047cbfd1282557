use crate::events::{BoothEvent, EventBus};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Pre-shutter countdown shown to the people in front of the booth.
///
/// Ticks once per second on the event bus and reports `CountdownComplete`
/// when it reaches zero. Dropping the countdown stops the ticks unless it
/// was handed off with [`CaptureCountdown::finish`].
pub struct CaptureCountdown {
    total: Duration,
    started: Instant,
    cancellation_token: CancellationToken,
    cancel_on_drop: bool,
}

impl CaptureCountdown {
    pub fn start(total: Duration, event_bus: EventBus) -> Self {
        let started = Instant::now();
        let cancellation_token = CancellationToken::new();
        let token = cancellation_token.clone();

        tokio::spawn(async move {
            let whole_seconds = total.as_secs();
            for tick in 1..=whole_seconds {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Countdown cancelled after {} ticks", tick - 1);
                        return;
                    }
                    _ = sleep_until(started + Duration::from_secs(tick)) => {}
                }
                event_bus.publish(BoothEvent::CountdownTick {
                    seconds_remaining: whole_seconds - tick,
                });
            }

            tokio::select! {
                _ = token.cancelled() => return,
                _ = sleep_until(started + total) => {}
            }
            event_bus.publish(BoothEvent::CountdownComplete);
        });

        Self {
            total,
            started,
            cancellation_token,
            cancel_on_drop: true,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.total.saturating_sub(self.started.elapsed())
    }

    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    /// Let the remaining ticks and the completion event play out in the
    /// background
    pub fn finish(mut self) {
        self.cancel_on_drop = false;
    }
}

impl Drop for CaptureCountdown {
    fn drop(&mut self) {
        if self.cancel_on_drop && !self.remaining().is_zero() {
            self.cancellation_token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_countdown_ticks_and_completes() {
        let bus = EventBus::new(16);
        let mut receiver = bus.subscribe();
        let countdown = CaptureCountdown::start(Duration::from_secs(2), bus.clone());

        let mut remaining = Vec::new();
        loop {
            match receiver.recv().await.unwrap() {
                BoothEvent::CountdownTick { seconds_remaining } => {
                    remaining.push(seconds_remaining)
                }
                BoothEvent::CountdownComplete => break,
                _ => {}
            }
        }

        assert_eq!(remaining, vec![1, 0]);
        assert!(countdown.remaining().is_zero());
        assert!(countdown.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_remaining_readable_early() {
        let bus = EventBus::new(16);
        let countdown = CaptureCountdown::start(Duration::from_secs(5), bus);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let remaining = countdown.remaining();
        assert!(remaining < Duration::from_secs(5));
        assert!(remaining > Duration::from_millis(4800));
    }

    #[tokio::test]
    async fn test_cancel_stops_ticks() {
        let bus = EventBus::new(16);
        let mut receiver = bus.subscribe();
        let countdown = CaptureCountdown::start(Duration::from_secs(1), bus.clone());
        countdown.cancel();

        let result = tokio::time::timeout(Duration::from_millis(1300), receiver.recv()).await;
        assert!(result.is_err(), "no events after cancellation");
    }

    #[tokio::test]
    async fn test_drop_stops_ticks_but_finish_does_not() {
        let bus = EventBus::new(16);
        let mut receiver = bus.subscribe();

        drop(CaptureCountdown::start(Duration::from_secs(1), bus.clone()));
        let result = tokio::time::timeout(Duration::from_millis(1300), receiver.recv()).await;
        assert!(result.is_err(), "dropped countdown keeps quiet");

        CaptureCountdown::start(Duration::from_secs(1), bus.clone()).finish();
        let tick = tokio::time::timeout(Duration::from_millis(1300), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            tick,
            BoothEvent::CountdownTick {
                seconds_remaining: 0
            }
        ));
        let complete = tokio::time::timeout(Duration::from_millis(300), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(complete, BoothEvent::CountdownComplete));
    }
}
