use crate::events::{BoothEvent, EventBus, LoopKind};
use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const PROGRESS_STEPS: u32 = 10;
const MIN_PROGRESS_STEP: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStart {
    Started,
    AlreadyRunning,
}

/// A named background loop that reports progress through its period and
/// runs an action each time the period elapses
pub struct PeriodicLoop {
    kind: LoopKind,
    event_bus: EventBus,
    running: Mutex<Option<CancellationToken>>,
}

impl PeriodicLoop {
    pub fn new(kind: LoopKind, event_bus: EventBus) -> Self {
        Self {
            kind,
            event_bus,
            running: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn start<F, Fut>(&self, period: Duration, action: F) -> LoopStart
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut running = self.running.lock();
        if running.is_some() {
            debug!("{} loop already running", self.kind);
            return LoopStart::AlreadyRunning;
        }

        let token = CancellationToken::new();
        *running = Some(token.clone());
        drop(running);

        let step = (period / PROGRESS_STEPS).max(MIN_PROGRESS_STEP).min(period);
        let kind = self.kind;
        let event_bus = self.event_bus.clone();

        tokio::spawn(async move {
            let mut ticker = interval(step);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick of a tokio interval completes immediately
            ticker.tick().await;

            let mut elapsed = Duration::ZERO;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                elapsed += step;
                if elapsed >= period {
                    event_bus.publish(BoothEvent::LoopProgress {
                        kind,
                        fraction: 1.0,
                    });
                    action().await;
                    elapsed = Duration::ZERO;
                    if token.is_cancelled() {
                        break;
                    }
                }
                event_bus.publish(BoothEvent::LoopProgress {
                    kind,
                    fraction: elapsed.as_secs_f32() / period.as_secs_f32(),
                });
            }
            debug!("{} loop task finished", kind);
        });

        info!("{} loop started with period {:?}", self.kind, period);
        self.event_bus.publish(BoothEvent::LoopStateChanged {
            kind: self.kind,
            running: true,
        });
        LoopStart::Started
    }

    /// Returns whether a running loop was stopped
    pub fn stop(&self) -> bool {
        match self.running.lock().take() {
            Some(token) => {
                token.cancel();
                info!("{} loop stopped", self.kind);
                self.event_bus.publish(BoothEvent::LoopStateChanged {
                    kind: self.kind,
                    running: false,
                });
                true
            }
            None => false,
        }
    }
}

impl Drop for PeriodicLoop {
    fn drop(&mut self) {
        if let Some(token) = self.running.lock().take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let bus = EventBus::new(64);
        let periodic = PeriodicLoop::new(LoopKind::Focus, bus);

        assert_eq!(
            periodic.start(Duration::from_secs(60), || async {}),
            LoopStart::Started
        );
        assert_eq!(
            periodic.start(Duration::from_secs(60), || async {}),
            LoopStart::AlreadyRunning
        );
        assert!(periodic.is_running());

        assert!(periodic.stop());
        assert!(!periodic.stop());
        assert!(!periodic.is_running());
    }

    #[tokio::test]
    async fn test_action_runs_each_period() {
        let bus = EventBus::new(256);
        let periodic = PeriodicLoop::new(LoopKind::Download, bus.clone());
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        periodic.start(Duration::from_millis(200), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(700)).await;
        periodic.stop();
        let after_stop = runs.load(Ordering::SeqCst);
        assert!((2..=4).contains(&after_stop), "ran {} times", after_stop);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(runs.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn test_progress_and_state_events() {
        let bus = EventBus::new(256);
        let mut receiver = bus.subscribe();
        let periodic = PeriodicLoop::new(LoopKind::Focus, bus.clone());

        periodic.start(Duration::from_secs(1), || async {});
        tokio::time::sleep(Duration::from_millis(350)).await;
        periodic.stop();

        let mut fractions = Vec::new();
        let mut states = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            match event {
                BoothEvent::LoopProgress { fraction, .. } => fractions.push(fraction),
                BoothEvent::LoopStateChanged { running, .. } => states.push(running),
                _ => {}
            }
        }

        assert_eq!(states, vec![true, false]);
        assert!(!fractions.is_empty());
        assert!(fractions.windows(2).all(|w| w[0] < w[1]));
    }
}
