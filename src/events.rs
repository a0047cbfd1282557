use crate::error::EventBusError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Background loops that can be started and stopped independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoopKind {
    Focus,
    Download,
}

impl fmt::Display for LoopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopKind::Focus => write!(f, "focus"),
            LoopKind::Download => write!(f, "download"),
        }
    }
}

/// Interactive operations that count as camera activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraAction {
    OpenCamera,
    Unlock,
    TakePhoto,
    Lock,
}

/// Events that can occur in the booth
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BoothEvent {
    /// One second of the pre-shutter countdown elapsed
    CountdownTick { seconds_remaining: u64 },
    /// The countdown reached zero
    CountdownComplete,
    /// An interactive operation touched the device; UIs refresh their state
    CameraAction { action: CameraAction },
    /// A background loop was started or stopped
    LoopStateChanged { kind: LoopKind, running: bool },
    /// Elapsed fraction of the current loop period
    LoopProgress { kind: LoopKind, fraction: f32 },
    /// A download pass published new files
    FilesPublished { count: usize, last_counter: u64 },
    /// The device session was dropped and will be re-created on next use
    SessionReset,
    /// A trigger source (keyboard, joystick) asked for a photo
    TriggerCapture,
    /// Shutdown requested by a trigger source
    ShutdownRequested { reason: String },
}

impl BoothEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            BoothEvent::CountdownTick { seconds_remaining } => {
                format!("Countdown: {} seconds remaining", seconds_remaining)
            }
            BoothEvent::CountdownComplete => "Countdown complete".to_string(),
            BoothEvent::CameraAction { action } => format!("Camera action: {:?}", action),
            BoothEvent::LoopStateChanged { kind, running } => format!(
                "{} loop {}",
                kind,
                if *running { "started" } else { "stopped" }
            ),
            BoothEvent::LoopProgress { kind, fraction } => {
                format!("{} loop at {:.0}%", kind, fraction * 100.0)
            }
            BoothEvent::FilesPublished {
                count,
                last_counter,
            } => format!("Published {} files (last counter {})", count, last_counter),
            BoothEvent::SessionReset => "Device session reset".to_string(),
            BoothEvent::TriggerCapture => "Capture triggered".to_string(),
            BoothEvent::ShutdownRequested { reason } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            BoothEvent::CountdownTick { .. } => "countdown_tick",
            BoothEvent::CountdownComplete => "countdown_complete",
            BoothEvent::CameraAction { .. } => "camera_action",
            BoothEvent::LoopStateChanged { .. } => "loop_state_changed",
            BoothEvent::LoopProgress { .. } => "loop_progress",
            BoothEvent::FilesPublished { .. } => "files_published",
            BoothEvent::SessionReset => "session_reset",
            BoothEvent::TriggerCapture => "trigger_capture",
            BoothEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BoothEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<BoothEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// Publishing with nobody listening is not an error for the booth: the
    /// slideshow and trigger sources come and go.
    pub fn publish(&self, event: BoothEvent) -> usize {
        match &event {
            BoothEvent::ShutdownRequested { reason } => info!("Shutdown requested: {}", reason),
            BoothEvent::LoopProgress { .. } | BoothEvent::CountdownTick { .. } => {}
            _ => debug!("Event: {}", event.description()),
        }

        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Custom filter function
    Custom(fn(&BoothEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &BoothEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<BoothEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<BoothEvent>, filter: EventFilter, name: String) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<BoothEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { missed: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<BoothEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { missed: n });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let delivered = event_bus.publish(BoothEvent::CountdownTick {
            seconds_remaining: 3,
        });
        assert_eq!(delivered, 1);

        match receiver.recv().await.unwrap() {
            BoothEvent::CountdownTick { seconds_remaining } => assert_eq!(seconds_remaining, 3),
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let event_bus = EventBus::new(10);
        assert!(!event_bus.has_subscribers());
        assert_eq!(event_bus.publish(BoothEvent::SessionReset), 0);
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let filter = EventFilter::EventTypes(vec!["camera_action"]);
        let mut receiver = EventReceiver::new(event_bus.subscribe(), filter, "test".to_string());

        event_bus.publish(BoothEvent::CountdownComplete);
        event_bus.publish(BoothEvent::CameraAction {
            action: CameraAction::TakePhoto,
        });

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event_type(), "camera_action");
        assert!(receiver.try_recv().unwrap().is_none());
    }
}
