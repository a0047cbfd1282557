use crate::events::{BoothEvent, EventBus};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a key press asks the booth to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Capture,
    Quit,
}

/// Map a key to its booth action; every other key is ignored
pub fn key_action(code: KeyCode) -> Option<KeyAction> {
    match code {
        KeyCode::Char(' ') | KeyCode::Enter => Some(KeyAction::Capture),
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(KeyAction::Quit),
        _ => None,
    }
}

/// Terminal trigger source: SPACE or ENTER takes a photo, `q` or ESC quits
pub struct KeyboardTrigger {
    event_bus: EventBus,
    cancellation_token: CancellationToken,
}

impl KeyboardTrigger {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            event_bus,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start reading keys on a blocking thread
    pub fn start(&self) -> JoinHandle<()> {
        info!("Keyboard trigger active - press SPACE to take a photo, q to quit");

        let event_bus = self.event_bus.clone();
        let cancellation_token = self.cancellation_token.clone();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            while !cancellation_token.is_cancelled() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }

                        match key_action(key_event.code) {
                            Some(KeyAction::Capture) => {
                                debug!("Capture key pressed");
                                event_bus.publish(BoothEvent::TriggerCapture);
                            }
                            Some(KeyAction::Quit) => {
                                info!("Quit key pressed - requesting shutdown");
                                event_bus.publish(BoothEvent::ShutdownRequested {
                                    reason: "User requested via keyboard".to_string(),
                                });
                                break;
                            }
                            None => debug!("Key pressed: {:?}", key_event.code),
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Keyboard trigger task exited");
        })
    }

    pub async fn stop(&self) {
        info!("Stopping keyboard trigger");
        self.cancellation_token.cancel();

        // Give the poll loop a moment to notice and restore the terminal
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();
    }
}
