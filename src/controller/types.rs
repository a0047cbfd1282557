use crate::bridge::SessionState;
use serde::Serialize;
use std::time::Duration;

/// Snapshot of what the controller knows about the phone
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub session: SessionState,
    pub serial: Option<String>,
    pub authorized: bool,
    /// `None` when the probe failed
    pub interactive: Option<bool>,
    pub locked: Option<bool>,
    pub last_counter: u64,
    pub focus_running: bool,
    pub download_running: bool,
}

/// Result of a successful photo
#[derive(Debug, Clone, Copy)]
pub struct PhotoOutcome {
    /// The device had to be woken (and possibly unlocked) first
    pub woke_device: bool,
    /// Time from the start of the countdown to the shutter command
    pub shutter_delay: Duration,
}
