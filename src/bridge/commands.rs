//! Fixed command strings understood by the device bridge.

pub const KEY_WAKE: &str = "82";
pub const KEY_SHUTTER: &str = "VOLUME_UP";
pub const KEY_BACK: &str = "4";
pub const KEY_POWER: &str = "26";
pub const KEY_ENTER: &str = "66";
pub const KEY_FOCUS: &str = "80";

/// `isInteractive` of the power service
pub const PROBE_INTERACTIVE: [&str; 4] = ["service", "call", "power", "12"];
/// `isDeviceLocked` of the trust service
pub const PROBE_LOCKED: [&str; 4] = ["service", "call", "trust", "7"];
pub const PROBE_STATE_DUMP: [&str; 2] = ["dumpsys", "nfc"];
pub const SCREEN_STATE_PREFIX: &str = "mScreenState=";

/// Marker the bridge prints on a successful pull
pub const PULL_SUCCESS_MARKER: &str = "pulled";

/// Keys sent to return to the home screen and switch the screen off
pub const LOCK_SEQUENCE: [&str; 3] = [KEY_BACK, KEY_BACK, KEY_POWER];
