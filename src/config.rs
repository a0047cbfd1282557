use config::{Config, ConfigError, Environment, File};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub const COUNTER_PLACEHOLDER: &str = "{counter";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BoothConfig {
    pub bridge: BridgeConfig,
    pub unlock: UnlockConfig,
    pub camera: CameraConfig,
    pub download: DownloadConfig,
    pub publish: PublishConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Folder holding the bridge binary; also the working directory of every command
    #[serde(default = "default_binary_dir")]
    pub binary_dir: String,

    /// File name of the bridge binary inside `binary_dir`
    #[serde(default = "default_binary_name")]
    pub binary_name: String,

    /// How screen and lock state are read from the device
    #[serde(default)]
    pub probe_mode: ProbeMode,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMode {
    /// `service call` probes returning a binary parcel
    BinaryResult,
    /// `dumpsys nfc` screen state line
    #[default]
    StateDump,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct UnlockConfig {
    /// PIN typed on the lock screen; empty skips PIN entry
    #[serde(default)]
    pub pin: String,

    #[serde(default = "default_wake_attempts")]
    pub wake_attempts: u32,

    #[serde(default = "default_unlock_attempts")]
    pub unlock_attempts: u32,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Pause between the keystrokes of the unlock sequence
    #[serde(default = "default_keystroke_delay_ms")]
    pub keystroke_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraConfig {
    /// Intent action used to bring the camera app to the foreground
    #[serde(default = "default_intent_action")]
    pub intent_action: String,

    /// Idle time after which a photo re-wakes the device and reopens the camera
    #[serde(default = "default_camera_open_timeout")]
    pub camera_open_timeout_seconds: u64,

    /// Idle time after the last camera action before the device is locked
    #[serde(default = "default_inactivity_lock")]
    pub inactivity_lock_seconds: u64,

    #[serde(default = "default_countdown_seconds")]
    pub countdown_seconds: u64,

    /// Subtracted from the countdown so the shutter lands on zero
    #[serde(default = "default_shutter_adjustment_ms")]
    pub shutter_adjustment_ms: u64,

    /// Wait for the camera UI after waking the device
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default = "default_lock_animation_ms")]
    pub lock_animation_ms: u64,

    #[serde(default = "default_focus_interval")]
    pub focus_interval_seconds: u64,

    /// Upper bound on how long background timers wait for the camera gate
    #[serde(default = "default_gate_wait")]
    pub gate_wait_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DownloadConfig {
    /// Device folder scanned for new pictures
    #[serde(default = "default_remote_dir")]
    pub remote_dir: String,

    /// Case-insensitive regular expression selecting downloadable files
    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,

    #[serde(default)]
    pub delete_after_download: bool,

    #[serde(default = "default_download_interval")]
    pub interval_seconds: u64,

    /// Delay between the two listings compared for stability
    #[serde(default = "default_stability_delay_ms")]
    pub stability_delay_ms: u64,

    /// Delays of the download attempts scheduled after each photo
    #[serde(default = "default_cascade_ms")]
    pub cascade_ms: Vec<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PublishConfig {
    /// Raw pulls and token markers
    #[serde(default = "default_working_dir")]
    pub working_dir: String,

    /// Root of the bucketed folders read by the slideshow
    #[serde(default = "default_publish_dir")]
    pub publish_dir: String,

    /// File stem with a `{counter}` or `{counter:0N}` placeholder
    #[serde(default = "default_filename_pattern")]
    pub filename_pattern: String,

    /// Number of counter values per bucket folder
    #[serde(default = "default_bucket_size")]
    pub bucket_size: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// Entries kept by the activity log
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl BoothConfig {
    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("bridge.binary_dir", default_binary_dir())?
            .set_default("bridge.binary_name", default_binary_name())?
            .set_default("bridge.probe_mode", "state_dump")?
            .set_default("unlock.pin", "")?
            .set_default("unlock.wake_attempts", default_wake_attempts())?
            .set_default("unlock.unlock_attempts", default_unlock_attempts())?
            .set_default("unlock.poll_interval_ms", default_poll_interval_ms())?
            .set_default("unlock.keystroke_delay_ms", default_keystroke_delay_ms())?
            .set_default("camera.intent_action", default_intent_action())?
            .set_default(
                "camera.camera_open_timeout_seconds",
                default_camera_open_timeout(),
            )?
            .set_default("camera.inactivity_lock_seconds", default_inactivity_lock())?
            .set_default("camera.countdown_seconds", default_countdown_seconds())?
            .set_default("camera.shutter_adjustment_ms", default_shutter_adjustment_ms())?
            .set_default("camera.settle_ms", default_settle_ms())?
            .set_default("camera.lock_animation_ms", default_lock_animation_ms())?
            .set_default("camera.focus_interval_seconds", default_focus_interval())?
            .set_default("camera.gate_wait_seconds", default_gate_wait())?
            .set_default("download.remote_dir", default_remote_dir())?
            .set_default("download.file_pattern", default_file_pattern())?
            .set_default("download.delete_after_download", false)?
            .set_default("download.interval_seconds", default_download_interval())?
            .set_default("download.stability_delay_ms", default_stability_delay_ms())?
            .set_default("download.cascade_ms", default_cascade_ms())?
            .set_default("publish.working_dir", default_working_dir())?
            .set_default("publish.publish_dir", default_publish_dir())?
            .set_default("publish.filename_pattern", default_filename_pattern())?
            .set_default("publish.bucket_size", default_bucket_size())?
            .set_default("system.log_capacity", default_log_capacity() as i64)?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            // BOOTHCAM_CAMERA__INTENT_ACTION: keys contain underscores themselves
            .add_source(
                Environment::with_prefix("BOOTHCAM")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: BoothConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bridge.binary_name.trim().is_empty() {
            return Err(ConfigError::Message(
                "Bridge binary name must not be empty".to_string(),
            ));
        }

        if self.unlock.wake_attempts == 0 || self.unlock.unlock_attempts == 0 {
            return Err(ConfigError::Message(
                "Wake and unlock attempts must be greater than 0".to_string(),
            ));
        }

        if self.unlock.poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Poll interval must be greater than 0".to_string(),
            ));
        }

        if !self.unlock.pin.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::Message(
                "PIN code may only contain digits".to_string(),
            ));
        }

        if self.camera.focus_interval_seconds == 0 || self.download.interval_seconds == 0 {
            return Err(ConfigError::Message(
                "Focus and download intervals must be greater than 0".to_string(),
            ));
        }

        if self.download.cascade_ms.is_empty() {
            return Err(ConfigError::Message(
                "Download cascade must contain at least one delay".to_string(),
            ));
        }

        if let Err(e) = self.download.file_regex() {
            return Err(ConfigError::Message(format!(
                "Invalid download file pattern '{}': {}",
                self.download.file_pattern, e
            )));
        }

        if self.publish.bucket_size == 0 {
            return Err(ConfigError::Message(
                "Publish bucket size must be greater than 0".to_string(),
            ));
        }

        if !self.publish.filename_pattern.contains(COUNTER_PLACEHOLDER) {
            return Err(ConfigError::Message(
                "Publish filename pattern must contain a {counter} placeholder".to_string(),
            ));
        }

        if self.system.log_capacity == 0 || self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Log and event bus capacities must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl UnlockConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn keystroke_delay(&self) -> Duration {
        Duration::from_millis(self.keystroke_delay_ms)
    }
}

impl CameraConfig {
    pub fn camera_open_timeout(&self) -> Duration {
        Duration::from_secs(self.camera_open_timeout_seconds)
    }

    pub fn inactivity_lock(&self) -> Duration {
        Duration::from_secs(self.inactivity_lock_seconds)
    }

    pub fn countdown(&self) -> Duration {
        Duration::from_secs(self.countdown_seconds)
    }

    pub fn shutter_adjustment(&self) -> Duration {
        Duration::from_millis(self.shutter_adjustment_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn lock_animation(&self) -> Duration {
        Duration::from_millis(self.lock_animation_ms)
    }

    pub fn focus_interval(&self) -> Duration {
        Duration::from_secs(self.focus_interval_seconds)
    }

    pub fn gate_wait(&self) -> Duration {
        Duration::from_secs(self.gate_wait_seconds)
    }
}

impl DownloadConfig {
    pub fn file_regex(&self) -> Result<Regex, regex::Error> {
        RegexBuilder::new(&self.file_pattern)
            .case_insensitive(true)
            .build()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn stability_delay(&self) -> Duration {
        Duration::from_millis(self.stability_delay_ms)
    }

    pub fn cascade(&self) -> Vec<Duration> {
        self.cascade_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }
}

impl Default for BoothConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeConfig {
                binary_dir: default_binary_dir(),
                binary_name: default_binary_name(),
                probe_mode: ProbeMode::default(),
            },
            unlock: UnlockConfig {
                pin: String::new(),
                wake_attempts: default_wake_attempts(),
                unlock_attempts: default_unlock_attempts(),
                poll_interval_ms: default_poll_interval_ms(),
                keystroke_delay_ms: default_keystroke_delay_ms(),
            },
            camera: CameraConfig {
                intent_action: default_intent_action(),
                camera_open_timeout_seconds: default_camera_open_timeout(),
                inactivity_lock_seconds: default_inactivity_lock(),
                countdown_seconds: default_countdown_seconds(),
                shutter_adjustment_ms: default_shutter_adjustment_ms(),
                settle_ms: default_settle_ms(),
                lock_animation_ms: default_lock_animation_ms(),
                focus_interval_seconds: default_focus_interval(),
                gate_wait_seconds: default_gate_wait(),
            },
            download: DownloadConfig {
                remote_dir: default_remote_dir(),
                file_pattern: default_file_pattern(),
                delete_after_download: false,
                interval_seconds: default_download_interval(),
                stability_delay_ms: default_stability_delay_ms(),
                cascade_ms: default_cascade_ms(),
            },
            publish: PublishConfig {
                working_dir: default_working_dir(),
                publish_dir: default_publish_dir(),
                filename_pattern: default_filename_pattern(),
                bucket_size: default_bucket_size(),
            },
            system: SystemConfig {
                log_capacity: default_log_capacity(),
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_binary_dir() -> String {
    ".".to_string()
}
fn default_binary_name() -> String {
    if cfg!(windows) {
        "adb.exe".to_string()
    } else {
        "adb".to_string()
    }
}

fn default_wake_attempts() -> u32 {
    5
}
fn default_unlock_attempts() -> u32 {
    10
}
fn default_poll_interval_ms() -> u64 {
    200
}
fn default_keystroke_delay_ms() -> u64 {
    150
}

fn default_intent_action() -> String {
    "android.media.action.STILL_IMAGE_CAMERA".to_string()
}
fn default_camera_open_timeout() -> u64 {
    60
}
fn default_inactivity_lock() -> u64 {
    300
}
fn default_countdown_seconds() -> u64 {
    5
}
fn default_shutter_adjustment_ms() -> u64 {
    200
}
fn default_settle_ms() -> u64 {
    1000
}
fn default_lock_animation_ms() -> u64 {
    500
}
fn default_focus_interval() -> u64 {
    20
}
fn default_gate_wait() -> u64 {
    30
}

fn default_remote_dir() -> String {
    "/sdcard/DCIM/Camera".to_string()
}
fn default_file_pattern() -> String {
    r"\.(jpe?g|png)$".to_string()
}
fn default_download_interval() -> u64 {
    10
}
fn default_stability_delay_ms() -> u64 {
    200
}
fn default_cascade_ms() -> Vec<u64> {
    vec![1500, 2000, 4000, 10000, 30000]
}

fn default_working_dir() -> String {
    "./working".to_string()
}
fn default_publish_dir() -> String {
    "./publish".to_string()
}
fn default_filename_pattern() -> String {
    "booth_{counter:05}".to_string()
}
fn default_bucket_size() -> u64 {
    100
}

fn default_log_capacity() -> usize {
    200
}
fn default_event_bus_capacity() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = BoothConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.unlock.wake_attempts, 5);
        assert_eq!(config.unlock.unlock_attempts, 10);
        assert_eq!(config.unlock.poll_interval(), Duration::from_millis(200));
        assert_eq!(config.download.cascade().len(), 5);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[bridge]
probe_mode = "binary_result"

[unlock]
pin = "1234"

[publish]
bucket_size = 50
"#
        )
        .unwrap();

        let config = BoothConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.bridge.probe_mode, ProbeMode::BinaryResult);
        assert_eq!(config.unlock.pin, "1234");
        assert_eq!(config.publish.bucket_size, 50);
        assert_eq!(config.camera.countdown_seconds, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = BoothConfig::load_from_file("/nonexistent/boothcam-test.toml").unwrap();
        assert_eq!(config.download.remote_dir, "/sdcard/DCIM/Camera");
        assert_eq!(config.system.log_capacity, 200);
    }

    #[test]
    fn test_environment_overrides_multi_word_keys() {
        std::env::set_var("BOOTHCAM_CAMERA__INTENT_ACTION", "android.media.action.VIDEO_CAMERA");
        let config = BoothConfig::load_from_file("/nonexistent/boothcam-env.toml");
        std::env::remove_var("BOOTHCAM_CAMERA__INTENT_ACTION");

        let config = config.unwrap();
        assert_eq!(
            config.camera.intent_action,
            "android.media.action.VIDEO_CAMERA"
        );
    }

    #[test]
    fn test_config_validation() {
        let mut config = BoothConfig::default();

        config.publish.bucket_size = 0;
        assert!(config.validate().is_err());
        config.publish.bucket_size = 100;

        config.publish.filename_pattern = "booth".to_string();
        assert!(config.validate().is_err());
        config.publish.filename_pattern = "booth_{counter}".to_string();
        assert!(config.validate().is_ok());

        config.download.file_pattern = "(".to_string();
        assert!(config.validate().is_err());
        config.download.file_pattern = default_file_pattern();

        config.unlock.pin = "12a4".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_regex_is_case_insensitive() {
        let config = BoothConfig::default();
        let regex = config.download.file_regex().unwrap();
        assert!(regex.is_match("IMG_0001.JPG"));
        assert!(regex.is_match("img_0001.jpeg"));
        assert!(!regex.is_match("VID_0001.mp4"));
    }
}
