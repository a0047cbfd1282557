pub mod activity_log;
pub mod bridge;
pub mod config;
pub mod controller;
pub mod countdown;
pub mod device;
pub mod error;
pub mod events;
pub mod keyboard_input;
pub mod timer;
pub mod transfer;

pub use activity_log::{ActivityLog, LogEntry, LogLevel, LogSubscription};
pub use bridge::{AdbRunner, CommandRunner, DeviceBridge, DeviceSession, SessionState};
pub use config::{BoothConfig, ProbeMode};
pub use controller::{CameraController, DeviceStatus, PhotoOutcome};
pub use countdown::CaptureCountdown;
pub use device::{prober_for, DeviceProber, ScreenState};
pub use error::{BoothError, EventBusError, Result};
pub use events::{BoothEvent, CameraAction, EventBus, EventFilter, EventReceiver, LoopKind};
pub use keyboard_input::{KeyAction, KeyboardTrigger};
pub use timer::{LoopStart, PeriodicLoop};
pub use transfer::{DownloadPipeline, DownloadReport, FilenamePattern, PublishLayout};
