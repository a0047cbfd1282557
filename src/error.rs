use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BoothError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Failed to launch bridge binary {binary}: {source}")]
    LaunchFailure {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected output from '{command}': {details}")]
    UnexpectedOutput { command: String, details: String },

    #[error("No result line in output of '{command}'")]
    ParseFailure { command: String },

    #[error("Unexpected device state value: {value}")]
    UnexpectedState { value: String },

    #[error("Device state line '{prefix}' not found")]
    StateNotFound { prefix: String },

    #[error("Device did not wake up after {attempts} attempts")]
    DeviceNotInteractive { attempts: u32 },

    #[error("Device is still locked after {attempts} attempts, check the PIN code")]
    DeviceLocked { attempts: u32 },

    #[error("Failed to pull {file}: {details}")]
    PullFailure { file: String, details: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Timed out after {waited:?} waiting for the {gate} gate")]
    GateTimeout { gate: &'static str, waited: Duration },

    #[error("System error: {message}")]
    System { message: String },
}

impl BoothError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn unexpected_output<C: Into<String>, D: Into<String>>(command: C, details: D) -> Self {
        Self::UnexpectedOutput {
            command: command.into(),
            details: details.into(),
        }
    }

    /// A broken bridge binary cannot be fixed by retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LaunchFailure { .. })
    }
}

pub type Result<T> = std::result::Result<T, BoothError>;

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Receiver lagged behind by {missed} events")]
    Lagged { missed: u64 },

    #[error("Event bus channel closed")]
    ChannelClosed,
}
