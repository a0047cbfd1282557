pub mod commands;
mod runner;
mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use runner::{AdbRunner, CommandRunner, DeviceBridge};
pub use session::{parse_devices, DeviceSession, SessionState};
