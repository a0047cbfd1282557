use crate::bridge::{CommandRunner, DeviceBridge};
use crate::error::{BoothError, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle of the controller's connection to the phone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Unbound,
    Bound { device_detected: bool },
}

/// One logical connection to a single device
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSession {
    pub serial: Option<String>,
    pub authorized: bool,
    pub binary_valid: bool,
}

impl DeviceSession {
    /// Check the binary and look for an attached device.
    ///
    /// A session without a detected device is still usable: the bridge then
    /// talks to whatever single device it finds on its own.
    pub async fn open(runner: &Arc<dyn CommandRunner>) -> Result<Self> {
        if !runner.binary_available() {
            return Err(BoothError::LaunchFailure {
                binary: "bridge".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "bridge binary not found in configured folder",
                ),
            });
        }

        let bridge = DeviceBridge::new(Arc::clone(runner), None);
        let lines = bridge.run(&["devices"]).await?;
        let devices = parse_devices(&lines);
        debug!("Bridge reports {} devices", devices.len());

        if devices.len() > 1 {
            warn!(
                "{} devices attached, using the first authorized one",
                devices.len()
            );
        }

        let session = match devices
            .iter()
            .find(|(_, state)| state == "device")
            .or_else(|| devices.first())
        {
            Some((serial, state)) => {
                let authorized = state == "device";
                if authorized {
                    info!("Bound to device {}", serial);
                } else {
                    warn!(
                        "Device {} is '{}', accept the debugging prompt on the phone",
                        serial, state
                    );
                }
                Self {
                    serial: Some(serial.clone()),
                    authorized,
                    binary_valid: true,
                }
            }
            None => {
                warn!("No device detected by the bridge");
                Self {
                    serial: None,
                    authorized: false,
                    binary_valid: true,
                }
            }
        };

        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        SessionState::Bound {
            device_detected: self.serial.is_some(),
        }
    }

    pub fn bridge(&self, runner: &Arc<dyn CommandRunner>) -> DeviceBridge {
        DeviceBridge::new(Arc::clone(runner), self.serial.clone())
    }
}

/// Parse `<serial>\t<state>` lines of the device listing
pub fn parse_devices(lines: &[String]) -> Vec<(String, String)> {
    lines
        .iter()
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(serial), Some(state)) => Some((serial.to_string(), state.to_string())),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::ScriptedRunner;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_devices() {
        let parsed = parse_devices(&lines(&[
            "* daemon started successfully",
            "List of devices attached",
            "R58M12345\tdevice",
            "emulator-5554\tunauthorized",
            "",
        ]));
        assert_eq!(
            parsed,
            vec![
                ("R58M12345".to_string(), "device".to_string()),
                ("emulator-5554".to_string(), "unauthorized".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_open_prefers_authorized_device() {
        let runner: Arc<dyn CommandRunner> = Arc::new(ScriptedRunner::new(|_| {
            Ok(lines(&[
                "List of devices attached",
                "AAA\tunauthorized",
                "BBB\tdevice",
            ]))
        }));
        let session = DeviceSession::open(&runner).await.unwrap();
        assert_eq!(session.serial.as_deref(), Some("BBB"));
        assert!(session.authorized);
        assert_eq!(
            session.state(),
            SessionState::Bound {
                device_detected: true
            }
        );
    }

    #[tokio::test]
    async fn test_open_without_device() {
        let runner: Arc<dyn CommandRunner> =
            Arc::new(ScriptedRunner::new(|_| Ok(lines(&["List of devices attached"]))));
        let session = DeviceSession::open(&runner).await.unwrap();
        assert!(session.serial.is_none());
        assert_eq!(
            session.state(),
            SessionState::Bound {
                device_detected: false
            }
        );
    }
}
