use crate::bridge::{commands, DeviceBridge};
use crate::config::ProbeMode;
use crate::error::{BoothError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

/// Screen power and keyguard state as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenState {
    pub screen_on: bool,
    pub locked: bool,
}

/// Answers questions about the phone's screen by running bridge commands
#[async_trait]
pub trait DeviceProber: Send + Sync {
    async fn is_interactive(&self, bridge: &DeviceBridge) -> Result<bool>;

    async fn is_locked(&self, bridge: &DeviceBridge) -> Result<bool>;

    async fn is_interactive_and_unlocked(&self, bridge: &DeviceBridge) -> Result<bool> {
        Ok(self.is_interactive(bridge).await? && !self.is_locked(bridge).await?)
    }

    fn mode(&self) -> ProbeMode;
}

pub fn prober_for(mode: ProbeMode) -> Arc<dyn DeviceProber> {
    match mode {
        ProbeMode::BinaryResult => Arc::new(BinaryResultProber),
        ProbeMode::StateDump => Arc::new(StateDumpProber),
    }
}

/// Reads `service call` parcels; each fact costs one command
pub struct BinaryResultProber;

#[async_trait]
impl DeviceProber for BinaryResultProber {
    async fn is_interactive(&self, bridge: &DeviceBridge) -> Result<bool> {
        let output = bridge.shell(&commands::PROBE_INTERACTIVE).await?;
        parse_result_parcel(&output, &commands::PROBE_INTERACTIVE.join(" "))
    }

    async fn is_locked(&self, bridge: &DeviceBridge) -> Result<bool> {
        let output = bridge.shell(&commands::PROBE_LOCKED).await?;
        parse_result_parcel(&output, &commands::PROBE_LOCKED.join(" "))
    }

    fn mode(&self) -> ProbeMode {
        ProbeMode::BinaryResult
    }
}

/// Reads the screen state line of the NFC service dump, which carries both
/// facts at once
pub struct StateDumpProber;

impl StateDumpProber {
    async fn screen_state(&self, bridge: &DeviceBridge) -> Result<ScreenState> {
        let output = bridge.shell(&commands::PROBE_STATE_DUMP).await?;
        parse_screen_state(&output)
    }
}

#[async_trait]
impl DeviceProber for StateDumpProber {
    async fn is_interactive(&self, bridge: &DeviceBridge) -> Result<bool> {
        Ok(self.screen_state(bridge).await?.screen_on)
    }

    async fn is_locked(&self, bridge: &DeviceBridge) -> Result<bool> {
        Ok(self.screen_state(bridge).await?.locked)
    }

    async fn is_interactive_and_unlocked(&self, bridge: &DeviceBridge) -> Result<bool> {
        let state = self.screen_state(bridge).await?;
        Ok(state.screen_on && !state.locked)
    }

    fn mode(&self) -> ProbeMode {
        ProbeMode::StateDump
    }
}

/// Interpret `Result: Parcel(00000000 00000001 '........')`.
///
/// The first word is the transaction status, the second the returned value;
/// its low bit is the boolean.
pub fn parse_result_parcel(lines: &[String], command: &str) -> Result<bool> {
    let line = lines
        .iter()
        .map(|l| l.trim())
        .find(|l| l.starts_with("Result"))
        .ok_or_else(|| BoothError::ParseFailure {
            command: command.to_string(),
        })?;
    trace!("Parcel line: {}", line);

    let body = line
        .split_once('(')
        .map(|(_, rest)| rest)
        .unwrap_or_default();
    let value = body
        .split_whitespace()
        .take_while(|word| !word.starts_with('\''))
        .nth(1)
        .and_then(|word| u32::from_str_radix(word.trim_end_matches(')'), 16).ok())
        .ok_or_else(|| BoothError::ParseFailure {
            command: command.to_string(),
        })?;

    Ok(value & 1 == 1)
}

pub fn parse_screen_state(lines: &[String]) -> Result<ScreenState> {
    let value = lines
        .iter()
        .map(|l| l.trim())
        .find_map(|l| l.strip_prefix(commands::SCREEN_STATE_PREFIX))
        .ok_or_else(|| BoothError::StateNotFound {
            prefix: commands::SCREEN_STATE_PREFIX.to_string(),
        })?
        .trim();

    let (screen_on, locked) = match value.to_ascii_uppercase().as_str() {
        "ON_UNLOCKED" => (true, false),
        "ON_LOCKED" => (true, true),
        "OFF_UNLOCKED" => (false, false),
        "OFF_LOCKED" => (false, true),
        _ => {
            return Err(BoothError::UnexpectedState {
                value: value.to_string(),
            })
        }
    };

    Ok(ScreenState { screen_on, locked })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::{parcel, FakeDevice, ScriptedRunner};

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_state_dump_mapping() {
        let cases = [
            ("ON_UNLOCKED", true, false),
            ("ON_LOCKED", true, true),
            ("OFF_UNLOCKED", false, false),
            ("OFF_LOCKED", false, true),
        ];
        for (value, screen_on, locked) in cases {
            let state =
                parse_screen_state(&lines(&[&format!("  mScreenState={}  ", value)])).unwrap();
            assert_eq!(state, ScreenState { screen_on, locked }, "value {}", value);
        }
    }

    #[test]
    fn test_state_dump_is_case_insensitive() {
        let state = parse_screen_state(&lines(&["mScreenState=on_locked"])).unwrap();
        assert!(state.screen_on && state.locked);
    }

    #[test]
    fn test_state_dump_unknown_value() {
        match parse_screen_state(&lines(&["mScreenState=ON_SLEEPING"])) {
            Err(BoothError::UnexpectedState { value }) => assert_eq!(value, "ON_SLEEPING"),
            other => panic!("Expected UnexpectedState, got {:?}", other),
        }
    }

    #[test]
    fn test_state_dump_missing_line() {
        assert!(matches!(
            parse_screen_state(&lines(&["mState=on", "mAlwaysOnState=0"])),
            Err(BoothError::StateNotFound { .. })
        ));
    }

    #[test]
    fn test_result_parcel() {
        assert!(parse_result_parcel(&[parcel(true)], "probe").unwrap());
        assert!(!parse_result_parcel(&[parcel(false)], "probe").unwrap());
        assert!(parse_result_parcel(
            &lines(&["", "Result: Parcel(00000000 00000001   '........')"]),
            "probe"
        )
        .unwrap());
    }

    #[test]
    fn test_result_parcel_missing() {
        assert!(matches!(
            parse_result_parcel(&lines(&["service: not found"]), "probe"),
            Err(BoothError::ParseFailure { .. })
        ));
        assert!(matches!(
            parse_result_parcel(&lines(&["Result: Parcel(garbage)"]), "probe"),
            Err(BoothError::ParseFailure { .. })
        ));
    }

    #[tokio::test]
    async fn test_state_dump_combined_probe_uses_one_command() {
        let device = Arc::new(FakeDevice::new("/sdcard/DCIM/Camera"));
        let bridge = DeviceBridge::new(device.clone(), None);

        assert!(StateDumpProber
            .is_interactive_and_unlocked(&bridge)
            .await
            .unwrap());
        assert_eq!(device.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_binary_result_prober() {
        let runner = Arc::new(ScriptedRunner::new(|args| {
            Ok(match args.get(3).map(String::as_str) {
                Some("power") => vec![parcel(true)],
                Some("trust") => vec![parcel(true)],
                _ => vec![],
            })
        }));
        let bridge = DeviceBridge::new(runner.clone(), None);
        let prober = prober_for(ProbeMode::BinaryResult);

        assert!(prober.is_interactive(&bridge).await.unwrap());
        assert!(prober.is_locked(&bridge).await.unwrap());
        assert!(!prober.is_interactive_and_unlocked(&bridge).await.unwrap());
        assert_eq!(
            runner.calls()[0],
            vec!["shell", "service", "call", "power", "12"]
        );
    }
}
