//! In-memory stand-ins for the bridge binary used by unit tests.

use crate::bridge::{commands, CommandRunner};
use crate::error::{BoothError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::Path;
use std::time::Duration;

type Responder = Box<dyn Fn(&[String]) -> Result<Vec<String>> + Send + Sync>;

/// Answers every command through a closure and records the arguments
pub struct ScriptedRunner {
    responder: Responder,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&[String]) -> Result<Vec<String>> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn execute(&self, args: &[String]) -> Result<Vec<String>> {
        self.calls.lock().push(args.to_vec());
        (self.responder)(args)
    }
}

/// A file on the simulated phone. Each listing consumes one size until the
/// last one, which then sticks.
#[derive(Debug, Clone)]
pub struct FakeFile {
    pub sizes: VecDeque<u64>,
    /// Number of listings after which the file disappears
    pub vanish_after: Option<u32>,
    listed: u32,
}

impl FakeFile {
    pub fn stable(size: u64) -> Self {
        Self::growing(&[size])
    }

    pub fn growing(sizes: &[u64]) -> Self {
        Self {
            sizes: sizes.iter().copied().collect(),
            vanish_after: None,
            listed: 0,
        }
    }

    pub fn vanishing(size: u64, after: u32) -> Self {
        Self {
            vanish_after: Some(after),
            ..Self::stable(size)
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub screen_on: bool,
    pub locked: bool,
    pub pin: String,
    /// Interactive probes answered "off" after a wake before the screen comes on
    pub wake_delay_probes: u32,
    pub never_wakes: bool,
    pub files: BTreeMap<String, FakeFile>,
    pub failing_pulls: HashSet<String>,
    pub state_dump_value: Option<String>,
    /// The trust service answers with something other than a parcel
    pub garbled_trust_probe: bool,
    pub shutter_count: u32,
    typed: Option<String>,
    pending_wake: Option<u32>,
}

/// Simulated phone answering the bridge command surface
pub struct FakeDevice {
    pub state: Mutex<FakeState>,
    log: Mutex<Vec<Vec<String>>>,
    command_delay: Duration,
    remote_dir: String,
}

impl FakeDevice {
    pub fn new(remote_dir: &str) -> Self {
        Self {
            state: Mutex::new(FakeState {
                screen_on: true,
                ..Default::default()
            }),
            log: Mutex::new(Vec::new()),
            command_delay: Duration::ZERO,
            remote_dir: remote_dir.to_string(),
        }
    }

    /// Every command takes this long, to make overlapping sequences visible
    pub fn with_command_delay(mut self, delay: Duration) -> Self {
        self.command_delay = delay;
        self
    }

    pub fn with_state<F: FnOnce(&mut FakeState)>(self, update: F) -> Self {
        update(&mut self.state.lock());
        self
    }

    pub fn add_file(&self, name: &str, file: FakeFile) {
        self.state.lock().files.insert(name.to_string(), file);
    }

    /// Commands with the serial prefix removed, in issue order
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.log.lock().clone()
    }

    pub fn count(&self, needle: &[&str]) -> usize {
        self.commands()
            .iter()
            .filter(|c| c.iter().map(String::as_str).eq(needle.iter().copied()))
            .count()
    }

    pub fn count_prefix(&self, prefix: &[&str]) -> usize {
        self.commands()
            .iter()
            .filter(|c| {
                c.len() >= prefix.len()
                    && c.iter()
                        .zip(prefix.iter())
                        .all(|(a, b)| a.as_str() == *b)
            })
            .count()
    }

    fn respond(&self, args: &[String]) -> Result<Vec<String>> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let mut state = self.state.lock();

        match args.as_slice() {
            ["devices"] => Ok(vec![
                "List of devices attached".to_string(),
                "FAKE0001\tdevice".to_string(),
            ]),
            ["shell", "input", "keyevent", key] => {
                match *key {
                    commands::KEY_WAKE => {
                        if !state.screen_on && !state.never_wakes {
                            state.pending_wake = Some(state.wake_delay_probes);
                        }
                    }
                    commands::KEY_POWER => {
                        state.screen_on = false;
                        state.locked = true;
                    }
                    commands::KEY_ENTER => {
                        if state.screen_on && state.typed.as_deref() == Some(state.pin.as_str()) {
                            state.locked = false;
                        }
                        state.typed = None;
                    }
                    commands::KEY_SHUTTER => {
                        state.shutter_count += 1;
                        let name = format!("IMG_{:04}.jpg", state.shutter_count);
                        state.files.insert(name, FakeFile::stable(2048));
                    }
                    _ => {}
                }
                Ok(vec![])
            }
            ["shell", "input", "text", text] => {
                state.typed = Some(text.to_string());
                Ok(vec![])
            }
            ["shell", "am", "start", "-a", action] => {
                Ok(vec![format!("Starting: Intent {{ act={} }}", action)])
            }
            ["shell", "service", "call", "power", "12"] => {
                let on = Self::interactive_now(&mut state);
                Ok(vec![parcel(on)])
            }
            ["shell", "service", "call", "trust", "7"] => {
                if state.garbled_trust_probe {
                    Ok(vec!["Service trust does not exist".to_string()])
                } else {
                    Ok(vec![parcel(state.locked)])
                }
            }
            ["shell", "dumpsys", "nfc"] => {
                let on = Self::interactive_now(&mut state);
                let value = state.state_dump_value.clone().unwrap_or_else(|| {
                    format!(
                        "{}_{}",
                        if on { "ON" } else { "OFF" },
                        if state.locked { "LOCKED" } else { "UNLOCKED" }
                    )
                });
                Ok(vec![
                    "mState=on".to_string(),
                    format!("{}{}", commands::SCREEN_STATE_PREFIX, value),
                    "mIsZeroClickRequested=false".to_string(),
                ])
            }
            ["shell", "ls", "-s", _dir] => {
                let mut out = vec![format!("total {}", state.files.len())];
                let mut vanished = Vec::new();
                for (name, file) in state.files.iter_mut() {
                    if let Some(limit) = file.vanish_after {
                        if file.listed >= limit {
                            vanished.push(name.clone());
                            continue;
                        }
                    }
                    file.listed += 1;
                    let size = if file.sizes.len() > 1 {
                        file.sizes.pop_front().unwrap_or(0)
                    } else {
                        file.sizes.front().copied().unwrap_or(0)
                    };
                    out.push(format!("{:>6} {}", size, name));
                }
                for name in vanished {
                    state.files.remove(&name);
                }
                Ok(out)
            }
            ["pull", remote, local_dir] => {
                let remote: &str = remote;
                let name = remote.rsplit('/').next().unwrap_or(remote).to_string();
                if state.failing_pulls.contains(&name) || !state.files.contains_key(&name) {
                    return Ok(vec![format!(
                        "adb: error: failed to stat remote object '{}'",
                        remote
                    )]);
                }
                std::fs::write(Path::new(local_dir).join(&name), b"jpeg")?;
                Ok(vec![format!(
                    "{}: 1 file pulled, 0 skipped. 0.4 MB/s (2048 bytes in 0.005s)",
                    remote
                )])
            }
            ["shell", "rm", paths @ ..] if !paths.is_empty() => {
                let prefix = format!("{}/", self.remote_dir);
                let mut out = Vec::new();
                for &remote in paths {
                    let name = remote.strip_prefix(prefix.as_str()).unwrap_or(remote);
                    if state.files.remove(name).is_none() {
                        out.push(format!("rm: {}: No such file or directory", remote));
                    }
                }
                Ok(out)
            }
            other => Err(BoothError::unexpected_output(
                other.join(" "),
                "command not simulated",
            )),
        }
    }

    fn interactive_now(state: &mut FakeState) -> bool {
        if let Some(remaining) = state.pending_wake {
            if remaining == 0 {
                state.screen_on = true;
                state.pending_wake = None;
            } else {
                state.pending_wake = Some(remaining - 1);
            }
        }
        state.screen_on
    }
}

#[async_trait]
impl CommandRunner for FakeDevice {
    async fn execute(&self, args: &[String]) -> Result<Vec<String>> {
        let mut stripped: Vec<String> = if args.first().map(String::as_str) == Some("-s") {
            args.iter().skip(2).cloned().collect()
        } else {
            args.to_vec()
        };
        if stripped.first().map(String::as_str) == Some("shell") {
            let line = stripped[1..].join(" ");
            stripped.truncate(1);
            stripped.extend(split_shell_words(&line));
        }
        self.log.lock().push(stripped.clone());
        if !self.command_delay.is_zero() {
            tokio::time::sleep(self.command_delay).await;
        }
        self.respond(&stripped)
    }
}

/// Word splitting as the device shell does it: whitespace separates words,
/// single quotes keep everything literal, a backslash escapes one character
pub fn split_shell_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                for quoted in chars.by_ref() {
                    if quoted == '\'' {
                        break;
                    }
                    word.push(quoted);
                }
            }
            '\\' => {
                in_word = true;
                if let Some(escaped) = chars.next() {
                    word.push(escaped);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                word.push(c);
            }
        }
    }
    if in_word {
        words.push(word);
    }
    words
}

/// `service call` answer for a boolean result
pub fn parcel(value: bool) -> String {
    format!(
        "Result: Parcel(00000000 {:08x}   '........')",
        u32::from(value)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_shell_words() {
        assert_eq!(
            split_shell_words("rm '/sdcard/IMG 0002.jpg'"),
            vec!["rm", "/sdcard/IMG 0002.jpg"]
        );
        assert_eq!(
            split_shell_words(r"ls -s '/sdcard/Bob'\''s Camera'"),
            vec!["ls", "-s", "/sdcard/Bob's Camera"]
        );
        assert_eq!(
            split_shell_words("rm /sdcard/IMG 0002.jpg"),
            vec!["rm", "/sdcard/IMG", "0002.jpg"]
        );
        assert_eq!(split_shell_words("ls ''"), vec!["ls", ""]);
    }
}
