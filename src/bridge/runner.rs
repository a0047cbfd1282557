use crate::bridge::commands;
use crate::error::{BoothError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, trace, warn};

/// Executes the device bridge binary.
///
/// `execute` runs to completion and returns every line the process wrote to
/// standard output, in order.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn execute(&self, args: &[String]) -> Result<Vec<String>>;

    /// Whether the binary behind this runner can be launched at all
    fn binary_available(&self) -> bool {
        true
    }
}

/// Runs the real bridge binary from its own folder with no stdin attached
pub struct AdbRunner {
    binary: PathBuf,
    working_dir: PathBuf,
}

impl AdbRunner {
    pub fn new<P: Into<PathBuf>>(binary_dir: P, binary_name: &str) -> Self {
        let working_dir = binary_dir.into();
        Self {
            binary: working_dir.join(binary_name),
            working_dir,
        }
    }
}

#[async_trait]
impl CommandRunner for AdbRunner {
    async fn execute(&self, args: &[String]) -> Result<Vec<String>> {
        let started = Instant::now();
        trace!("Executing {} {}", self.binary.display(), args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BoothError::LaunchFailure {
                binary: self.binary.display().to_string(),
                source: e,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BoothError::system("Bridge stdout was not captured"))?;
        let stderr = child.stderr.take();

        // Drained alongside stdout so a chatty stderr cannot stall the child
        let stderr_task = tokio::spawn(async move {
            let mut buffer = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut buffer).await;
            }
            buffer
        });

        let mut lines = Vec::new();
        let mut reader = BufReader::new(stdout).lines();
        while let Some(line) = reader.next_line().await? {
            lines.push(line);
        }

        let status = child.wait().await?;
        let stderr_output = stderr_task.await.unwrap_or_default();
        if !status.success() {
            warn!(
                "Bridge command '{}' exited with {}: {}",
                args.join(" "),
                status,
                stderr_output.trim()
            );
        }

        debug!(
            "Bridge command '{}' returned {} lines in {:?}",
            args.join(" "),
            lines.len(),
            started.elapsed()
        );
        Ok(lines)
    }

    fn binary_available(&self) -> bool {
        self.binary.is_file()
    }
}

/// Typed access to the bridge command surface, addressed to one device
#[derive(Clone)]
pub struct DeviceBridge {
    runner: Arc<dyn CommandRunner>,
    serial: Option<String>,
}

impl DeviceBridge {
    pub fn new(runner: Arc<dyn CommandRunner>, serial: Option<String>) -> Self {
        Self { runner, serial }
    }

    pub async fn run(&self, args: &[&str]) -> Result<Vec<String>> {
        let mut full = Vec::with_capacity(args.len() + 2);
        if let Some(serial) = &self.serial {
            full.push("-s".to_string());
            full.push(serial.clone());
        }
        full.extend(args.iter().map(|a| a.to_string()));
        self.runner.execute(&full).await
    }

    pub async fn shell(&self, args: &[&str]) -> Result<Vec<String>> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push("shell");
        full.extend_from_slice(args);
        self.run(&full).await
    }

    pub async fn keyevent(&self, key: &str) -> Result<()> {
        self.shell(&["input", "keyevent", key]).await.map(|_| ())
    }

    pub async fn text(&self, text: &str) -> Result<()> {
        self.shell(&["input", "text", text]).await.map(|_| ())
    }

    pub async fn start_intent(&self, action: &str) -> Result<Vec<String>> {
        self.shell(&["am", "start", "-a", action]).await
    }

    pub async fn list_sizes(&self, remote_dir: &str) -> Result<Vec<String>> {
        let dir = shell_quote(remote_dir);
        self.shell(&["ls", "-s", dir.as_str()]).await
    }

    /// Pull one file; the bridge must answer with a single success line
    pub async fn pull(&self, remote_path: &str, local_dir: &str) -> Result<()> {
        let output = self.run(&["pull", remote_path, local_dir]).await?;
        match output.as_slice() {
            [line] if line.contains(commands::PULL_SUCCESS_MARKER) => Ok(()),
            _ => Err(BoothError::PullFailure {
                file: remote_path.to_string(),
                details: if output.is_empty() {
                    "no output".to_string()
                } else {
                    output.join(" | ")
                },
            }),
        }
    }

    pub async fn remove(&self, remote_path: &str) -> Result<()> {
        let path = shell_quote(remote_path);
        self.shell(&["rm", path.as_str()]).await.map(|_| ())
    }
}

/// `adb shell` joins its arguments and the device shell splits them again,
/// so paths have to survive a second round of word splitting
fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}
