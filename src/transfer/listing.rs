use crate::bridge::DeviceBridge;
use crate::error::Result;
use regex::Regex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, trace};

/// A device file and its size signature at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileRecord {
    pub name: String,
    pub blocks: u64,
}

/// Decides which device files are completely written and safe to pull
pub struct StabilityDetector {
    remote_dir: String,
    pattern: Regex,
    delay: Duration,
}

impl StabilityDetector {
    pub fn new(remote_dir: String, pattern: Regex, delay: Duration) -> Self {
        Self {
            remote_dir,
            pattern,
            delay,
        }
    }

    pub fn remote_path(&self, name: &str) -> String {
        format!("{}/{}", self.remote_dir.trim_end_matches('/'), name)
    }

    pub async fn list_files(&self, bridge: &DeviceBridge) -> Result<Vec<RemoteFileRecord>> {
        let lines = bridge.list_sizes(&self.remote_dir).await?;
        Ok(parse_listing(&lines))
    }

    /// Files unchanged across two listings taken `delay` apart, in listing order
    pub async fn stable_files(&self, bridge: &DeviceBridge) -> Result<Vec<String>> {
        let first = self.list_files(bridge).await?;
        sleep(self.delay).await;
        let second = self.list_files(bridge).await?;

        let stable = select_stable(&first, &second, &self.pattern);
        debug!(
            "{} of {} listed files are stable in {}",
            stable.len(),
            first.len(),
            self.remote_dir
        );
        Ok(stable)
    }
}

/// Parse `<blocks> <filename>` lines; anything else is skipped
pub fn parse_listing(lines: &[String]) -> Vec<RemoteFileRecord> {
    lines
        .iter()
        .filter_map(|line| {
            let (blocks, name) = line.trim().split_once(char::is_whitespace)?;
            let blocks = blocks.parse::<u64>().ok()?;
            let name = name.trim();
            if name.is_empty() {
                trace!("Skipping listing line without a name: {:?}", line);
                return None;
            }
            Some(RemoteFileRecord {
                name: name.to_string(),
                blocks,
            })
        })
        .collect()
}

pub fn select_stable(
    first: &[RemoteFileRecord],
    second: &[RemoteFileRecord],
    pattern: &Regex,
) -> Vec<String> {
    let later: HashMap<&str, u64> = second
        .iter()
        .map(|record| (record.name.as_str(), record.blocks))
        .collect();

    first
        .iter()
        .filter(|record| pattern.is_match(&record.name))
        .filter(|record| record.blocks > 0)
        .filter(|record| later.get(record.name.as_str()) == Some(&record.blocks))
        .map(|record| record.name.clone())
        .collect()
}
