use crate::activity_log::ActivityLog;
use crate::bridge::DeviceBridge;
use crate::config::BoothConfig;
use crate::error::{BoothError, Result};
use crate::transfer::{PublishLayout, StabilityDetector};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tracing::debug;

/// Outcome of one download pass
#[derive(Debug, Clone, Default)]
pub struct DownloadReport {
    /// Highest counter used so far; the next search starts after it
    pub last_counter: u64,
    pub published: Vec<PathBuf>,
    pub duplicates: usize,
    pub failures: usize,
}

/// Pulls stable files off the device and publishes them into numbered slots.
///
/// Per file the order is: pull, move into the publish slot, write the token
/// marker, delete on the device. A crash at any point before the marker
/// exists leads to another pull later, never to a lost picture.
pub struct DownloadPipeline {
    detector: StabilityDetector,
    layout: PublishLayout,
    working_dir: PathBuf,
    delete_after_download: bool,
    log: Arc<ActivityLog>,
}

impl DownloadPipeline {
    pub fn new(
        detector: StabilityDetector,
        layout: PublishLayout,
        working_dir: PathBuf,
        delete_after_download: bool,
        log: Arc<ActivityLog>,
    ) -> Self {
        Self {
            detector,
            layout,
            working_dir,
            delete_after_download,
            log,
        }
    }

    pub fn from_config(config: &BoothConfig, log: Arc<ActivityLog>) -> Result<Self> {
        let detector = StabilityDetector::new(
            config.download.remote_dir.clone(),
            config.download.file_regex()?,
            config.download.stability_delay(),
        );
        Ok(Self::new(
            detector,
            PublishLayout::from_config(&config.publish)?,
            PathBuf::from(&config.publish.working_dir),
            config.download.delete_after_download,
            log,
        ))
    }

    /// Download every stable file; only a launch failure aborts the pass
    pub async fn download_all(
        &self,
        bridge: &DeviceBridge,
        last_known_counter: u64,
    ) -> Result<DownloadReport> {
        fs::create_dir_all(&self.working_dir).await?;

        let mut report = DownloadReport {
            last_counter: last_known_counter,
            ..Default::default()
        };

        let files = self.detector.stable_files(bridge).await?;
        for name in files {
            match self.download_one(bridge, &name, report.last_counter).await {
                Ok(Some((counter, path))) => {
                    report.last_counter = counter;
                    report.published.push(path);
                }
                Ok(None) => report.duplicates += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    self.log.error(format!("Download of {} failed: {}", name, e));
                    report.failures += 1;
                }
            }
        }

        Ok(report)
    }

    /// `Ok(None)` when the file had been downloaded before
    async fn download_one(
        &self,
        bridge: &DeviceBridge,
        name: &str,
        last_counter: u64,
    ) -> Result<Option<(u64, PathBuf)>> {
        let remote_path = self.detector.remote_path(name);
        let token = token_path(&self.working_dir, name);

        if fs::try_exists(&token).await? {
            self.log.warning(format!(
                "{} was already downloaded, skipping the pull",
                name
            ));
            self.delete_remote(bridge, &remote_path).await?;
            return Ok(None);
        }

        let started = Instant::now();
        let working_dir = self.working_dir.to_string_lossy();
        bridge.pull(&remote_path, &working_dir).await?;

        let local = self.working_dir.join(name);
        if !fs::try_exists(&local).await? {
            return Err(BoothError::PullFailure {
                file: remote_path,
                details: format!("{} missing after pull", local.display()),
            });
        }

        let extension = Path::new(name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let (counter, slot) = self.layout.next_free_slot(last_counter, &extension).await?;
        move_file(&local, &slot).await?;

        fs::File::create(&token).await?;
        self.log.timed(
            format!("Published {} as {}", name, slot.display()),
            started.elapsed(),
        );

        self.delete_remote(bridge, &remote_path).await?;
        Ok(Some((counter, slot)))
    }

    async fn delete_remote(&self, bridge: &DeviceBridge, remote_path: &str) -> Result<()> {
        if self.delete_after_download {
            bridge.remove(remote_path).await?;
            debug!("Deleted {} on the device", remote_path);
        }
        Ok(())
    }
}

/// Zero-byte marker recording that `name` has been downloaded
pub fn token_path(working_dir: &Path, name: &str) -> PathBuf {
    working_dir.join(format!("{}.token", name))
}

async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    // Working and publish folders may live on different volumes
    fs::copy(from, to).await?;
    fs::remove_file(from).await?;
    Ok(())
}
