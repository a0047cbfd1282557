use super::CameraController;
use crate::error::{BoothError, Result};
use crate::events::BoothEvent;
use crate::transfer::DownloadReport;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

impl CameraController {
    /// Run one download pass right away
    pub async fn download_now(&self) -> Result<Option<DownloadReport>> {
        match self.download_pass(Instant::now(), None).await {
            Ok(report) => Ok(report),
            Err(e) => {
                self.report_failure("Downloading pictures", &e).await;
                Err(e)
            }
        }
    }

    /// One pass through the download gate.
    ///
    /// Returns `Ok(None)` when another pass started after `requested_at`:
    /// that pass already covered whatever this one was meant to fetch.
    pub(super) async fn download_pass(
        &self,
        requested_at: Instant,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<DownloadReport>> {
        let mut state = match cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => return Err(BoothError::Cancelled),
                state = self.inner.download_gate.lock() => state,
            },
            None => self.inner.download_gate.lock().await,
        };

        if state
            .last_initiated
            .is_some_and(|initiated| initiated > requested_at)
        {
            self.inner
                .log
                .info("Skipping redundant download, a newer pass already ran");
            return Ok(None);
        }
        state.last_initiated = Some(Instant::now());

        let started = Instant::now();
        let bridge = self.bridge().await?;
        let report = self
            .pipeline()
            .download_all(&bridge, state.last_counter)
            .await?;

        state.last_counter = report.last_counter;
        self.inner
            .published_counter
            .store(report.last_counter, Ordering::Relaxed);

        if report.published.is_empty() {
            debug!(
                "Download pass found nothing new ({} duplicates, {} failures)",
                report.duplicates, report.failures
            );
        } else {
            self.inner.log.timed(
                format!("Downloaded {} picture(s)", report.published.len()),
                started.elapsed(),
            );
            self.inner.event_bus.publish(BoothEvent::FilesPublished {
                count: report.published.len(),
                last_counter: report.last_counter,
            });
        }

        Ok(Some(report))
    }
}
