use crate::config::{PublishConfig, COUNTER_PLACEHOLDER};
use crate::error::{BoothError, Result};
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info};

/// File stem template with a single `{counter}` / `{counter:0N}` placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenamePattern {
    prefix: String,
    suffix: String,
    width: usize,
}

impl FilenamePattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let start = pattern.find(COUNTER_PLACEHOLDER).ok_or_else(|| {
            BoothError::system(format!("Pattern '{}' has no {{counter}} placeholder", pattern))
        })?;
        let rest = &pattern[start + COUNTER_PLACEHOLDER.len()..];
        let end = rest.find('}').ok_or_else(|| {
            BoothError::system(format!("Pattern '{}' has an unterminated placeholder", pattern))
        })?;

        let modifier = &rest[..end];
        let width = match modifier.strip_prefix(':') {
            None if modifier.is_empty() => 0,
            Some(digits) => digits.parse::<usize>().map_err(|_| {
                BoothError::system(format!(
                    "Invalid counter width '{}' in '{}'",
                    digits, pattern
                ))
            })?,
            None => {
                return Err(BoothError::system(format!(
                    "Invalid counter placeholder in '{}'",
                    pattern
                )))
            }
        };

        Ok(Self {
            prefix: pattern[..start].to_string(),
            suffix: rest[end + 1..].to_string(),
            width,
        })
    }

    pub fn render(&self, counter: u64) -> String {
        format!(
            "{}{:0width$}{}",
            self.prefix,
            counter,
            self.suffix,
            width = self.width
        )
    }
}

/// Where published files go: `<root>/<lower>-<upper>/<pattern><ext>`
#[derive(Debug, Clone)]
pub struct PublishLayout {
    root: PathBuf,
    pattern: FilenamePattern,
    bucket_size: u64,
}

impl PublishLayout {
    pub fn new<P: Into<PathBuf>>(root: P, pattern: FilenamePattern, bucket_size: u64) -> Self {
        Self {
            root: root.into(),
            pattern,
            bucket_size: bucket_size.max(1),
        }
    }

    pub fn from_config(config: &PublishConfig) -> Result<Self> {
        Ok(Self::new(
            &config.publish_dir,
            FilenamePattern::parse(&config.filename_pattern)?,
            config.bucket_size,
        ))
    }

    pub fn bucket_range(&self, counter: u64) -> (u64, u64) {
        let lower = counter / self.bucket_size * self.bucket_size;
        (lower, lower + self.bucket_size - 1)
    }

    pub fn bucket_dir(&self, counter: u64) -> PathBuf {
        let (lower, upper) = self.bucket_range(counter);
        self.root.join(format!("{}-{}", lower, upper))
    }

    /// `extension` includes its leading dot, or is empty
    pub fn slot_path(&self, counter: u64, extension: &str) -> PathBuf {
        self.bucket_dir(counter)
            .join(format!("{}{}", self.pattern.render(counter), extension))
    }

    /// First unused slot after `last_known`; its bucket folder exists on return
    pub async fn next_free_slot(&self, last_known: u64, extension: &str) -> Result<(u64, PathBuf)> {
        let mut counter = last_known + 1;
        let mut prepared_bucket: Option<PathBuf> = None;

        loop {
            let bucket = self.bucket_dir(counter);
            if prepared_bucket.as_ref() != Some(&bucket) {
                if !fs::try_exists(&bucket).await? {
                    fs::create_dir_all(&bucket).await?;
                    info!("Created publish folder {}", bucket.display());
                }
                prepared_bucket = Some(bucket);
            }

            let candidate = self.slot_path(counter, extension);
            if !fs::try_exists(&candidate).await? {
                if counter > last_known + 1 {
                    debug!(
                        "Skipped {} occupied slots after {}",
                        counter - last_known - 1,
                        last_known
                    );
                }
                return Ok((counter, candidate));
            }
            counter += 1;
        }
    }
}
