use std::{collections::BTreeSet, fmt, path::PathBuf};

use crate::{
    error::FetchError,
    fetcher::{Fetcher, Outcome},
    fs_utils::cleanup_filename,
    manifest::{ManifestEntry, ManifestLocation},
    source::ByteSource,
    transfer::TransferRequest,
};

/// Everything a batch run needs, built once at startup and passed down.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub base_dir: PathBuf,
    pub manifest: ManifestLocation,
    /// Groups to take from a grouped manifest. Empty means all of them.
    pub required_groups: BTreeSet<String>,
}

impl BatchConfig {
    /// Maps manifest entries onto destinations under `base_dir`.
    pub fn requests(&self, entries: Vec<ManifestEntry>) -> Vec<TransferRequest> {
        entries
            .into_iter()
            .map(|entry| {
                let destination = self.base_dir.join(cleanup_filename(&entry.filename));
                TransferRequest::new(entry.url, destination).with_checksum(entry.checksum)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub already_complete: usize,
    pub completed: usize,
    /// Destinations that could not be fetched.
    pub failed: Vec<PathBuf>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.already_complete + self.completed + self.failed.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    fn record(&mut self, request: &TransferRequest, outcome: &Outcome) {
        match outcome {
            Outcome::AlreadyComplete => self.already_complete += 1,
            Outcome::Completed { .. } => self.completed += 1,
            Outcome::Failed { .. } => self.failed.push(request.destination().to_path_buf()),
        }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files: {} already downloaded, {} downloaded, {} failed",
            self.total(),
            self.already_complete,
            self.completed,
            self.failed.len()
        )
    }
}

/// Fetches `requests` one after another. Only failing to create `base_dir` aborts the run.
pub async fn run_batch<S: ByteSource>(
    config: &BatchConfig,
    fetcher: &Fetcher<S>,
    requests: &[TransferRequest],
) -> Result<BatchReport, FetchError> {
    tokio::fs::create_dir_all(&config.base_dir)
        .await
        .map_err(|e| {
            FetchError::io_with_context(
                e,
                format!("creating base directory {}", config.base_dir.display()),
            )
        })?;

    let mut report = BatchReport::default();
    for (i, request) in requests.iter().enumerate() {
        tracing::debug!("[{}/{}] {}", i + 1, requests.len(), request.source());
        let outcome = fetcher.fetch(request).await;
        report.record(request, &outcome);
    }

    for path in &report.failed {
        tracing::warn!("Not downloaded: {}", path.display());
    }
    Ok(report)
}
