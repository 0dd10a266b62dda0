use reqwest::Url;
use std::path::{Path, PathBuf};

use crate::{fs_utils, hash::HashDigest};

/// A single `(source, destination)` pair handed to the fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    source: Url,
    destination: PathBuf,
    checksum: Option<HashDigest>,
}

impl TransferRequest {
    pub fn new(source: Url, destination: impl Into<PathBuf>) -> Self {
        Self {
            source,
            destination: destination.into(),
            checksum: None,
        }
    }

    pub fn with_checksum(mut self, checksum: Option<HashDigest>) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn source(&self) -> &Url {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn checksum(&self) -> Option<&HashDigest> {
        self.checksum.as_ref()
    }

    /// Where bytes accumulate until the transfer is confirmed complete.
    pub fn partial_path(&self) -> PathBuf {
        fs_utils::partial_path(&self.destination)
    }

    /// File name used in log lines.
    pub fn display_name(&self) -> String {
        self.destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.destination.display().to_string())
    }
}
