use derive_builder::Builder;
use futures::StreamExt;
use reqwest_retry::{RetryDecision, RetryPolicy};
use std::time::{Duration, SystemTime};
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    time,
};
use tracing::{Instrument, info_span};

use crate::{
    error::FetchError,
    fs_utils::{self, atomic_replace},
    retry_policies::FixedIntervalRetry,
    source::{ByteSource, Opened},
    transfer::TransferRequest,
};

/// How hard the fetcher tries, and how it streams.
#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct FetchOptions {
    /// Total number of attempts per request, the first one included.
    #[builder(default = 3)]
    max_attempts: u32,
    /// Amount of time to wait between attempts.
    #[builder(default = Duration::from_secs(5))]
    wait_between_retries: Duration,
    /// Longest silence tolerated while waiting for a response or the next chunk.
    #[builder(default = Duration::from_secs(1800))]
    read_timeout: Duration,
    /// Write buffer size. The partial file grows in steps of this many bytes.
    #[builder(default = 1024 * 1024)]
    chunk_size: usize,
    /// Stop retrying on statuses that cannot succeed later (404, 403, ...).
    #[builder(default = false)]
    fail_fast: bool,
    /// Hash finished transfers against the digest carried by the request, if any.
    #[builder(default = false)]
    verify_checksums: bool,
}

impl FetchOptions {
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn wait_between_retries(&self) -> Duration {
        self.wait_between_retries
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    pub fn verify_checksums(&self) -> bool {
        self.verify_checksums
    }

    pub fn retry_policy(&self) -> FixedIntervalRetry {
        FixedIntervalRetry::for_attempts(self.max_attempts, self.wait_between_retries)
    }
}

impl FetchOptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.max_attempts == Some(0) {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.chunk_size == Some(0) {
            return Err("chunk_size must be greater than zero".to_string());
        }
        if let Some(wait_between_retries) = self.wait_between_retries {
            if wait_between_retries.is_zero() {
                return Err("wait_between_retries must be greater than zero".to_string());
            }
        }
        if let Some(read_timeout) = self.read_timeout {
            if read_timeout.is_zero() {
                return Err("read_timeout must be greater than zero".to_string());
            }
        }
        Ok(())
    }
}

/// Result of one [`Fetcher::fetch`] call. None of these abort a batch.
#[derive(Debug)]
pub enum Outcome {
    /// Destination was already present with no partial file beside it. Nothing was requested.
    AlreadyComplete,
    /// Transfer finished and was published.
    Completed { attempts: u32, bytes: u64 },
    /// Every attempt failed. The partial file, if any, is kept for the next run.
    Failed { attempts: u32, error: FetchError },
}

/// Downloads one resource at a time into `<destination>.part`, then publishes it.
pub struct Fetcher<S> {
    options: FetchOptions,
    source: S,
}

impl<S: ByteSource> Fetcher<S> {
    pub fn new(options: FetchOptions, source: S) -> Self {
        Self { options, source }
    }

    /// Fetches `request`, resuming and retrying as needed.
    pub async fn fetch(&self, request: &TransferRequest) -> Outcome {
        let name = request.display_name();
        let span = info_span!("fetch", file = %name);
        self.fetch_with_retries(request, &name).instrument(span).await
    }

    async fn fetch_with_retries(&self, request: &TransferRequest, name: &str) -> Outcome {
        // a partial file that cannot be inspected is left for the attempt to report
        if fs_utils::is_file(request.destination()).await
            && matches!(fs::try_exists(request.partial_path()).await, Ok(false))
        {
            tracing::info!("Already downloaded: {}", name);
            return Outcome::AlreadyComplete;
        }

        let policy = self.options.retry_policy();
        let max_attempts = self.options.max_attempts;
        let started = SystemTime::now();
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let error = match self.attempt(request).await {
                Ok(bytes) => {
                    tracing::info!("Finished: {} ({} bytes)", name, bytes);
                    return Outcome::Completed { attempts, bytes };
                }
                Err(e) => e,
            };

            if self.options.fail_fast && error.is_permanent() {
                tracing::error!("Giving up on {} after attempt {}: {}", name, attempts, error);
                return Outcome::Failed { attempts, error };
            }

            match policy.should_retry(started, attempts - 1) {
                RetryDecision::Retry { execute_after } => {
                    tracing::warn!(
                        "Attempt {}/{} failed for {}: {}",
                        attempts,
                        max_attempts,
                        name,
                        error
                    );
                    let wait = execute_after
                        .duration_since(SystemTime::now())
                        .unwrap_or_default();
                    time::sleep(wait).await;
                }
                RetryDecision::DoNotRetry => {
                    tracing::error!(
                        "Failed after {} attempts: {}: {}",
                        attempts,
                        name,
                        error
                    );
                    return Outcome::Failed { attempts, error };
                }
            }
        }
    }

    /// One connect + stream + publish cycle. Returns the final size on success.
    async fn attempt(&self, request: &TransferRequest) -> Result<u64, FetchError> {
        let destination = request.destination();
        let partial = request.partial_path();

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                FetchError::io_with_context(e, format!("creating {}", parent.display()))
            })?;
        }

        let resume_offset = fs_utils::existing_len(&partial).await.map_err(|e| {
            FetchError::io_with_context(e, format!("inspecting {}", partial.display()))
        })?;
        if resume_offset > 0 {
            tracing::info!("Resuming at byte {}", resume_offset);
        }

        let Opened {
            start,
            total_len,
            mut body,
        } = match time::timeout(
            self.options.read_timeout,
            self.source.open(request.source(), resume_offset),
        )
        .await?
        {
            Ok(opened) => opened,
            Err(e @ FetchError::PartialExceedsResource { .. }) => {
                // nothing can be appended to these bytes, start over
                fs::remove_file(&partial).await.map_err(|e| {
                    FetchError::io_with_context(e, format!("removing {}", partial.display()))
                })?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        if start != resume_offset && start != 0 {
            return Err(FetchError::RangeMismatch {
                requested: resume_offset,
                served: start,
            });
        }

        let mut open_options = OpenOptions::new();
        open_options.create(true);
        if start > 0 {
            open_options.append(true);
        } else {
            if resume_offset > 0 {
                tracing::warn!("Server ignored the range request, restarting from byte 0");
            }
            open_options.write(true).truncate(true);
        }
        let file = open_options.open(&partial).await.map_err(|e| {
            FetchError::io_with_context(e, format!("opening {}", partial.display()))
        })?;
        let mut file = BufWriter::with_capacity(self.options.chunk_size, file);

        let mut written = start;
        let streamed: Result<(), FetchError> = async {
            loop {
                let next = time::timeout(self.options.read_timeout, body.next()).await?;
                let chunk = match next {
                    Some(chunk) => chunk?,
                    None => break,
                };
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
                tracing::trace!(downloaded = written, total = ?total_len, "chunk written");
            }
            Ok(())
        }
        .await;

        // keep whatever arrived, even when the stream broke
        file.flush().await?;
        streamed?;
        let file = file.into_inner();
        file.sync_all().await?;
        drop(file);

        if let Some(expected) = total_len {
            if written != expected {
                return Err(FetchError::IncompleteBody {
                    expected,
                    actual: written,
                });
            }
        }

        if self.options.verify_checksums {
            if let Some(digest) = request.checksum() {
                if let Some(actual) = digest.check_file(&partial).await? {
                    // the bytes on disk are wrong, resuming from them would never converge
                    fs::remove_file(&partial).await?;
                    return Err(FetchError::ChecksumMismatch {
                        expected: digest.expected().to_string(),
                        actual,
                    });
                }
            }
        }

        atomic_replace(partial.clone(), destination.to_path_buf())
            .await
            .map_err(|e| {
                FetchError::io_with_context(e, format!("publishing {}", destination.display()))
            })?;

        Ok(written)
    }
}
