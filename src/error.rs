use reqwest::StatusCode;
use std::error::Error;
use thiserror::Error;
use tokio::task::JoinError;
use tokio::time::error::Elapsed;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Connection timeout")]
    ConnectionTimeout,
    #[error("Response body error")]
    ResponseBodyError,
    #[error("No data received within the read timeout")]
    ReadTimeout,
    #[error("Response status not success: {status}")]
    ResponseStatusNotSuccess { status: StatusCode },
    #[error("Server answered range request for byte {requested} starting at byte {served}")]
    RangeMismatch { requested: u64, served: u64 },
    #[error("Partial file holds {partial_len} bytes but the resource has only {total}")]
    PartialExceedsResource { partial_len: u64, total: u64 },
    #[error("Transfer ended early: expected {expected} bytes, have {actual}")]
    IncompleteBody { expected: u64, actual: u64 },
    #[error("Checksum mismatch: expected `{expected}`, got `{actual}`")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("Invalid manifest: {message}")]
    ManifestError { message: String },
    #[error("CLI argument error: {message}")]
    CliError { message: String },
    #[error("Standard I/O error: {e}{}", .extra_info.as_ref().map(|s| format!(" ({s})")).unwrap_or_default())]
    StdIoError {
        e: std::io::Error,
        extra_info: Option<String>,
    },
    #[error("Task error: {e}")]
    TaskError { e: JoinError },
    #[error("Other error: {message:?}")]
    Other {
        message: String,
        origin: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl FetchError {
    /// Statuses that will not change by asking again: every 4xx except
    /// request timeout and rate limiting.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::ResponseStatusNotSuccess { status } => {
                status.is_client_error()
                    && *status != StatusCode::REQUEST_TIMEOUT
                    && *status != StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }

    pub fn io_with_context(e: std::io::Error, context: impl Into<String>) -> Self {
        Self::StdIoError {
            e,
            extra_info: Some(context.into()),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) if !status.is_success() => {
                return Self::ResponseStatusNotSuccess { status };
            }
            _ => {}
        }

        match e.source().and_then(|s| s.downcast_ref::<std::io::Error>()) {
            Some(io_err) if io_err.kind() == std::io::ErrorKind::TimedOut => {
                return Self::ConnectionTimeout;
            }
            _ => {}
        }

        match e.is_timeout() {
            true => Self::ConnectionTimeout,
            false if e.is_body() => Self::ResponseBodyError,
            false if e.is_connect() => Self::ConnectionClosed,
            _ => Self::Other {
                message: e.to_string(),
                origin: Box::new(e),
            },
        }
    }
}

impl From<reqwest_middleware::Error> for FetchError {
    fn from(value: reqwest_middleware::Error) -> Self {
        match value {
            reqwest_middleware::Error::Middleware(error) => Self::Other {
                message: error.to_string(),
                origin: error.into_boxed_dyn_error(),
            },
            reqwest_middleware::Error::Reqwest(error) => FetchError::from(error),
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        Self::StdIoError {
            e,
            extra_info: None,
        }
    }
}

impl From<Elapsed> for FetchError {
    fn from(_: Elapsed) -> Self {
        Self::ReadTimeout
    }
}

impl From<JoinError> for FetchError {
    fn from(e: JoinError) -> Self {
        Self::TaskError { e }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        Self::ManifestError {
            message: e.to_string(),
        }
    }
}

impl From<crate::fetcher::FetchOptionsBuilderError> for FetchError {
    fn from(e: crate::fetcher::FetchOptionsBuilderError) -> Self {
        Self::Other {
            message: e.to_string(),
            origin: Box::new(e),
        }
    }
}

impl From<crate::source::HttpOptionsBuilderError> for FetchError {
    fn from(e: crate::source::HttpOptionsBuilderError) -> Self {
        Self::Other {
            message: e.to_string(),
            origin: Box::new(e),
        }
    }
}
