pub mod batch;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod fs_utils;
pub mod hash;
pub mod manifest;
mod response_info;
pub mod retry_policies;
pub mod source;
pub mod transfer;

pub use batch::{BatchConfig, BatchReport, run_batch};
pub use fetcher::{FetchOptions, FetchOptionsBuilder, Fetcher, Outcome};
pub use source::{ByteSource, HttpOptions, HttpOptionsBuilder, HttpSource};
pub use transfer::TransferRequest;
