use std::{path::PathBuf, process::ExitCode, time::Duration};

use clap::Parser;
use partfetch::{
    batch::{BatchConfig, run_batch},
    config::Config,
    error::FetchError,
    fetcher::{FetchOptionsBuilder, Fetcher},
    manifest::{ManifestLocation, load_manifest, parse_manifest},
    source::{HttpOptionsBuilder, HttpSource},
};
use reqwest::{
    Proxy,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
mod args;
use args::Args;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().compact().with_target(false))
        .init();
}

fn secs(option: &str, value: f64) -> Result<Duration, FetchError> {
    Duration::try_from_secs_f64(value).map_err(|e| FetchError::CliError {
        message: format!("Invalid value for {}: {} ({})", option, value, e),
    })
}

fn parse_headers(headers: &[String]) -> Result<HeaderMap, FetchError> {
    let mut headers_map = HeaderMap::new();
    for header in headers {
        let Some((key, value)) = header.split_once(':') else {
            return Err(FetchError::CliError {
                message: format!("Header must be in KEY:VALUE format: '{}'", header),
            });
        };
        let key = key.trim();
        let value = value.trim();
        let header_name =
            HeaderName::from_bytes(key.as_bytes()).map_err(|_| FetchError::CliError {
                message: format!("Invalid header name: '{}'", key),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|_| FetchError::CliError {
            message: format!("Invalid header value for '{}': '{}'", key, value),
        })?;
        headers_map.insert(header_name, header_value);
    }
    Ok(headers_map)
}

#[tokio::main]
async fn main() -> Result<ExitCode, FetchError> {
    let args = Args::parse();
    init_tracing();

    let config = Config::load(args.config.as_deref())
        .map_err(|e| FetchError::io_with_context(e, "loading config"))?;

    let proxy = match args.proxy.as_ref().or(config.proxy.as_ref()) {
        Some(proxy_str) => Some(Proxy::all(proxy_str).map_err(|e| FetchError::CliError {
            message: format!("Failed to parse proxy '{}': {}", proxy_str, e),
        })?),
        None => None,
    };

    let mut http_builder = HttpOptionsBuilder::default();
    http_builder
        .user_agent(args.user_agent.clone().or(config.user_agent.clone()))
        .proxy(proxy);
    if let Some(connect_timeout) = args.connect_timeout.or(config.connect_timeout_secs) {
        http_builder.connect_timeout(secs("connect timeout", connect_timeout)?);
    }
    if !args.headers.is_empty() {
        http_builder.headers(Some(parse_headers(&args.headers)?));
    }
    let http = http_builder.build()?;

    let mut fetch_builder = FetchOptionsBuilder::default();
    fetch_builder
        .fail_fast(args.fail_fast(config.fail_fast))
        .verify_checksums(args.verify_checksums(config.verify_checksums));
    if let Some(max_attempts) = args.max_attempts.or(config.max_attempts) {
        fetch_builder.max_attempts(max_attempts);
    }
    if let Some(wait) = args.waitretry.or(config.wait_between_retries_secs) {
        fetch_builder.wait_between_retries(secs("waitretry", wait)?);
    }
    if let Some(read_timeout) = args.read_timeout.or(config.read_timeout_secs) {
        fetch_builder.read_timeout(secs("read timeout", read_timeout)?);
    }
    if let Some(chunk_size) = args.chunk_size.or(config.chunk_size) {
        fetch_builder.chunk_size(chunk_size);
    }
    let fetch_options = fetch_builder.build()?;

    let input = args
        .input
        .clone()
        .or(config.manifest.clone())
        .ok_or_else(|| FetchError::CliError {
            message: "No manifest given. Pass a path or URL, or set `manifest` in the config file."
                .to_string(),
        })?;

    let required_groups = if args.groups.is_empty() {
        config.required_groups.clone().unwrap_or_default()
    } else {
        args.groups.clone()
    };

    let batch_config = BatchConfig {
        base_dir: args
            .base_dir
            .clone()
            .or(config.base_dir.clone())
            .unwrap_or_else(|| PathBuf::from(".")),
        manifest: ManifestLocation::parse(&input)?,
        required_groups: required_groups.into_iter().collect(),
    };

    let text = load_manifest(
        &batch_config.manifest,
        &http,
        fetch_options.retry_policy(),
    )
    .await?;
    let entries = parse_manifest(&text, &batch_config.required_groups)?;
    let requests = batch_config.requests(entries);
    tracing::info!("Found {} files", requests.len());

    let fetcher = Fetcher::new(fetch_options, HttpSource::new(&http)?);
    let report = run_batch(&batch_config, &fetcher, &requests).await?;

    println!("{}", report);
    if report.has_failures() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
