use async_trait::async_trait;
use bytes::Bytes;
use derive_builder::Builder;
use futures::{StreamExt, stream::BoxStream};
use reqwest::{
    Client, ClientBuilder, Proxy, Url,
    header::{HeaderMap, HeaderValue, RANGE},
};
use std::time::Duration;

use crate::{error::FetchError, response_info::ResponseInfo};

pub type BodyStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// An opened transfer: where the body starts, how big the whole resource is, and the body itself.
pub struct Opened {
    /// Byte offset of the first body byte within the resource.
    pub start: u64,
    /// Size of the whole resource, when the server told us.
    pub total_len: Option<u64>,
    pub body: BodyStream,
}

impl Opened {
    /// Nothing left to send: the caller already holds all `total_len` bytes.
    pub fn exhausted(total_len: u64) -> Self {
        Self {
            start: total_len,
            total_len: Some(total_len),
            body: futures::stream::empty().boxed(),
        }
    }
}

/// Something that can serve a resource starting at a byte offset.
#[async_trait]
pub trait ByteSource: Send + Sync {
    async fn open(&self, url: &Url, offset: u64) -> Result<Opened, FetchError>;
}

/// Connection settings for [`HttpSource`] and the manifest client.
#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct HttpOptions {
    /// How long to wait for a TCP/TLS connection.
    #[builder(default = Duration::from_secs(10))]
    connect_timeout: Duration,
    #[builder(default = None)]
    user_agent: Option<String>,
    #[builder(default = None)]
    proxy: Option<Proxy>,
    /// Custom HTTP headers sent with every request.
    #[builder(default = None)]
    headers: Option<HeaderMap>,
}

impl HttpOptions {
    pub fn client_builder(&self) -> ClientBuilder {
        let user_agent = self
            .user_agent
            .clone()
            .unwrap_or_else(|| concat!("partfetch/", env!("CARGO_PKG_VERSION")).to_string());
        let mut client = Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(user_agent);
        if let Some(proxy) = &self.proxy {
            client = client.proxy(proxy.clone());
        }
        if let Some(headers) = &self.headers {
            client = client.default_headers(headers.clone());
        }
        client
    }
}

impl HttpOptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(connect_timeout) = self.connect_timeout {
            if connect_timeout.is_zero() {
                return Err("connect_timeout must be greater than zero".to_string());
            }
        }
        Ok(())
    }
}

/// Range-request transport over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(options: &HttpOptions) -> Result<Self, FetchError> {
        Ok(Self {
            client: options.client_builder().build()?,
        })
    }
}

#[async_trait]
impl ByteSource for HttpSource {
    async fn open(&self, url: &Url, offset: u64) -> Result<Opened, FetchError> {
        let mut req = self.client.get(url.clone());
        if offset > 0 {
            let range_header = format!("bytes={offset}-");
            let range_value = HeaderValue::from_str(&range_header).map_err(|e| FetchError::Other {
                message: "Internal Error: Invalid range header".to_string(),
                origin: Box::new(e),
            })?;
            req = req.header(RANGE, range_value);
        }

        let resp = req.send().await?;
        let info = ResponseInfo::from(&resp);

        if offset > 0 && info.is_range_not_satisfiable() {
            match info.unsatisfied_range_total() {
                Some(total) if total == offset => {
                    tracing::debug!("{} is already fully present locally", info.url());
                    return Ok(Opened::exhausted(offset));
                }
                Some(total) if total < offset => {
                    return Err(FetchError::PartialExceedsResource {
                        partial_len: offset,
                        total,
                    });
                }
                _ => {
                    return Err(FetchError::ResponseStatusNotSuccess {
                        status: info.status(),
                    });
                }
            }
        }

        if !info.is_successful() {
            return Err(FetchError::ResponseStatusNotSuccess {
                status: info.status(),
            });
        }

        let start = if info.is_partial() {
            info.content_range().map(|cr| cr.start).unwrap_or(offset)
        } else {
            if offset > 0 {
                tracing::debug!(
                    "{} ignored the range request (accept-ranges: {}), restarting from byte 0",
                    info.url(),
                    info.accepts_ranges()
                );
            }
            0
        };

        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(FetchError::from))
            .boxed();

        Ok(Opened {
            start,
            total_len: info.total_length(),
            body,
        })
    }
}
