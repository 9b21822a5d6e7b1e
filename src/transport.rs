//! Streaming transport seam
//!
//! Implement `Transport` to plug in any HTTP client capable of returning a
//! readable byte stream. The default implementation is backed by `reqwest`.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;

use crate::error::Error;
use crate::request::{ProxySpec, RequestSpec, Timeouts};

/// A successfully issued request: status, content type, and the body as an
/// unbounded chunk stream
pub struct TransportResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub stream: BoxStream<'static, anyhow::Result<Bytes>>,
}

/// Trait for the underlying HTTP transport
///
/// `connect` issues one request and hands back the response stream, or an
/// error if the request could not be issued at all. Cancellation is driven
/// from the outside by dropping the returned stream.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Issue one connection attempt described by the spec
    async fn connect(&self, spec: &RequestSpec) -> anyhow::Result<TransportResponse>;

    /// Return the transport name (for logging)
    fn name(&self) -> &'static str;
}

/// Default transport backed by a shared `reqwest::Client`
///
/// The client is built once from the configured timeouts and proxy. No
/// overall request timeout is set: the response body is expected to stay
/// open indefinitely.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeouts: &Timeouts, proxy: Option<&ProxySpec>) -> crate::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .read_timeout(timeouts.read);
        if let Some(proxy) = proxy {
            builder = builder.proxy(proxy.to_proxy()?);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn connect(&self, spec: &RequestSpec) -> anyhow::Result<TransportResponse> {
        let mut request = self
            .client
            .request(spec.method.clone(), spec.url.clone())
            .headers(spec.headers.clone());
        if let Some(body) = &spec.body {
            request = request
                .header(CONTENT_TYPE, body.content_type.as_str())
                .body(body.content.clone());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_owned());
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(anyhow::Error::from))
            .boxed();

        Ok(TransportResponse {
            status,
            content_type,
            stream,
        })
    }

    fn name(&self) -> &'static str {
        "reqwest"
    }
}
