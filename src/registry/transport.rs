use crate::errors::ImageError;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt, TryStreamExt};
use http::{header::CONTENT_TYPE, HeaderMap, StatusCode};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use url::Url;

/// Response from a registry GET, with a streaming body
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BoxStream<'static, Result<Bytes, ImageError>>,
}

impl Response {
    /// Response with the whole body available up front
    pub fn from_bytes<B: Into<Bytes>>(status: StatusCode, headers: HeaderMap, body: B) -> Self {
        let body: Bytes = body.into();
        Response {
            status,
            headers,
            body: futures_util::stream::once(async move { Ok(body) }).boxed(),
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    /// Collect the body into memory
    pub async fn bytes(mut self) -> Result<Vec<u8>, ImageError> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.body.try_next().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }

    /// Stream the body into a writer, returning the number of bytes written
    pub async fn copy_to<W: AsyncWrite + Unpin>(mut self, writer: &mut W) -> Result<u64, ImageError> {
        let mut total = 0u64;
        while let Some(chunk) = self.body.try_next().await? {
            writer.write_all(&chunk).await?;
            total += chunk.len() as u64;
        }
        writer.flush().await?;
        Ok(total)
    }
}

/// The one HTTP operation this crate needs: GET a URL with some headers
///
/// [HttpTransport] is the real implementation. Tests substitute an in-memory
/// registry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: Url, headers: HeaderMap) -> Result<Response, ImageError>;
}

/// [Transport] over HTTPS with reqwest
#[derive(Clone, Debug, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        HttpTransport {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: Url, headers: HeaderMap) -> Result<Response, ImageError> {
        log::debug!("GET {}", url);
        let response = self.client.get(url).headers(headers).send().await?;
        Ok(Response {
            status: response.status(),
            headers: response.headers().clone(),
            body: response.bytes_stream().map_err(ImageError::from).boxed(),
        })
    }
}
