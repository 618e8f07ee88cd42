//! HTTP transport for catalog pages and mod downloads

use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
#[cfg(test)]
use mockall::automock;
use tracing::warn;
use url::Url;

use crate::mods::error::TransportError;

/// Response body, delivered in chunks.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Trait for issuing GET requests
///
/// The cache only ever needs a GET that yields a body stream, so this is the
/// seam where tests swap the network out.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Fetches `url`, failing on transport errors and non-success statuses
    async fn get(&self, url: &Url) -> Result<ByteStream, TransportError>;
}

/// Transport implementation backed by reqwest
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent(user_agent)
                .timeout(timeout)
                .build()?,
        })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<ByteStream, TransportError> {
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            // Download URLs carry credentials in the query.
            let url = redact_query(url);
            warn!("Mod portal returned status {}: {}", status, url);
            return Err(TransportError::Status {
                url,
                status: status.as_u16(),
            });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(TransportError::from))
            .boxed())
    }
}

/// Drain a body stream into memory.
pub async fn read_to_end(mut stream: ByteStream) -> Result<Vec<u8>, TransportError> {
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk?);
    }
    Ok(body)
}

fn redact_query(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn transport() -> HttpTransport {
        HttpTransport::new("mod-portal-cache-test", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn get_streams_response_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/mods")
            .with_status(200)
            .with_body("hello portal")
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/api/mods", server.url())).unwrap();
        let stream = transport().get(&url).await.unwrap();
        let body = read_to_end(stream).await.unwrap();

        mock.assert_async().await;
        assert_eq!(body, b"hello portal");
    }

    #[tokio::test]
    async fn get_fails_on_error_status_without_leaking_query() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/download/flib/abc")
            .match_query(mockito::Matcher::Any)
            .with_status(403)
            .create_async()
            .await;

        let url = Url::parse(&format!(
            "{}/download/flib/abc?username=alice&token=s3cret",
            server.url()
        ))
        .unwrap();
        let result = transport().get(&url).await;

        mock.assert_async().await;
        match result {
            Err(TransportError::Status { url, status }) => {
                assert_eq!(status, 403);
                assert!(!url.contains("s3cret"));
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("expected a status error"),
        }
    }
}
