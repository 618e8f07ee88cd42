//! Transport test utilities

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use url::Url;

use mod_portal_cache::mods::error::TransportError;
use mod_portal_cache::mods::transport::{ByteStream, Transport};

/// Transport that fails every request and counts how often it was asked
#[derive(Default)]
pub struct FailingTransport {
    calls: AtomicUsize,
}

impl FailingTransport {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FailingTransport {
    async fn get(&self, url: &Url) -> Result<ByteStream, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Status {
            url: url.path().to_string(),
            status: 503,
        })
    }
}

/// Transport whose responses send `head` and then never finish
pub struct StallingTransport {
    head: Vec<u8>,
}

impl StallingTransport {
    pub fn new(head: &[u8]) -> Self {
        Self {
            head: head.to_vec(),
        }
    }
}

#[async_trait]
impl Transport for StallingTransport {
    async fn get(&self, _url: &Url) -> Result<ByteStream, TransportError> {
        Ok(stream::iter(vec![Ok(self.head.clone())])
            .chain(stream::pending())
            .boxed())
    }
}
