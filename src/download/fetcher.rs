//! Byte-range fetching over HTTP

use crate::download::plan::Packet;
use crate::error::SigfetchError;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE, USER_AGENT};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Browser user agents rotated per request
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0",
];

/// Pick a user agent at random
pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Source of byte ranges for the range downloader
#[async_trait]
pub trait RangeFetcher: Send + Sync {
    /// Fetch exactly the bytes of `packet`
    async fn fetch(&self, url: &str, packet: Packet) -> Result<Vec<u8>, SigfetchError>;
}

/// Request method for range requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangeMethod {
    /// Plain ranged GET
    #[default]
    Get,
    /// Ranged POST with a two-byte `x\0` body, accepted by some media CDNs
    Post,
}

/// [`RangeFetcher`] over reqwest
#[derive(Clone)]
pub struct HttpRangeFetcher {
    client: Client,
    method: RangeMethod,
}

impl HttpRangeFetcher {
    /// Create a fetcher with its own client
    pub fn new(timeout: Duration, method: RangeMethod) -> Result<Self, SigfetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, method))
    }

    /// Create a fetcher over an existing client
    pub fn with_client(client: Client, method: RangeMethod) -> Self {
        Self { client, method }
    }

    fn request(&self, method: RangeMethod, url: &str) -> reqwest::RequestBuilder {
        let builder = match method {
            RangeMethod::Get => self.client.get(url),
            RangeMethod::Post => self.client.post(url).body("x\0"),
        };
        builder.header(USER_AGENT, random_user_agent())
    }

    /// Determine the content length behind `url`.
    ///
    /// Tries HEAD first, then a one-byte range probe reading the total from
    /// `Content-Range`.
    pub async fn content_length(&self, url: &str) -> Result<u64, SigfetchError> {
        let head = self
            .client
            .head(url)
            .header(USER_AGENT, random_user_agent())
            .send()
            .await?;
        if head.status().is_success() {
            if let Some(length) = header_u64(&head, CONTENT_LENGTH).filter(|l| *l > 0) {
                return Ok(length);
            }
        }
        debug!("HEAD gave no length for {} (status {}), probing range", url, head.status());

        let probe = self
            .request(self.method, url)
            .header(RANGE, "bytes=0-0")
            .send()
            .await?;
        let status = probe.status();
        if !status.is_success() {
            return Err(SigfetchError::HttpStatus {
                status: status.as_u16(),
                range: "bytes=0-0".to_string(),
            });
        }

        if let Some(total) = probe
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit('/').next())
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            return Ok(total);
        }

        // Server ignored the range and sent everything
        if status.as_u16() == 200 {
            if let Some(length) = header_u64(&probe, CONTENT_LENGTH) {
                return Ok(length);
            }
        }

        Err(SigfetchError::Generic(format!(
            "Could not determine content length for {}",
            url
        )))
    }
}

fn header_u64(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<u64> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

#[async_trait]
impl RangeFetcher for HttpRangeFetcher {
    async fn fetch(&self, url: &str, packet: Packet) -> Result<Vec<u8>, SigfetchError> {
        let range = packet.range_header();
        let response = self
            .request(self.method, url)
            .header(RANGE, &range)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SigfetchError::HttpStatus {
                status: status.as_u16(),
                range,
            });
        }

        let body = response.bytes().await?;
        if body.len() as u64 != packet.len {
            return Err(SigfetchError::RangeMismatch {
                start: packet.start,
                expected: packet.len,
                actual: body.len() as u64,
            });
        }
        Ok(body.to_vec())
    }
}
