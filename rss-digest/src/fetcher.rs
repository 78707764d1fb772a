use crate::parser::FeedParser;
use crate::traits::FeedTransport;
use crate::types::{DigestError, FetchConfig, RawFeed, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use url::Url;

/// HTTP transport: one GET per feed, no retries.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| DigestError::General(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Download the raw feed body.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let parsed = Url::parse(url)?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(DigestError::General(format!("Unsupported URL scheme: {}", other)));
            }
        }

        let start_time = Instant::now();
        debug!("Fetching feed: {}", url);

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DigestError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let limit_bytes = self.config.max_feed_size_mb * 1024 * 1024;
        if let Some(content_length) = response.content_length() {
            if content_length as usize > limit_bytes {
                return Err(DigestError::FeedTooLarge {
                    size_mb: content_length as usize / (1024 * 1024),
                });
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.map_request_error(e))?;

        if bytes.len() > limit_bytes {
            return Err(DigestError::FeedTooLarge {
                size_mb: bytes.len() / (1024 * 1024),
            });
        }

        info!(
            "Fetched feed: {} ({} bytes in {}ms)",
            url,
            bytes.len(),
            start_time.elapsed().as_millis()
        );
        Ok(bytes.to_vec())
    }

    fn map_request_error(&self, e: reqwest::Error) -> DigestError {
        if e.is_timeout() {
            DigestError::Timeout {
                millis: self.config.timeout_seconds * 1000,
            }
        } else {
            DigestError::Http(e)
        }
    }
}

#[async_trait]
impl FeedTransport for Fetcher {
    async fn fetch(&self, url: &str) -> Result<RawFeed> {
        let bytes = self.fetch_bytes(url).await?;
        FeedParser::parse_feed(&bytes).map_err(|e| {
            if FeedParser::is_valid_feed_content(&String::from_utf8_lossy(&bytes)) {
                e
            } else {
                DigestError::Parse("response is not an RSS/Atom document".to_string())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let fetcher = Fetcher::new(FetchConfig::default()).unwrap();
        let err = fetcher.fetch("file:///etc/passwd").await.unwrap_err();
        assert!(matches!(err, DigestError::General(_)));
    }

    #[tokio::test]
    async fn rejects_malformed_urls() {
        let fetcher = Fetcher::new(FetchConfig::default()).unwrap();
        let err = fetcher.fetch("not a url").await.unwrap_err();
        assert!(matches!(err, DigestError::InvalidUrl(_)));
    }
}
