use crate::types::{Article, FeedSource, RawEntry, RawFeed, Result};
use async_trait::async_trait;

/// Trait for retrieving and parsing a single feed (RSS, Atom, ...)
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Fetch `url` and return the parsed feed with entries in the
    /// provider's native order. Transport and parse failures come back
    /// as `Err`, never as a panic.
    async fn fetch(&self, url: &str) -> Result<RawFeed>;
}

/// Trait for anything that can hand over a list of feeds to poll
/// (a local feeds.json, an OPML import, command line arguments, ...)
#[async_trait]
pub trait FeedListProvider: Send + Sync {
    /// Human-readable name for this provider, used in logs
    fn provider_name(&self) -> String;

    /// Ordered list of feeds known to this provider
    async fn feeds(&self) -> Result<Vec<FeedSource>>;
}

/// Turns a raw entry into an article.
pub trait ArticleExtractor: Send + Sync {
    fn extract(&self, entry: &RawEntry) -> Article;
}
