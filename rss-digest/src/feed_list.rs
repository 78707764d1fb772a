use crate::persist::write_atomic;
use crate::rss_utils::url::extract_domain;
use crate::traits::FeedListProvider;
use crate::types::{FeedSource, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const FEEDS_FILE: &str = "feeds.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct FeedsFile {
    #[serde(default)]
    feeds: Vec<FeedSource>,
}

/// User-maintained `<root>/feeds.json`.
#[derive(Debug, Clone)]
pub struct LocalFeedList {
    path: PathBuf,
}

impl LocalFeedList {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(FEEDS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unparsable files give an empty list.
    pub fn load(&self) -> Vec<FeedSource> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Failed to read {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<FeedsFile>(&raw) {
            Ok(file) => file.feeds,
            Err(e) => {
                warn!("Ignoring unparsable feed list {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    pub fn save(&self, feeds: &[FeedSource]) -> Result<()> {
        let file = FeedsFile {
            feeds: feeds.to_vec(),
        };
        write_atomic(&self.path, |writer| {
            serde_json::to_writer_pretty(&mut *writer, &file)?;
            Ok(())
        })
    }

    /// Create an empty list if none exists. Returns true when created.
    pub fn init(&self) -> Result<bool> {
        if self.path.exists() {
            info!("Local feed list already exists: {}", self.path.display());
            return Ok(false);
        }
        self.save(&[])?;
        info!("Created local feed list: {}", self.path.display());
        Ok(true)
    }
}

#[async_trait]
impl FeedListProvider for LocalFeedList {
    fn provider_name(&self) -> String {
        format!("local ({})", self.path.display())
    }

    async fn feeds(&self) -> Result<Vec<FeedSource>> {
        Ok(self.load())
    }
}

/// Fixed list, e.g. feeds given on the command line or already imported
/// from an OPML document.
#[derive(Debug, Clone, Default)]
pub struct StaticFeedList {
    name: String,
    feeds: Vec<FeedSource>,
}

impl StaticFeedList {
    pub fn new(name: impl Into<String>, feeds: Vec<FeedSource>) -> Self {
        Self {
            name: name.into(),
            feeds,
        }
    }

    /// Build sources from bare URLs, titled by their domain.
    pub fn from_urls<I, S>(name: impl Into<String>, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let feeds = urls
            .into_iter()
            .map(|url| {
                let url = url.into();
                let title = extract_domain(&url).unwrap_or_else(|| url.clone());
                FeedSource::new(title, url)
            })
            .collect();
        Self::new(name, feeds)
    }
}

#[async_trait]
impl FeedListProvider for StaticFeedList {
    fn provider_name(&self) -> String {
        self.name.clone()
    }

    async fn feeds(&self) -> Result<Vec<FeedSource>> {
        Ok(self.feeds.clone())
    }
}

/// Concatenate providers in priority order and dedup by url (first wins).
/// A failing provider is logged and skipped.
pub async fn collect_all_feeds(providers: &[&dyn FeedListProvider]) -> Vec<FeedSource> {
    let mut all_feeds = Vec::new();
    let mut seen_urls = HashSet::new();

    for provider in providers {
        let feeds = match provider.feeds().await {
            Ok(feeds) => feeds,
            Err(e) => {
                warn!("Feed list provider {} failed: {}", provider.provider_name(), e);
                continue;
            }
        };

        let before = all_feeds.len();
        for feed in feeds {
            if feed.url.is_empty() {
                continue;
            }
            if seen_urls.insert(feed.url.clone()) {
                all_feeds.push(feed);
            }
        }
        debug!(
            "Provider {} contributed {} feeds",
            provider.provider_name(),
            all_feeds.len() - before
        );
    }

    all_feeds
}
