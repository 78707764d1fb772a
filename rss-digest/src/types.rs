use serde::{Deserialize, Serialize};
// Use the interfaces crate for core types
pub use interfaces::defs::{Article, FeedSource, RawEntry, RawFeed};

pub const DEFAULT_SEEN_CAP: usize = 500;
pub const DEFAULT_CHECKPOINT_MIN: usize = 10;
pub const DEFAULT_CHECKPOINT_DIVISOR: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "rss-digest/0.1 (+feed reader)".to_string(),
            timeout_seconds: 10,
            max_feed_size_mb: 10,
            max_redirects: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub workers: usize,
    /// Max candidate articles taken from the head of each feed.
    pub limit: usize,
    pub seen_cap: usize,
    pub checkpoint_min: usize,
    pub checkpoint_divisor: usize,
}

impl SchedulerConfig {
    /// Completed-feed count between checkpoints: `max(min, n / divisor)`.
    pub fn checkpoint_interval(&self, source_count: usize) -> usize {
        let divided = source_count / self.checkpoint_divisor.max(1);
        self.checkpoint_min.max(divided).max(1)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            limit: 10,
            seen_cap: DEFAULT_SEEN_CAP,
            checkpoint_min: DEFAULT_CHECKPOINT_MIN,
            checkpoint_divisor: DEFAULT_CHECKPOINT_DIVISOR,
        }
    }
}

/// What a worker reports back to the collector for one feed.
#[derive(Debug)]
pub enum FeedOutcome {
    Fetched {
        source: FeedSource,
        candidates: Vec<Article>,
    },
    Failed {
        source: FeedSource,
        error: DigestError,
    },
}

/// Per-feed error tag surfaced in the run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedError {
    pub feed_title: String,
    pub feed_url: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub feeds_total: usize,
    pub feeds_processed: usize,
    pub new_count: usize,
    pub skipped_count: usize,
    pub errors: Vec<FeedError>,
    pub digest_path: Option<std::path::PathBuf>,
}

impl RunSummary {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status}")]
    HttpStatus { status: u16 },

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Feed size exceeds limit: {size_mb}MB")]
    FeedTooLarge { size_mb: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, DigestError>;
