pub mod types;
pub mod config;
pub mod traits;
pub mod fetcher;
pub mod parser;
pub mod persist;
pub mod state;
pub mod digest;
pub mod feed_list;
pub mod scheduler;
pub mod rss_utils;

pub use types::*;
pub use config::Config;
pub use traits::{ArticleExtractor, FeedListProvider, FeedTransport};
pub use fetcher::Fetcher;
pub use parser::{EntryExtractor, FeedParser};
pub use state::{State, StateStore};
pub use digest::{DigestAccumulator, DigestRecord, FeedSection};
pub use feed_list::{collect_all_feeds, LocalFeedList, StaticFeedList};
pub use scheduler::FeedFetchScheduler;
