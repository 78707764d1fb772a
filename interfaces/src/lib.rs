pub mod defs;

pub use defs::{Article, FeedSource, RawEntry, RawFeed};
