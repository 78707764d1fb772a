use crate::persist::{quarantine, write_atomic};
use crate::types::{Result, DEFAULT_SEEN_CAP};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const STATE_FILE: &str = "state.json";

/// Seen history for one feed: insertion-ordered, duplicate-free, bounded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedState {
    #[serde(default)]
    pub seen_urls: Vec<String>,
    #[serde(default)]
    pub last_fetch: Option<DateTime<Utc>>,
}

/// Process state keyed by feed URL. Serialized as `{"feeds": {...}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub feeds: BTreeMap<String, FeedState>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    pub fn feed(&self, feed_url: &str) -> Option<&FeedState> {
        self.feeds.get(feed_url)
    }

    /// Membership test; an unknown feed has seen nothing.
    pub fn is_seen(&self, feed_url: &str, link: &str) -> bool {
        self.feeds
            .get(feed_url)
            .map(|feed| feed.seen_urls.iter().any(|seen| seen == link))
            .unwrap_or(false)
    }

    /// Set view of the retained links, for filtering a batch at once.
    pub fn seen_links(&self, feed_url: &str) -> HashSet<&str> {
        self.feeds
            .get(feed_url)
            .map(|feed| feed.seen_urls.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Record `links` as seen with the default cap of 500.
    pub fn mark_seen<S: AsRef<str>>(&mut self, feed_url: &str, links: &[S]) {
        self.mark_seen_capped(feed_url, links, DEFAULT_SEEN_CAP);
    }

    pub fn mark_seen_capped<S: AsRef<str>>(&mut self, feed_url: &str, links: &[S], cap: usize) {
        self.mark_seen_at(feed_url, links, cap, Utc::now());
    }

    /// Append unseen links in first-seen order, evict from the front down to
    /// `cap` entries, and stamp `last_fetch`.
    pub fn mark_seen_at<S: AsRef<str>>(
        &mut self,
        feed_url: &str,
        links: &[S],
        cap: usize,
        now: DateTime<Utc>,
    ) {
        let feed = self.feeds.entry(feed_url.to_string()).or_default();

        let mut present: HashSet<String> = feed.seen_urls.iter().cloned().collect();
        for link in links {
            let link = link.as_ref();
            if present.insert(link.to_string()) {
                feed.seen_urls.push(link.to_string());
            }
        }

        if feed.seen_urls.len() > cap {
            let excess = feed.seen_urls.len() - cap;
            feed.seen_urls.drain(..excess);
        }

        feed.last_fetch = Some(now);
    }
}

/// Durable home of [`State`]: `<root>/state.json`.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(STATE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails: a missing file is an empty state, an unreadable one is
    /// renamed aside and replaced by an empty state.
    pub fn load(&self) -> State {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No state file at {}, starting empty", self.path.display());
                return State::new();
            }
            Err(e) => {
                warn!("Failed to read state file {}: {}", self.path.display(), e);
                self.quarantine();
                return State::new();
            }
        };

        match serde_json::from_str::<State>(&raw) {
            Ok(state) => {
                debug!(
                    "Loaded state for {} feeds from {}",
                    state.feeds.len(),
                    self.path.display()
                );
                state
            }
            Err(e) => {
                warn!("State file {} is corrupt: {}", self.path.display(), e);
                self.quarantine();
                State::new()
            }
        }
    }

    fn quarantine(&self) {
        match quarantine(&self.path) {
            Ok(target) => info!("Quarantined state file to {}", target.display()),
            Err(e) => warn!("Failed to quarantine state file {}: {}", self.path.display(), e),
        }
    }

    /// Atomic replace. Errors are returned to the caller.
    pub fn save(&self, state: &State) -> Result<()> {
        write_atomic(&self.path, |writer| {
            serde_json::to_writer_pretty(&mut *writer, state)?;
            Ok(())
        })?;
        debug!(
            "Saved state for {} feeds to {}",
            state.feeds.len(),
            self.path.display()
        );
        Ok(())
    }
}
