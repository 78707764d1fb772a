use serde::{Deserialize, Serialize};

/// A syndication source as handed over by a feed-list provider.
/// Identity is `url`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub html_url: String,
}

impl FeedSource {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            html_url: String::new(),
        }
    }

    pub fn with_html_url(mut self, html_url: impl Into<String>) -> Self {
        self.html_url = html_url.into();
        self
    }
}

/// One extracted article. Dedup identity is `link`, not `id`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    // opaque, never reparsed for ordering
    #[serde(default)]
    pub published: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub published: Option<String>,
    pub updated: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawFeed {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub entries: Vec<RawEntry>,
}

// Object style note:
// RawFeed/RawEntry are what a transport+parser hands back, in the provider's
// native entry order. Turning a RawEntry into an Article is the job of an
// article extractor; the core never looks at RawEntry fields directly.
