use crate::persist::write_atomic;
use crate::rss_utils::{feed, text, url};
use crate::types::{Article, Result};
use chrono::NaiveDate;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt::{self, Write as _};
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const STRUCTURED_FILE: &str = "digest.json";
pub const RENDERED_FILE: &str = "digest.md";
pub const ARTICLES_DIR: &str = "articles";

const SUMMARY_MAX_CHARS: usize = 400;
const PUBLISHED_CHARS: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSection {
    #[serde(default)]
    pub feed_url: String,
    #[serde(default)]
    pub articles: Vec<Article>,
}

/// One day's digest: feed title -> section, in insertion order.
///
/// Serialized as a JSON object whose key order is the section order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestRecord {
    sections: Vec<(String, FeedSection)>,
}

impl DigestRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn section(&self, feed_title: &str) -> Option<&FeedSection> {
        self.sections
            .iter()
            .find(|(title, _)| title == feed_title)
            .map(|(_, section)| section)
    }

    pub fn sections(&self) -> impl Iterator<Item = (&str, &FeedSection)> {
        self.sections.iter().map(|(title, section)| (title.as_str(), section))
    }

    pub fn total_articles(&self) -> usize {
        self.sections.iter().map(|(_, s)| s.articles.len()).sum()
    }

    pub fn feeds_with_articles(&self) -> usize {
        self.sections.iter().filter(|(_, s)| !s.articles.is_empty()).count()
    }

    /// Append `articles` to the section for `feed_title`, creating it if
    /// needed. Articles whose link is already in the section are dropped.
    /// Returns how many were appended.
    pub fn add_articles(
        &mut self,
        feed_title: &str,
        feed_url: &str,
        articles: impl IntoIterator<Item = Article>,
    ) -> usize {
        let index = match self.sections.iter().position(|(title, _)| title == feed_title) {
            Some(index) => index,
            None => {
                self.sections.push((
                    feed_title.to_string(),
                    FeedSection {
                        feed_url: feed_url.to_string(),
                        articles: Vec::new(),
                    },
                ));
                self.sections.len() - 1
            }
        };

        let section = &mut self.sections[index].1;
        if section.feed_url.is_empty() {
            section.feed_url = feed_url.to_string();
        }

        let mut links: HashSet<String> = section.articles.iter().map(|a| a.link.clone()).collect();
        let mut added = 0;
        for article in articles {
            if links.insert(article.link.clone()) {
                section.articles.push(article);
                added += 1;
            }
        }
        added
    }

    /// Merge every section of `other` into `self` (existing first, then new).
    pub fn merge_from(&mut self, other: &DigestRecord) -> usize {
        other
            .sections
            .iter()
            .map(|(title, section)| {
                self.add_articles(title, &section.feed_url, section.articles.iter().cloned())
            })
            .sum()
    }
}

impl Serialize for DigestRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sections.len()))?;
        for (title, section) in &self.sections {
            map.serialize_entry(title, section)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DigestRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = DigestRecord;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of feed title to digest section")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<DigestRecord, A::Error> {
                let mut record = DigestRecord::new();
                while let Some((title, section)) = access.next_entry::<String, FeedSection>()? {
                    record.add_articles(&title, &section.feed_url, section.articles);
                }
                Ok(record)
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}

/// Day-keyed digest storage under `<root>/<YYYY-MM-DD>/`.
#[derive(Debug, Clone)]
pub struct DigestAccumulator {
    data_dir: PathBuf,
}

impl DigestAccumulator {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn date_dir(&self, date: NaiveDate) -> PathBuf {
        self.data_dir.join(date.format("%Y-%m-%d").to_string())
    }

    pub fn structured_path(&self, date: NaiveDate) -> PathBuf {
        self.date_dir(date).join(STRUCTURED_FILE)
    }

    pub fn rendered_path(&self, date: NaiveDate) -> PathBuf {
        self.date_dir(date).join(RENDERED_FILE)
    }

    /// Where an external full-article cache would put this article.
    pub fn article_cache_path(&self, date: NaiveDate, feed_title: &str, article_title: &str) -> PathBuf {
        let file_name = format!(
            "{}--{}.md",
            text::slugify(feed_title, 30),
            text::slugify(article_title, 50)
        );
        self.date_dir(date).join(ARTICLES_DIR).join(file_name)
    }

    /// Absent or unreadable files yield an empty record. A lost merge base
    /// only means possible duplicates on the next merge.
    pub fn load_structured(&self, date: NaiveDate) -> DigestRecord {
        let path = self.structured_path(date);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return DigestRecord::new(),
            Err(e) => {
                warn!("Failed to read digest data {}: {}", path.display(), e);
                return DigestRecord::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!("Ignoring unparsable digest data {}: {}", path.display(), e);
                DigestRecord::new()
            }
        }
    }

    /// Merge `incoming` into the stored record for `date`, write the
    /// structured record back, regenerate the rendered digest in full, and
    /// return the rendered path.
    pub fn merge(&self, date: NaiveDate, incoming: &DigestRecord) -> Result<PathBuf> {
        let mut record = self.load_structured(date);
        let added = record.merge_from(incoming);

        let structured_path = self.structured_path(date);
        write_atomic(&structured_path, |writer| {
            serde_json::to_writer_pretty(&mut *writer, &record)?;
            Ok(())
        })?;

        let rendered = render_digest(date, &record);
        let rendered_path = self.rendered_path(date);
        write_atomic(&rendered_path, |writer| {
            writer.write_all(rendered.as_bytes())?;
            Ok(())
        })?;

        debug!(
            "Merged {} new articles into {} ({} total)",
            added,
            rendered_path.display(),
            record.total_articles()
        );
        info!("Digest saved: {}", rendered_path.display());
        Ok(rendered_path)
    }

    pub fn read_rendered(&self, date: NaiveDate) -> Result<Option<String>> {
        match fs::read_to_string(self.rendered_path(date)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Full markdown rendering of a day's record.
pub fn render_digest(date: NaiveDate, record: &DigestRecord) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# RSS Digest — {}\n", date.format("%Y-%m-%d"));

    let total = record.total_articles();
    if total == 0 {
        md.push_str("*No new articles today.*\n");
        return md;
    }

    for (feed_title, section) in record.sections() {
        if section.articles.is_empty() {
            continue;
        }

        let _ = writeln!(md, "## {}\n", feed_title);
        for (i, article) in section.articles.iter().enumerate() {
            render_article(&mut md, i + 1, article);
        }
    }

    md.push_str("---\n");
    let _ = writeln!(
        md,
        "*{} feeds, {} new articles*",
        record.feeds_with_articles(),
        total
    );
    md
}

fn render_article(md: &mut String, number: usize, article: &Article) {
    let _ = writeln!(md, "{}. **{}**", number, article.title);

    let mut meta = Vec::new();
    if !article.published.is_empty() {
        meta.push(text::prefix_chars(&article.published, PUBLISHED_CHARS));
    }
    if !article.link.is_empty() {
        meta.push(format!(
            "[{}]({})",
            url::shorten_for_display(&article.link),
            article.link
        ));
    }
    if !meta.is_empty() {
        let _ = writeln!(md, "   {}", meta.join(" | "));
    }

    let summary = feed::extract_text_from_html(&article.summary);
    if !summary.is_empty() {
        let _ = writeln!(
            md,
            "   > {}",
            text::truncate_with_ellipsis(&summary, SUMMARY_MAX_CHARS)
        );
    }
    md.push('\n');
}
