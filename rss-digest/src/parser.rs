use crate::rss_utils::text::content_hash;
use crate::traits::ArticleExtractor;
use crate::types::{Article, DigestError, RawEntry, RawFeed, Result};
use feed_rs::model::{Entry, Link};
use feed_rs::parser;
use tracing::debug;

pub const UNTITLED_ARTICLE: &str = "Untitled";
pub const UNTITLED_FEED: &str = "Untitled Feed";

pub struct FeedParser;

impl FeedParser {
    pub fn parse_feed(content: &[u8]) -> Result<RawFeed> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = parser::parse(content)
            .map_err(|e| DigestError::Parse(format!("Failed to parse feed: {}", e)))?;

        let title = feed.title.map(|t| t.content);
        let description = feed.description.map(|d| d.content);
        let link = primary_link(&feed.links);

        // Native entry order is preserved; selection happens later.
        let entries: Vec<RawEntry> = feed.entries.into_iter().map(Self::parse_entry).collect();

        debug!("Parsed feed with {} entries", entries.len());

        Ok(RawFeed {
            title,
            link,
            description,
            entries,
        })
    }

    fn parse_entry(entry: Entry) -> RawEntry {
        let link = primary_link(&entry.links).or_else(|| {
            // Some RSS feeds only carry a permalink guid
            let id = entry.id.trim();
            if id.starts_with("http://") || id.starts_with("https://") {
                Some(id.to_string())
            } else {
                None
            }
        });

        RawEntry {
            title: entry.title.map(|t| t.content),
            link,
            published: entry.published.map(|dt| dt.to_rfc3339()),
            updated: entry.updated.map(|dt| dt.to_rfc3339()),
            summary: entry.summary.map(|s| s.content),
            content: entry.content.and_then(|c| c.body),
        }
    }

    pub fn is_valid_feed_content(content: &str) -> bool {
        let content_lower = content.to_lowercase();

        content_lower.contains("<rss")
            || content_lower.contains("<feed")
            || content_lower.contains("<rdf:rdf")
            || content_lower.contains("<channel")
    }
}

fn primary_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")) && !l.href.trim().is_empty())
        .or_else(|| links.iter().find(|l| !l.href.trim().is_empty()))
        .map(|l| l.href.trim().to_string())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Default extractor: field fallbacks only, no summary heuristics.
#[derive(Debug, Default, Clone, Copy)]
pub struct EntryExtractor;

impl ArticleExtractor for EntryExtractor {
    fn extract(&self, entry: &RawEntry) -> Article {
        let title = non_empty(&entry.title).unwrap_or(UNTITLED_ARTICLE).to_string();
        let link = non_empty(&entry.link).unwrap_or_default().to_string();

        let id = if link.is_empty() {
            content_hash(&title)
        } else {
            link.clone()
        };

        let content = entry.content.clone().unwrap_or_default();
        let summary = non_empty(&entry.summary)
            .map(str::to_string)
            .unwrap_or_else(|| content.clone());

        Article {
            id,
            title,
            link,
            published: non_empty(&entry.published)
                .or_else(|| non_empty(&entry.updated))
                .unwrap_or_default()
                .to_string(),
            summary,
            content,
        }
    }
}

/// Take the first `limit` entries in feed order and extract them.
pub fn extract_articles(
    extractor: &dyn ArticleExtractor,
    entries: &[RawEntry],
    limit: usize,
) -> Vec<Article> {
    entries
        .iter()
        .take(limit)
        .map(|entry| extractor.extract(entry))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Example Blog</title>
    <link>https://example.com/</link>
    <description>Posts</description>
    <item>
      <title>Second post</title>
      <link>https://example.com/2</link>
      <pubDate>Tue, 02 Jan 2024 10:00:00 GMT</pubDate>
      <description>&lt;p&gt;Second&lt;/p&gt;</description>
    </item>
    <item>
      <title>First post</title>
      <link>https://example.com/1</link>
      <pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Feed</title>
  <id>urn:example</id>
  <updated>2024-03-05T12:00:00Z</updated>
  <entry>
    <title>Atom entry</title>
    <id>urn:example:1</id>
    <link href="https://atom.example.com/1"/>
    <updated>2024-03-05T12:00:00Z</updated>
    <summary>Short</summary>
  </entry>
</feed>"#;

    #[test]
    fn parses_rss_in_native_order() {
        let feed = FeedParser::parse_feed(RSS.as_bytes()).unwrap();
        assert_eq!(feed.title.as_deref(), Some("Example Blog"));
        assert_eq!(feed.entries.len(), 2);
        assert_eq!(feed.entries[0].link.as_deref(), Some("https://example.com/2"));
        assert_eq!(feed.entries[1].link.as_deref(), Some("https://example.com/1"));
        let published = feed.entries[0].published.as_deref().unwrap();
        assert!(published.starts_with("2024-01-02"));
    }

    #[test]
    fn atom_falls_back_to_updated() {
        let feed = FeedParser::parse_feed(ATOM.as_bytes()).unwrap();
        let article = EntryExtractor.extract(&feed.entries[0]);
        assert_eq!(article.link, "https://atom.example.com/1");
        assert_eq!(article.id, article.link);
        assert!(article.published.starts_with("2024-03-05"));
        assert_eq!(article.summary, "Short");
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = FeedParser::parse_feed(b"this is not xml").unwrap_err();
        assert!(matches!(err, DigestError::Parse(_)));
        assert!(!FeedParser::is_valid_feed_content("<html><body>Hi</body></html>"));
        assert!(FeedParser::is_valid_feed_content(RSS));
        assert!(FeedParser::is_valid_feed_content(ATOM));
    }

    #[test]
    fn missing_link_hashes_title() {
        let entry = RawEntry {
            title: Some("No link here".to_string()),
            ..Default::default()
        };
        let a = EntryExtractor.extract(&entry);
        let b = EntryExtractor.extract(&entry);
        assert!(a.link.is_empty());
        assert_eq!(a.id, b.id);
        assert_eq!(a.id, content_hash("No link here"));
    }

    #[test]
    fn missing_title_is_untitled() {
        let entry = RawEntry {
            link: Some("https://example.com/x".to_string()),
            content: Some("body".to_string()),
            ..Default::default()
        };
        let article = EntryExtractor.extract(&entry);
        assert_eq!(article.title, UNTITLED_ARTICLE);
        assert_eq!(article.summary, "body");
    }

    #[test]
    fn extract_takes_head_of_feed() {
        let entries: Vec<RawEntry> = (0..5)
            .map(|i| RawEntry {
                link: Some(format!("https://example.com/{}", i)),
                ..Default::default()
            })
            .collect();
        let articles = extract_articles(&EntryExtractor, &entries, 3);
        let links: Vec<_> = articles.iter().map(|a| a.link.as_str()).collect();
        assert_eq!(
            links,
            vec!["https://example.com/0", "https://example.com/1", "https://example.com/2"]
        );
    }
}
