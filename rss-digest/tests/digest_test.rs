use chrono::NaiveDate;
use rss_digest::digest::{STRUCTURED_FILE, RENDERED_FILE};
use rss_digest::{Article, DigestAccumulator, DigestRecord, Result};
use std::fs;
use std::sync::Once;
use tempfile::TempDir;
use tracing::info;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

const BLOG_URL: &str = "https://blog.example.com/feed";

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn article(name: &str) -> Article {
    Article {
        id: format!("https://blog.example.com/{}", name),
        title: format!("Post {}", name),
        link: format!("https://blog.example.com/{}", name),
        published: "2024-01-01T08:00:00+00:00".to_string(),
        summary: format!("<p>About <b>{}</b></p>", name),
        content: String::new(),
    }
}

fn record(feed_title: &str, names: &[&str]) -> DigestRecord {
    let mut record = DigestRecord::new();
    record.add_articles(feed_title, BLOG_URL, names.iter().map(|n| article(n)));
    record
}

fn titles(record: &DigestRecord, feed_title: &str) -> Vec<String> {
    record
        .section(feed_title)
        .map(|s| s.articles.iter().map(|a| a.title.clone()).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_merge_appends_only_unseen_links() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let digest = DigestAccumulator::new(dir.path());

    digest.merge(day(), &record("Blog", &["A", "B"]))?;
    let rendered_path = digest.merge(day(), &record("Blog", &["B", "C"]))?;

    let stored = digest.load_structured(day());
    assert_eq!(titles(&stored, "Blog"), vec!["Post A", "Post B", "Post C"]);
    assert_eq!(stored.section("Blog").unwrap().feed_url, BLOG_URL);

    assert_eq!(rendered_path, dir.path().join("2024-01-01").join(RENDERED_FILE));
    let rendered = fs::read_to_string(&rendered_path)?;
    assert!(rendered.starts_with("# RSS Digest — 2024-01-01"));
    assert!(rendered.contains("## Blog"));
    assert!(rendered.contains("3. **Post C**"));
    assert!(rendered.contains("*1 feeds, 3 new articles*"));
    info!("Rendered digest:\n{}", rendered);
    Ok(())
}

#[tokio::test]
async fn test_merge_is_idempotent() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let digest = DigestAccumulator::new(dir.path());
    let incoming = record("Blog", &["A", "B"]);

    let path = digest.merge(day(), &incoming)?;
    let first_json = fs::read_to_string(digest.structured_path(day()))?;
    let first_md = fs::read_to_string(&path)?;

    digest.merge(day(), &incoming)?;
    assert_eq!(fs::read_to_string(digest.structured_path(day()))?, first_json);
    assert_eq!(fs::read_to_string(&path)?, first_md);
    Ok(())
}

#[tokio::test]
async fn test_sections_keep_insertion_order() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let digest = DigestAccumulator::new(dir.path());

    digest.merge(day(), &record("Zeta", &["z1"]))?;
    let mut second = record("Alpha", &["a1"]);
    second.add_articles("Zeta", BLOG_URL, vec![article("z2")]);
    digest.merge(day(), &second)?;

    let stored = digest.load_structured(day());
    let order: Vec<&str> = stored.sections().map(|(title, _)| title).collect();
    assert_eq!(order, vec!["Zeta", "Alpha"]);
    assert_eq!(titles(&stored, "Zeta"), vec!["Post z1", "Post z2"]);

    let json = fs::read_to_string(digest.structured_path(day()))?;
    let zeta = json.find("\"Zeta\"").unwrap();
    let alpha = json.find("\"Alpha\"").unwrap();
    assert!(zeta < alpha);
    Ok(())
}

#[tokio::test]
async fn test_corrupt_structured_digest_is_treated_as_empty() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let digest = DigestAccumulator::new(dir.path());

    digest.merge(day(), &record("Blog", &["A"]))?;
    fs::write(digest.structured_path(day()), "{\"Blog\": [")?;

    digest.merge(day(), &record("Blog", &["B"]))?;
    let stored = digest.load_structured(day());
    assert_eq!(titles(&stored, "Blog"), vec!["Post B"]);
    Ok(())
}

#[tokio::test]
async fn test_rendered_digest_is_regenerated_not_appended() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let digest = DigestAccumulator::new(dir.path());

    digest.merge(day(), &record("Blog", &["A"]))?;
    digest.merge(day(), &record("Blog", &["B"]))?;

    let rendered = digest.read_rendered(day())?.unwrap();
    assert_eq!(rendered.matches("# RSS Digest").count(), 1);
    assert_eq!(rendered.matches("## Blog").count(), 1);
    assert!(rendered.contains("1. **Post A**"));
    assert!(rendered.contains("2. **Post B**"));
    // summaries are stripped of markup
    assert!(rendered.contains("   > About A"));
    assert!(!rendered.contains("<b>"));
    Ok(())
}

#[tokio::test]
async fn test_empty_merge_writes_placeholder_digest() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let digest = DigestAccumulator::new(dir.path());

    let path = digest.merge(day(), &DigestRecord::new())?;
    let rendered = fs::read_to_string(path)?;
    assert!(rendered.contains("*No new articles today.*"));
    assert!(digest.structured_path(day()).ends_with(STRUCTURED_FILE));
    assert!(digest.structured_path(day()).exists());
    Ok(())
}

#[tokio::test]
async fn test_read_rendered_for_missing_day() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let digest = DigestAccumulator::new(dir.path());
    let other_day = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();

    digest.merge(day(), &record("Blog", &["A"]))?;
    assert!(digest.read_rendered(other_day)?.is_none());
    assert!(digest.read_rendered(day())?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_article_cache_path_layout() {
    init_tracing();
    let digest = DigestAccumulator::new("/data/rss");
    let path = digest.article_cache_path(day(), "Example Blog", "Hello, World!");
    assert_eq!(
        path,
        std::path::PathBuf::from("/data/rss/2024-01-01/articles/example-blog--hello-world.md")
    );
}
