/// RSS-specific utility functions for the digest

/// URL utilities for RSS feeds
pub mod url {
    use url::Url;

    /// Extract domain from URL
    pub fn extract_domain(url_str: &str) -> Option<String> {
        if let Ok(url) = Url::parse(url_str) {
            url.domain().map(|d| d.to_string())
        } else {
            None
        }
    }

    /// Validate RSS feed URL format
    pub fn is_valid_rss_url(url_str: &str) -> bool {
        if let Ok(url) = Url::parse(url_str) {
            url.scheme() == "http" || url.scheme() == "https"
        } else {
            false
        }
    }

    /// Shorten a link for display: drop scheme and a leading `www.`, then
    /// hard-truncate to 40 characters.
    pub fn shorten_for_display(link: &str) -> String {
        let without_scheme = link
            .strip_prefix("https://")
            .or_else(|| link.strip_prefix("http://"))
            .map(|rest| rest.strip_prefix("www.").unwrap_or(rest))
            .unwrap_or(link);

        if without_scheme.chars().count() > 40 {
            let head: String = without_scheme.chars().take(37).collect();
            format!("{}...", head)
        } else {
            without_scheme.to_string()
        }
    }
}

/// RSS feed parsing utilities
pub mod feed {
    /// Extract clean text content from HTML
    pub fn extract_text_from_html(html: &str) -> String {
        // Simple HTML tag removal
        html.chars()
            .fold((String::new(), false), |(mut text, in_tag), c| match c {
                '<' => (text, true),
                '>' if in_tag => (text, false),
                _ if !in_tag => {
                    text.push(c);
                    (text, in_tag)
                }
                _ => (text, in_tag),
            })
            .0
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Text processing utilities
pub mod text {
    use sha2::{Digest, Sha256};

    /// Cut `text` to `max_chars` characters, appending `...` when anything
    /// was dropped.
    pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
        if text.chars().count() <= max_chars {
            return text.to_string();
        }
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }

    /// First `n` characters, or the whole string when shorter.
    pub fn prefix_chars(text: &str, n: usize) -> String {
        text.chars().take(n).collect()
    }

    /// Lowercase hex SHA-256 of `text`.
    pub fn content_hash(text: &str) -> String {
        format!("{:x}", Sha256::digest(text.as_bytes()))
    }

    /// Filesystem-safe slug.
    pub fn slugify(text: &str, max_len: usize) -> String {
        let mut slug = String::new();
        let mut last_dash = false;
        for c in text.to_lowercase().chars() {
            if c.is_alphanumeric() || c == '_' {
                slug.push(c);
                last_dash = false;
            } else if !last_dash {
                slug.push('-');
                last_dash = true;
            }
        }

        let mut slug = slug.trim_matches('-').to_string();
        if slug.chars().count() > max_len {
            slug = slug.chars().take(max_len).collect::<String>();
            slug = slug.trim_end_matches('-').to_string();
        }

        if slug.is_empty() {
            content_hash(text)[..12].to_string()
        } else {
            slug
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorten_strips_scheme_and_www() {
        assert_eq!(
            url::shorten_for_display("https://www.example.com/post"),
            "example.com/post"
        );
        assert_eq!(url::shorten_for_display("http://blog.rs/a"), "blog.rs/a");
    }

    #[test]
    fn shorten_truncates_long_links() {
        let link = format!("https://example.com/{}", "a".repeat(60));
        let short = url::shorten_for_display(&link);
        assert_eq!(short.chars().count(), 40);
        assert!(short.ends_with("..."));
        assert!(short.starts_with("example.com/"));
    }

    #[test]
    fn html_is_flattened() {
        let text = feed::extract_text_from_html("<p>Hello   <b>world</b></p>\n<br/>again");
        assert_eq!(text, "Hello world again");
    }

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(text::truncate_with_ellipsis("abc", 3), "abc");
        assert_eq!(text::truncate_with_ellipsis("abcd", 3), "abc...");
        assert_eq!(text::truncate_with_ellipsis("日本語テキスト", 3), "日本語...");
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(text::slugify("Hello, World!  Again", 60), "hello-world-again");
        assert_eq!(text::slugify("abc def ghi", 6), "abc-de");
        assert_eq!(text::slugify("abc def", 4), "abc");
    }

    #[test]
    fn slugify_falls_back_to_hash() {
        let slug = text::slugify("!!!", 60);
        assert_eq!(slug.len(), 12);
        assert_eq!(slug, text::slugify("!!!", 60));
    }

    #[test]
    fn valid_rss_urls() {
        assert!(url::is_valid_rss_url("https://example.com/feed.xml"));
        assert!(!url::is_valid_rss_url("ftp://example.com/feed.xml"));
        assert!(!url::is_valid_rss_url("not a url"));
        assert_eq!(
            url::extract_domain("https://blog.example.com/rss"),
            Some("blog.example.com".to_string())
        );
    }
}
