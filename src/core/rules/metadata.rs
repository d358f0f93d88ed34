//! Document-metadata extraction from issue and pull request bodies.
//!
//! Header-pattern sets locate a metadata block; every line after the block is run
//! through the configured two-group parser pattern. Bodies without a block fall back
//! to scraping `<meta name=".." content="..">` tags from the first linked content URL.

use crate::core::http::PageFetcher;
use crate::core::rules::schema::DocMetadataSettings;
use indexmap::IndexMap;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Extracted key/value fields; keys are lower-cased.
pub type DocMetadata = IndexMap<String, String>;

fn meta_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)<meta\s+name\s*=\s*"([^"]+)"\s+content\s*=\s*"([^"]*)"\s*/?>"#)
            .expect("meta tag pattern is valid")
    })
}

fn markdown_link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("markdown link pattern is valid")
    })
}

fn html_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]+>").expect("html tag pattern is valid"))
}

/// Result of the header scan.
#[derive(Debug, Default, PartialEq)]
pub struct HeaderMatch {
    pub fields: DocMetadata,
    /// The lines that formed the matched header block.
    pub header_lines: Vec<String>,
}

pub struct MetadataExtractor<'a> {
    fetcher: &'a dyn PageFetcher,
}

impl<'a> MetadataExtractor<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher) -> Self {
        Self { fetcher }
    }

    /// Populate `metadata` from `body`. No-op when `metadata` is already populated.
    pub async fn extract(
        &self,
        body: &str,
        settings: &DocMetadataSettings,
        metadata: &mut DocMetadata,
    ) {
        if !metadata.is_empty() {
            return;
        }
        let body = normalize_line_endings(body);

        if let Some(found) = scan_headers(&body, settings) {
            metadata.extend(found.fields);
            // A content URL inside the header block itself is scraped too; header fields win.
            let header_text = found.header_lines.join("\n");
            if let Some(url) = find_content_url(&header_text, &settings.content_url_regex) {
                for (key, value) in self.scrape(&url).await {
                    metadata.entry(key).or_insert(value);
                }
            }
            if !metadata.is_empty() {
                return;
            }
        }

        if let Some(url) = find_content_url(&body, &settings.content_url_regex) {
            metadata.extend(self.scrape(&url).await);
        }
    }

    async fn scrape(&self, url: &str) -> DocMetadata {
        debug!(url, "scraping metadata from content page");
        match self.fetcher.fetch_text(url).await {
            Ok(html) => scrape_meta_tags(&html),
            Err(err) => {
                warn!(url, "failed to fetch content page: {}", err.message);
                DocMetadata::new()
            }
        }
    }
}

pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Locate the first header-pattern set that matches and parse the lines after it.
///
/// Returns `None` when no set matches or no parser pattern is configured.
pub fn scan_headers(body: &str, settings: &DocMetadataSettings) -> Option<HeaderMatch> {
    let pattern = settings.parser_regex.as_deref()?;
    let parser = match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(err) => {
            warn!("invalid metadata parser pattern: {}", err);
            return None;
        }
    };
    let lines: Vec<&str> = body.lines().collect();

    for set in &settings.headers {
        let Some(start) = find_header_block(&lines, set) else {
            continue;
        };
        let end = start + set.len();
        let mut fields = DocMetadata::new();
        for line in &lines[end..] {
            if let Some(caps) = parser.captures(line.trim()) {
                let (Some(key), Some(value)) = (caps.get(1), caps.get(2)) else {
                    continue;
                };
                let key = key.as_str().trim().to_lowercase();
                if key.is_empty() {
                    continue;
                }
                fields.insert(key, strip_markup(value.as_str()));
            }
        }
        return Some(HeaderMatch {
            fields,
            header_lines: lines[start..end].iter().map(|line| line.to_string()).collect(),
        });
    }
    None
}

fn find_header_block(lines: &[&str], set: &[String]) -> Option<usize> {
    if set.is_empty() || lines.len() < set.len() {
        return None;
    }
    (0..=lines.len() - set.len()).find(|&start| {
        set.iter().enumerate().all(|(offset, prefix)| {
            prefix.is_empty() || lines[start + offset].starts_with(prefix.as_str())
        })
    })
}

/// First match of any content URL pattern, in pattern order.
pub fn find_content_url(text: &str, patterns: &[String]) -> Option<String> {
    patterns.iter().find_map(|pattern| match Regex::new(pattern) {
        Ok(regex) => regex.find(text).map(|m| m.as_str().to_string()),
        Err(err) => {
            warn!(pattern = %pattern, "invalid content URL pattern: {}", err);
            None
        }
    })
}

pub fn scrape_meta_tags(html: &str) -> DocMetadata {
    let mut metadata = DocMetadata::new();
    for caps in meta_tag_pattern().captures_iter(html) {
        let key = caps[1].trim().to_lowercase();
        if !key.is_empty() {
            metadata.insert(key, caps[2].trim().to_string());
        }
    }
    metadata
}

/// Remove light markdown/HTML decoration from a field value.
pub fn strip_markup(value: &str) -> String {
    let value = markdown_link_pattern().replace_all(value, "$1");
    let value = html_tag_pattern().replace_all(&value, "");
    value
        .replace("**", "")
        .replace("__", "")
        .replace('`', "")
        .trim()
        .trim_matches(|c| c == '*' || c == '_')
        .trim()
        .to_string()
}
