use rulebot::core::http::HttpPageFetcher;
use rulebot::core::rules::metadata::{find_content_url, scan_headers, scrape_meta_tags};
use rulebot::core::rules::schema::DocMetadataSettings;
use rulebot::core::rules::{DocMetadata, MetadataExtractor};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PARSER: &str = r"^\*\s*([^:]+):\s*(.*)$";

fn settings(server: &MockServer) -> DocMetadataSettings {
    DocMetadataSettings {
        headers: vec![vec![
            "---".to_string(),
            "#### Document Details".to_string(),
            "* Content".to_string(),
        ]],
        content_url_regex: vec![format!(r"{}/docs/[a-z\-/]+", regex::escape(&server.uri()))],
        parser_regex: Some(PARSER.to_string()),
    }
}

async fn serve_page(server: &MockServer, page: &str, meta: &[(&str, &str)]) {
    let tags: String = meta
        .iter()
        .map(|(name, content)| format!("<meta name=\"{}\" content=\"{}\" />\n", name, content))
        .collect();
    let html = format!("<html><head>\n{}</head><body>page</body></html>", tags);
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(server)
        .await;
}

fn fetcher() -> HttpPageFetcher {
    HttpPageFetcher::new(Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn header_block_fields_and_linked_page_are_merged() {
    let server = MockServer::start().await;
    serve_page(
        &server,
        "/docs/azure/quickstart",
        &[("ms.author", "page-author"), ("ms.service", "storage")],
    )
    .await;
    let settings = settings(&server);
    let body = format!(
        "The sample is broken.\r\n\r\n---\r\n#### Document Details\r\n* Content: [Quickstart]({}/docs/azure/quickstart)\r\n* ms.author: **jdoe**\r\n* Service: `storage`\r\n",
        server.uri()
    );

    let fetcher = fetcher();
    let mut metadata = DocMetadata::new();
    MetadataExtractor::new(&fetcher)
        .extract(&body, &settings, &mut metadata)
        .await;

    // The content line belongs to the header block, so it is scraped rather than parsed.
    assert!(metadata.get("content").is_none());
    // Header fields win over the scraped page.
    assert_eq!(metadata.get("ms.author").map(String::as_str), Some("jdoe"));
    assert_eq!(metadata.get("service").map(String::as_str), Some("storage"));
    assert_eq!(metadata.get("ms.service").map(String::as_str), Some("storage"));
}

#[tokio::test]
async fn body_link_is_scraped_when_there_is_no_header_block() {
    let server = MockServer::start().await;
    serve_page(&server, "/docs/intro", &[("ms.topic", "overview")]).await;
    let settings = settings(&server);
    let body = format!("See {}/docs/intro for details.", server.uri());

    let fetcher = fetcher();
    let mut metadata = DocMetadata::new();
    MetadataExtractor::new(&fetcher)
        .extract(&body, &settings, &mut metadata)
        .await;

    assert_eq!(metadata.len(), 1);
    assert_eq!(metadata.get("ms.topic").map(String::as_str), Some("overview"));
}

#[tokio::test]
async fn unreachable_page_leaves_metadata_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let settings = settings(&server);
    let body = format!("Broken: {}/docs/missing", server.uri());

    let fetcher = fetcher();
    let mut metadata = DocMetadata::new();
    MetadataExtractor::new(&fetcher)
        .extract(&body, &settings, &mut metadata)
        .await;
    assert!(metadata.is_empty());
}

#[tokio::test]
async fn body_without_header_or_link_yields_nothing() {
    let server = MockServer::start().await;
    let settings = settings(&server);
    let fetcher = fetcher();
    let mut metadata = DocMetadata::new();
    MetadataExtractor::new(&fetcher)
        .extract("Just a question about pricing.", &settings, &mut metadata)
        .await;
    assert!(metadata.is_empty());
}

#[tokio::test]
async fn populated_metadata_is_not_extracted_twice() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<meta name=\"ms.author\" content=\"other\">",
        ))
        .expect(0)
        .mount(&server)
        .await;
    let settings = settings(&server);
    let body = format!("{}/docs/page", server.uri());

    let fetcher = fetcher();
    let mut metadata = DocMetadata::new();
    metadata.insert("ms.author".to_string(), "jdoe".to_string());
    MetadataExtractor::new(&fetcher)
        .extract(&body, &settings, &mut metadata)
        .await;
    assert_eq!(metadata.get("ms.author").map(String::as_str), Some("jdoe"));
}

#[test]
fn header_sets_are_tried_in_order() {
    let settings = DocMetadataSettings {
        headers: vec![
            vec!["### Missing".to_string()],
            vec!["".to_string(), "Details".to_string()],
        ],
        content_url_regex: vec![],
        parser_regex: Some(PARSER.to_string()),
    };
    let body = "intro\nDetails\n* ID: 42\nnot a field\n* Owner: <b>team</b>";
    let found = scan_headers(body, &settings).unwrap();

    assert_eq!(found.header_lines, vec!["intro", "Details"]);
    assert_eq!(found.fields.get("id").map(String::as_str), Some("42"));
    assert_eq!(found.fields.get("owner").map(String::as_str), Some("team"));
}

#[test]
fn no_parser_pattern_means_no_header_scan() {
    let settings = DocMetadataSettings {
        headers: vec![vec!["Details".to_string()]],
        content_url_regex: vec![],
        parser_regex: None,
    };
    assert!(scan_headers("Details\n* ID: 1", &settings).is_none());
}

#[test]
fn content_url_patterns_keep_their_order_and_skip_bad_ones() {
    let patterns = vec![
        "([".to_string(),
        r"https://learn\.example\.com/\S+".to_string(),
        r"https://\S+".to_string(),
    ];
    let text = "see https://other.example.com/a and https://learn.example.com/b";
    assert_eq!(
        find_content_url(text, &patterns).as_deref(),
        Some("https://learn.example.com/b")
    );
}

#[test]
fn meta_tags_are_case_insensitive_and_keys_lowercased() {
    let html = r#"<META NAME="MS.Author" CONTENT=" jdoe "><meta name="empty" content="">"#;
    let metadata = scrape_meta_tags(html);
    assert_eq!(metadata.get("ms.author").map(String::as_str), Some("jdoe"));
    assert_eq!(metadata.get("empty").map(String::as_str), Some(""));
}
