//! Integration tests for harvest runs
//!
//! These tests use wiremock to create mock HTTP servers and run crawl,
//! feed and archive sources end-to-end through the HTTP fetcher.

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zbze_harvest::config::{parse_config, Config};
use zbze_harvest::crawler::{HarvestRun, HttpFetcher, RunSummary, YearOverrides};
use zbze_harvest::storage::{log_path, read_records, RecordStore, RunStatus};

/// Builds a configuration whose sources all point at the mock server
fn create_test_config(base_url: &str, data_dir: &Path, obey_robots: bool) -> Config {
    let toml = format!(
        r#"
[harvester]
data-dir = '{data_dir}'
request-delay = 0
max-concurrent-requests = 2
max-retries = 1
request-timeout = 5
obey-robots = {obey_robots}

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[[source]]
kind = "crawl"
name = "apkbr_ru"
allowed-domains = ["127.0.0.1"]
start-urls = ["{base_url}/"]

[[source.rule]]
allow = "/node"

[[source.field]]
name = "title"
selector = "h1.title"

[[source.field]]
name = "publication_date"
selector = "div.meta.submitted span"
attr = "content"

[[source.field]]
name = "content"
selector = "div.field-name-body"
mode = "all-text"

[[source.field]]
name = "author"
selector = "div.field-name-field-author .field-item"

[[source]]
kind = "feed"
name = "apkbr_ru_rss"
allowed-domains = ["127.0.0.1"]
feed-template = "{base_url}/taxonomy/term/{{channel}}/feed"
channels = [1, 2]

[[source.field]]
name = "url"
path = "link"

[[source.field]]
name = "title"
path = "title"

[[source.field]]
name = "author"
path = "dc:creator"

[[source]]
kind = "archive"
name = "oshhamaho"
allowed-domains = ["127.0.0.1"]
url-template = "{base_url}/oshhamaho{{year}}"
asset-pattern = '^/arhiv/\d{{4}}/pressa/oshamaho/.*\.pdf$'
start-year = 2019
end-year = 2020
"#,
        data_dir = data_dir.display(),
        base_url = base_url,
        obey_robots = obey_robots,
    );

    parse_config(&toml).expect("Failed to parse test config")
}

fn article(title: &str, author: Option<&str>, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{}">link</a>"#, href))
        .collect();
    let author = author
        .map(|a| {
            format!(
                r#"<div class="field-name-field-author"><div class="field-item">{}</div></div>"#,
                a
            )
        })
        .unwrap_or_default();

    format!(
        r#"<html><body>
        <h1 class="title"> {title} </h1>
        <div class="meta submitted"><span content="2023-05-01T10:00:00+03:00">1 мая</span></div>
        <div class="field-name-body"><p>Первый абзац.</p><p>Второй абзац.</p></div>
        {author}
        {anchors}
        </body></html>"#
    )
}

async fn mount_page(server: &MockServer, route: &str, body: String, expected: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/html"),
        )
        .expect(expected)
        .mount(server)
        .await;
}

async fn run_source(config: &Config, name: &str, years: YearOverrides) -> (HarvestRun, RunSummary) {
    let fetcher = Arc::new(
        HttpFetcher::new(&config.user_agent, &config.harvester).expect("Failed to build fetcher"),
    );
    let source = config.source(name).expect("Source not configured");
    let mut run = HarvestRun::new(source, &config.harvester, fetcher, "test-hash", years)
        .expect("Failed to prepare run");
    let summary = run.run().await.expect("Run failed");
    (run, summary)
}

#[tokio::test]
async fn test_full_crawl_extracts_articles() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&base, dir.path(), false);

    mount_page(
        &server,
        "/",
        article("Главная", None, &["/node/1", "/node/2", "/other/3"]),
        1,
    )
    .await;
    mount_page(
        &server,
        "/node/1",
        article("Первая", Some("Иванов"), &["/node/2"]),
        1,
    )
    .await;
    mount_page(&server, "/node/2", article("Вторая", None, &["/node/1"]), 1).await;
    mount_page(&server, "/other/3", article("Чужая", None, &[]), 0).await;

    let (run, summary) = run_source(&config, "apkbr_ru", YearOverrides::default()).await;

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.pages_fetched, 3);
    assert_eq!(summary.counters.records_extracted, 2);
    assert_eq!(run.store().count().unwrap(), 2);

    let first = run
        .store()
        .get(&format!("{}/node/1", base))
        .unwrap()
        .expect("Article missing from store");
    assert_eq!(first.get("title"), Some("Первая"));
    assert_eq!(first.get("publication_date"), Some("2023-05-01T10:00:00+03:00"));
    assert_eq!(first.get("content"), Some("Первый абзац.Второй абзац."));
    assert_eq!(first.get("author"), Some("Иванов"));

    let second = run.store().get(&format!("{}/node/2", base)).unwrap().unwrap();
    assert!(second.has_field("author"));
    assert_eq!(second.get("author"), None);

    assert!(run.store().get(&format!("{}/", base)).unwrap().is_none());
}

#[tokio::test]
async fn test_repeated_crawl_is_idempotent_in_store() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&base, dir.path(), false);

    mount_page(&server, "/", article("Главная", None, &["/node/1"]), 2).await;
    mount_page(&server, "/node/1", article("Первая", None, &[]), 2).await;

    let (first, _) = run_source(&config, "apkbr_ru", YearOverrides::default()).await;
    let source_dir = first.source_dir().to_path_buf();
    drop(first);
    let (second, _) = run_source(&config, "apkbr_ru", YearOverrides::default()).await;

    assert_eq!(second.store().count().unwrap(), 1);
    let logged = read_records(&log_path(&source_dir, "apkbr_ru")).unwrap();
    assert_eq!(logged.len(), 2);
    assert_eq!(logged[0], logged[1]);

    let runs = second.store().recent_runs(10).unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.status == RunStatus::Completed));
    assert!(runs.iter().all(|r| r.config_hash == "test-hash"));
}

#[tokio::test]
async fn test_robots_txt_respected() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&base, dir.path(), true);

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /node/private"),
        )
        .expect(1)
        .mount(&server)
        .await;

    mount_page(
        &server,
        "/",
        article("Главная", None, &["/node/public", "/node/private"]),
        1,
    )
    .await;
    mount_page(&server, "/node/public", article("Открытая", None, &[]), 1).await;
    mount_page(&server, "/node/private", article("Закрытая", None, &[]), 0).await;

    let (run, summary) = run_source(&config, "apkbr_ru", YearOverrides::default()).await;

    assert_eq!(summary.counters.records_extracted, 1);
    assert_eq!(summary.counters.fetch_failures, 1);
    assert!(run
        .store()
        .get(&format!("{}/node/private", base))
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&base, dir.path(), false);

    mount_page(&server, "/", article("Главная", None, &["/node/1"]), 1).await;
    Mock::given(method("GET"))
        .and(path("/node/1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/node/1", article("Первая", None, &[]), 1).await;

    let (run, summary) = run_source(&config, "apkbr_ru", YearOverrides::default()).await;

    assert_eq!(summary.counters.fetch_failures, 0);
    assert_eq!(run.store().count().unwrap(), 1);
}

#[tokio::test]
async fn test_feed_harvest() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&base, dir.path(), false);

    let feed = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Новости</title>
    <item>
      <title>Первая</title>
      <link>{base}/node/1</link>
      <dc:creator>Иванов</dc:creator>
    </item>
    <item>
      <title>Первая</title>
      <link>{base}/node/1</link>
      <dc:creator>Иванов</dc:creator>
    </item>
    <item>
      <title>Вторая</title>
      <link>{base}/node/2</link>
    </item>
  </channel>
</rss>"#
    );

    Mock::given(method("GET"))
        .and(path("/taxonomy/term/1/feed"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/rss+xml; charset=utf-8")
                .set_body_string(feed),
        )
        .expect(1)
        .mount(&server)
        .await;

    // Channel 2 is down: one attempt plus one retry, then skipped
    Mock::given(method("GET"))
        .and(path("/taxonomy/term/2/feed"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let (run, summary) = run_source(&config, "apkbr_ru_rss", YearOverrides::default()).await;

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.counters.records_extracted, 3);
    assert_eq!(summary.counters.fetch_failures, 1);
    assert_eq!(run.store().count().unwrap(), 2);

    let logged = read_records(&log_path(run.source_dir(), "apkbr_ru_rss")).unwrap();
    assert_eq!(logged.len(), 3);

    let second = run.store().get(&format!("{}/node/2", base)).unwrap().unwrap();
    assert_eq!(second.get("title"), Some("Вторая"));
    assert_eq!(second.get("author"), None);
}

#[tokio::test]
async fn test_archive_harvest() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&base, dir.path(), false);

    Mock::given(method("GET"))
        .and(path("/oshhamaho2019"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    mount_page(
        &server,
        "/oshhamaho2020",
        r#"<html><body>
            <a href="/arhiv/2020/pressa/oshamaho/01.2020.pdf">Январь</a>
            <a href="/arhiv/2020/pressa/oshamaho/02.2020.pdf">Февраль</a>
            <a href="/arhiv/2020/pressa/other/03.2020.pdf">Другое</a>
            <a href="/news/1">Новость</a>
        </body></html>"#
            .to_string(),
        1,
    )
    .await;

    for name in ["01.2020.pdf", "02.2020.pdf"] {
        Mock::given(method("GET"))
            .and(path(format!("/arhiv/2020/pressa/oshamaho/{}", name)))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes(format!("%PDF-1.4 {}", name).into_bytes()),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/arhiv/2020/pressa/other/03.2020.pdf"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (run, summary) = run_source(&config, "oshhamaho", YearOverrides::default()).await;

    assert_eq!(summary.counters.assets_saved, 2);
    assert_eq!(summary.counters.fetch_failures, 1);

    let saved = std::fs::read(run.source_dir().join("01.2020.pdf")).unwrap();
    assert_eq!(saved, b"%PDF-1.4 01.2020.pdf");
    assert!(run.source_dir().join("02.2020.pdf").exists());
    assert!(!run.source_dir().join("03.2020.pdf").exists());
}

#[tokio::test]
async fn test_archive_year_override() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&base, dir.path(), false);

    mount_page(&server, "/oshhamaho2019", String::new(), 0).await;
    mount_page(&server, "/oshhamaho2020", "<html></html>".to_string(), 1).await;

    let years = YearOverrides {
        start: Some(2020),
        end: None,
    };
    let (_, summary) = run_source(&config, "oshhamaho", years).await;

    assert_eq!(summary.pages_fetched, 1);
}
