//! Harvest run coordinator
//!
//! A [`HarvestRun`] owns everything scoped to one run of one source: the
//! frontier, the record sink, the asset sink and the counters. It drives
//! one of three strategies:
//! - crawl: rule-driven link traversal from seed pages
//! - feed: one request per channel, one record per feed entry
//! - archive: one index page per year, every matching asset downloaded
//!
//! Fetch failures are logged, counted and skipped. Persistence failures
//! end the run with an error.

use crate::config::{HarvesterConfig, SourceConfig};
use crate::crawler::fetcher::{DocumentFetcher, FetchedDocument};
use crate::crawler::frontier::Frontier;
use crate::crawler::parser::extract_links;
use crate::extract::{FeedRuleSet, HtmlRuleSet, Record};
use crate::storage::{
    open_store, AssetSink, RecordSink, RecordStore, RunCounters, RunStatus, SqliteRecordStore,
};
use crate::url::{
    classify_link, extract_domain, flatten_path, is_domain_allowed, normalize_url,
    LinkClassification, TraversalRule,
};
use crate::{ConfigError, Result};
use regex::Regex;
use scraper::Html;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Year bounds given on the command line, overriding the config file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct YearOverrides {
    pub start: Option<i32>,
    pub end: Option<i32>,
}

/// Outcome of one run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub source: String,
    pub kind: &'static str,
    pub run_id: i64,
    pub status: RunStatus,
    pub counters: RunCounters,
    pub pages_fetched: u64,
    pub elapsed: Duration,
}

/// Compiled, ready-to-run form of a source
enum Plan {
    Crawl {
        seeds: Vec<Url>,
        allowed_domains: Vec<String>,
        rules: Vec<TraversalRule>,
        fields: HtmlRuleSet,
        dump_html: bool,
    },
    Feed {
        urls: Vec<String>,
        allowed_domains: Vec<String>,
        rules: FeedRuleSet,
    },
    Archive {
        index_pages: Vec<(i32, String)>,
        allowed_domains: Vec<String>,
        asset_pattern: Regex,
    },
}

impl Plan {
    fn compile(source: &SourceConfig, years: YearOverrides) -> std::result::Result<Self, ConfigError> {
        match source {
            SourceConfig::Crawl(crawl) => {
                let seeds = crawl
                    .start_urls
                    .iter()
                    .map(|s| {
                        Url::parse(s).map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", s, e)))
                    })
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                let rules = crawl
                    .rules
                    .iter()
                    .map(TraversalRule::compile)
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                Ok(Self::Crawl {
                    seeds,
                    allowed_domains: crawl.allowed_domains.clone(),
                    rules,
                    fields: HtmlRuleSet::compile(&crawl.fields)?,
                    dump_html: crawl.dump_html,
                })
            }
            SourceConfig::Feed(feed) => Ok(Self::Feed {
                urls: feed.feed_urls(),
                allowed_domains: feed.allowed_domains.clone(),
                rules: FeedRuleSet::new(&feed.item_tag, &feed.fields, &feed.namespaces),
            }),
            SourceConfig::Archive(archive) => {
                let range = archive.year_range(years.start, years.end)?;
                let asset_pattern = Regex::new(&archive.asset_pattern).map_err(|e| {
                    ConfigError::InvalidPattern(format!("'{}': {}", archive.asset_pattern, e))
                })?;

                Ok(Self::Archive {
                    index_pages: range
                        .years()
                        .map(|year| (year, archive.year_url(year)))
                        .collect(),
                    allowed_domains: archive.allowed_domains.clone(),
                    asset_pattern,
                })
            }
        }
    }
}

/// One harvest run of one source
pub struct HarvestRun {
    source: String,
    kind: &'static str,
    plan: Arc<Plan>,
    fetcher: Arc<dyn DocumentFetcher>,
    sink: RecordSink,
    assets: AssetSink,
    counters: RunCounters,
    pages_fetched: u64,
    started: Instant,
    status: RunStatus,
}

impl HarvestRun {
    /// Prepares a run: compiles the source, opens its outputs and records
    /// the run as started
    ///
    /// Configuration problems, including an inverted year range, are
    /// reported here, before anything is fetched or written.
    ///
    /// # Arguments
    ///
    /// * `source` - The source to harvest
    /// * `harvester` - Output directory and asset policy
    /// * `fetcher` - Where documents come from
    /// * `config_hash` - Hash of the config file, stored with the run
    /// * `years` - Year bounds overriding the archive source's own
    pub fn new(
        source: &SourceConfig,
        harvester: &HarvesterConfig,
        fetcher: Arc<dyn DocumentFetcher>,
        config_hash: &str,
        years: YearOverrides,
    ) -> Result<Self> {
        let plan = Plan::compile(source, years)?;

        let source_dir = harvester.source_dir(source.name());
        let mut store = open_store(&source_dir, source.name())?;
        let run_id = store.create_run(source.name(), config_hash)?;
        let sink = RecordSink::open(&source_dir, source.name(), store, run_id)?;

        tracing::info!(
            source = source.name(),
            kind = source.kind(),
            run_id,
            "Prepared run in {}",
            source_dir.display()
        );

        Ok(Self {
            source: source.name().to_string(),
            kind: source.kind(),
            plan: Arc::new(plan),
            fetcher,
            sink,
            assets: AssetSink::new(source_dir, harvester.overwrite_assets),
            counters: RunCounters::default(),
            pages_fetched: 0,
            started: Instant::now(),
            status: RunStatus::Running,
        })
    }

    pub fn run_id(&self) -> i64 {
        self.sink.run_id()
    }

    pub fn source_dir(&self) -> &Path {
        self.assets.dir()
    }

    /// The source's keyed store
    pub fn store(&self) -> &SqliteRecordStore {
        self.sink.store()
    }

    /// Runs the harvest to completion
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - Every reachable document was processed
    /// * `Err(HarvestError)` - Persisting a result failed; the run is marked failed
    pub async fn run(&mut self) -> Result<RunSummary> {
        tracing::info!(source = %self.source, "Starting {} run {}", self.kind, self.run_id());

        let plan = Arc::clone(&self.plan);
        let outcome = match plan.as_ref() {
            Plan::Crawl {
                seeds,
                allowed_domains,
                rules,
                fields,
                dump_html,
            } => {
                self.crawl(seeds, allowed_domains, rules, fields, *dump_html)
                    .await
            }
            Plan::Feed {
                urls,
                allowed_domains,
                rules,
            } => self.harvest_feeds(urls, allowed_domains, rules).await,
            Plan::Archive {
                index_pages,
                allowed_domains,
                asset_pattern,
            } => {
                self.harvest_archive(index_pages, allowed_domains, asset_pattern)
                    .await
            }
        };

        match outcome {
            Ok(()) => self.finish(RunStatus::Completed),
            Err(e) => {
                tracing::error!(source = %self.source, "Run {} failed: {}", self.run_id(), e);
                if let Err(finish_err) = self.finish(RunStatus::Failed) {
                    tracing::error!("Could not record run failure: {}", finish_err);
                }
                Err(e)
            }
        }
    }

    /// Records the run as interrupted
    ///
    /// Called after the future returned by [`HarvestRun::run`] was dropped
    /// part-way. Everything persisted so far stays valid.
    pub fn mark_interrupted(&mut self) -> Result<RunSummary> {
        tracing::warn!(source = %self.source, "Run {} interrupted", self.run_id());
        self.finish(RunStatus::Interrupted)
    }

    fn finish(&mut self, status: RunStatus) -> Result<RunSummary> {
        let run_id = self.run_id();
        self.sink
            .store_mut()
            .finish_run(run_id, status, &self.counters)?;
        self.status = status;

        let summary = self.summary();
        tracing::info!(
            source = %self.source,
            status = status.to_db_string(),
            records = summary.counters.records_extracted,
            assets = summary.counters.assets_saved,
            failures = summary.counters.fetch_failures,
            "Run {} finished: {} documents fetched in {:?}",
            run_id,
            summary.pages_fetched,
            summary.elapsed
        );
        Ok(summary)
    }

    /// Current totals of the run
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            source: self.source.clone(),
            kind: self.kind,
            run_id: self.run_id(),
            status: self.status,
            counters: self.counters,
            pages_fetched: self.pages_fetched,
            elapsed: self.started.elapsed(),
        }
    }

    /// Fetches one document, logging and counting failures
    async fn fetch(&mut self, url: &str) -> Option<FetchedDocument> {
        match self.fetcher.fetch(url).await {
            Ok(doc) => {
                self.pages_fetched += 1;
                if self.pages_fetched % 10 == 0 {
                    tracing::info!(
                        source = %self.source,
                        "Progress: {} documents fetched, {} records, {} assets",
                        self.pages_fetched,
                        self.counters.records_extracted,
                        self.counters.assets_saved
                    );
                }
                Some(doc)
            }
            Err(e) => {
                self.counters.fetch_failures += 1;
                tracing::warn!(source = %self.source, "Skipping {}: {}", url, e);
                None
            }
        }
    }

    fn persist(&mut self, record: &Record) -> Result<()> {
        self.sink.persist(record)?;
        self.counters.records_extracted += 1;
        tracing::debug!(source = %self.source, "Persisted {}", record.url());
        Ok(())
    }

    // ===== Crawl =====

    async fn crawl(
        &mut self,
        seeds: &[Url],
        allowed_domains: &[String],
        rules: &[TraversalRule],
        fields: &HtmlRuleSet,
        dump_html: bool,
    ) -> Result<()> {
        let mut frontier = Frontier::new();
        for seed in seeds {
            frontier.schedule(seed.clone(), None);
        }

        while let Some(page) = frontier.pop() {
            if frontier.is_visited(&page.url) {
                tracing::debug!("{} was already reached through a redirect", page.url);
                continue;
            }

            let Some(doc) = self.fetch(page.url.as_str()).await else {
                continue;
            };

            let page_url = Url::parse(&doc.final_url).unwrap_or_else(|_| page.url.clone());
            if !frontier.record_visit(&page.url, &page_url) {
                tracing::debug!("{} redirected to already visited {}", page.url, page_url);
                continue;
            }
            if !doc.is_html() {
                tracing::warn!(
                    "Skipping {}: expected HTML, got {}",
                    page.url,
                    doc.content_type.as_deref().unwrap_or("")
                );
                continue;
            }

            // Seeds only feed link discovery
            let (extract, follow) = match page.rule.and_then(|i| rules.get(i)) {
                Some(rule) => (rule.extract, rule.follow),
                None => (false, true),
            };

            let analysis = analyze_page(
                &doc.text(),
                &page_url,
                extract.then_some(fields),
                follow.then_some((allowed_domains, rules)),
            );

            if let Some(record) = analysis.record {
                self.persist(&record)?;
                if dump_html {
                    let name = format!("{}.html", flatten_path(&page_url));
                    self.assets.store_named(&name, &doc.body)?;
                }
            }

            let mut queued = 0;
            for (link, rule) in analysis.links {
                if frontier.schedule(link, Some(rule)) {
                    queued += 1;
                }
            }
            tracing::debug!(
                "{}: {} new links, {} pages queued",
                page_url,
                queued,
                frontier.len()
            );
        }

        Ok(())
    }

    // ===== Feed =====

    async fn harvest_feeds(
        &mut self,
        urls: &[String],
        allowed_domains: &[String],
        rules: &FeedRuleSet,
    ) -> Result<()> {
        for url in urls {
            let Some(doc) = self.fetch(url).await else {
                continue;
            };

            let xml = doc.text();
            let mut entries = 0;
            for record in rules.records(&xml) {
                match record {
                    Ok(record) if !entry_allowed(record.url(), allowed_domains) => {
                        tracing::warn!(source = %self.source, "Skipping offsite entry {}", record.url());
                    }
                    Ok(record) => {
                        self.persist(&record)?;
                        entries += 1;
                    }
                    Err(e) => {
                        tracing::warn!(source = %self.source, "Feed {} is malformed: {}", url, e);
                        break;
                    }
                }
            }
            tracing::debug!("{}: {} entries", url, entries);
        }

        Ok(())
    }

    // ===== Archive =====

    async fn harvest_archive(
        &mut self,
        index_pages: &[(i32, String)],
        allowed_domains: &[String],
        asset_pattern: &Regex,
    ) -> Result<()> {
        let mut requested: HashSet<String> = HashSet::new();

        for (year, index_url) in index_pages {
            let Some(doc) = self.fetch(index_url).await else {
                continue;
            };
            if !doc.is_html() {
                tracing::warn!("Skipping {}: index page is not HTML", index_url);
                continue;
            }

            let page_url = match Url::parse(&doc.final_url) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!("Skipping {}: bad final URL {}: {}", index_url, doc.final_url, e);
                    continue;
                }
            };
            let assets = asset_links(&doc.text(), &page_url, allowed_domains, asset_pattern);
            tracing::info!(source = %self.source, "{}: {} assets linked", year, assets.len());

            for asset_url in assets {
                let key = normalize_url(asset_url.as_str())
                    .map(String::from)
                    .unwrap_or_else(|_| asset_url.to_string());
                if !requested.insert(key) {
                    continue;
                }

                match self.assets.needs_fetch(&asset_url) {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::debug!("Already have {}", asset_url);
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("Skipping {}: {}", asset_url, e);
                        continue;
                    }
                }

                let Some(asset) = self.fetch(asset_url.as_str()).await else {
                    continue;
                };
                let path = self.assets.store(&asset_url, &asset.body)?;
                self.counters.assets_saved += 1;
                tracing::debug!("Saved {} to {}", asset_url, path.display());
            }
        }

        Ok(())
    }
}

/// Whether a feed entry's url points into the allowed domains
fn entry_allowed(url: &str, allowed_domains: &[String]) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|url| extract_domain(&url))
        .is_some_and(|host| is_domain_allowed(allowed_domains, &host))
}

/// What one crawled page yielded
struct PageAnalysis {
    record: Option<Record>,
    links: Vec<(Url, usize)>,
}

/// Parses a page once for both extraction and link discovery
///
/// Kept synchronous: the parsed document is not `Send` and must not live
/// across an await.
fn analyze_page(
    html: &str,
    page_url: &Url,
    fields: Option<&HtmlRuleSet>,
    follow: Option<(&[String], &[TraversalRule])>,
) -> PageAnalysis {
    let document = Html::parse_document(html);

    let record = fields.map(|fields| fields.extract(&document, page_url.as_str()));

    let links = match follow {
        Some((allowed_domains, rules)) => extract_links(&document, page_url)
            .into_iter()
            .filter_map(|link| match classify_link(&link, allowed_domains, rules) {
                LinkClassification::Matched(rule) => Some((link, rule)),
                LinkClassification::OffDomain | LinkClassification::Unmatched => None,
            })
            .collect(),
        None => Vec::new(),
    };

    PageAnalysis { record, links }
}

/// Links on an archive index page that point at wanted assets
///
/// The pattern is matched against the path of each resolved link.
fn asset_links(
    html: &str,
    page_url: &Url,
    allowed_domains: &[String],
    asset_pattern: &Regex,
) -> Vec<Url> {
    let document = Html::parse_document(html);

    extract_links(&document, page_url)
        .into_iter()
        .filter(|link| asset_pattern.is_match(link.path()))
        .filter(|link| {
            extract_domain(link)
                .map(|domain| is_domain_allowed(allowed_domains, &domain))
                .unwrap_or(false)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ArchiveSource, ChannelId, CrawlSource, FeedFieldConfig, FeedSource, HtmlFieldConfig,
        RuleConfig, TextMode,
    };
    use crate::crawler::fetcher::FetchError;
    use crate::storage::{log_path, read_records};
    use crate::HarvestError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serves canned documents and records every request
    #[derive(Default)]
    struct StaticFetcher {
        pages: HashMap<String, Vec<u8>>,
        redirects: HashMap<String, String>,
        requests: Mutex<Vec<String>>,
    }

    impl StaticFetcher {
        fn page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), body.as_bytes().to_vec());
            self
        }

        fn redirect(mut self, from: &str, to: &str) -> Self {
            self.redirects.insert(from.to_string(), to.to_string());
            self
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }

        fn count(&self, url: &str) -> usize {
            self.requests().iter().filter(|r| r.as_str() == url).count()
        }
    }

    #[async_trait]
    impl DocumentFetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> std::result::Result<FetchedDocument, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            let landed = self.redirects.get(url).map(String::as_str).unwrap_or(url);
            match self.pages.get(landed) {
                Some(body) => Ok(FetchedDocument {
                    final_url: landed.to_string(),
                    status: 200,
                    content_type: Some("text/html".to_string()),
                    body: body.clone(),
                }),
                None => Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }

    fn harvester(dir: &TempDir) -> HarvesterConfig {
        HarvesterConfig {
            data_dir: dir.path().to_path_buf(),
            request_delay: 0,
            max_concurrent_requests: 1,
            max_retries: 0,
            request_timeout: 5,
            obey_robots: false,
            overwrite_assets: false,
            max_crawl_delay: 30,
        }
    }

    fn article(title: &str, links: &[&str]) -> String {
        let anchors: String = links
            .iter()
            .map(|href| format!(r#"<a href="{}">link</a>"#, href))
            .collect();
        format!(
            r#"<html><body><h1 class="title">{}</h1>{}</body></html>"#,
            title, anchors
        )
    }

    fn crawl_source(follow: bool) -> SourceConfig {
        SourceConfig::Crawl(CrawlSource {
            name: "apkbr_ru".to_string(),
            allowed_domains: vec!["apkbr.ru".to_string()],
            start_urls: vec!["https://apkbr.ru/".to_string()],
            rules: vec![RuleConfig {
                allow: "/node".to_string(),
                follow,
                extract: true,
            }],
            fields: vec![
                HtmlFieldConfig {
                    name: "title".to_string(),
                    selector: "h1.title".to_string(),
                    mode: TextMode::Text,
                    attr: None,
                },
                HtmlFieldConfig {
                    name: "author".to_string(),
                    selector: ".author".to_string(),
                    mode: TextMode::Text,
                    attr: None,
                },
            ],
            dump_html: false,
        })
    }

    fn archive_source(start: i32, end: i32) -> SourceConfig {
        SourceConfig::Archive(ArchiveSource {
            name: "oshhamaho".to_string(),
            allowed_domains: vec!["smikbr.ru".to_string()],
            url_template: "https://smikbr.ru/oshhamaho{year}".to_string(),
            asset_pattern: r"^/arhiv/\d{4}/pressa/oshamaho/.*\.pdf$".to_string(),
            start_year: Some(start),
            end_year: Some(end),
        })
    }

    fn feed_source() -> SourceConfig {
        let field = |name: &str, path: &str| FeedFieldConfig {
            name: name.to_string(),
            path: path.to_string(),
        };
        SourceConfig::Feed(FeedSource {
            name: "apkbr_ru_rss".to_string(),
            allowed_domains: vec!["apkbr.ru".to_string()],
            feed_template: "https://apkbr.ru/taxonomy/term/{channel}/feed".to_string(),
            channels: vec![ChannelId::Number(1), ChannelId::Number(2)],
            item_tag: "item".to_string(),
            fields: vec![field("url", "link"), field("title", "title")],
            namespaces: Default::default(),
        })
    }

    fn feed(items: &[(&str, &str)]) -> String {
        let body: String = items
            .iter()
            .map(|(link, title)| {
                format!("<item><title>{}</title><link>{}</link></item>", title, link)
            })
            .collect();
        format!(r#"<?xml version="1.0"?><rss><channel>{}</channel></rss>"#, body)
    }

    fn start(
        source: &SourceConfig,
        dir: &TempDir,
        fetcher: Arc<StaticFetcher>,
        years: YearOverrides,
    ) -> HarvestRun {
        HarvestRun::new(source, &harvester(dir), fetcher, "hash", years).unwrap()
    }

    #[tokio::test]
    async fn test_crawl_visits_cyclic_pages_once() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(
            StaticFetcher::default()
                .page("https://apkbr.ru/", &article("Главная", &["/node/a"]))
                .page("https://apkbr.ru/node/a", &article("A", &["/node/b"]))
                .page("https://apkbr.ru/node/b", &article("B", &["/node/a", "/node/a#c"])),
        );

        let mut run = start(&crawl_source(true), &dir, fetcher.clone(), YearOverrides::default());
        let summary = run.run().await.unwrap();

        assert_eq!(fetcher.count("https://apkbr.ru/node/a"), 1);
        assert_eq!(fetcher.count("https://apkbr.ru/node/b"), 1);
        assert_eq!(fetcher.requests().len(), 3);
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.counters.records_extracted, 2);
        assert_eq!(run.store().count().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_seed_page_is_not_extracted() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(
            StaticFetcher::default()
                .page("https://apkbr.ru/", &article("Главная", &["/node/1"]))
                .page("https://apkbr.ru/node/1", &article("Статья", &[])),
        );

        let mut run = start(&crawl_source(true), &dir, fetcher, YearOverrides::default());
        run.run().await.unwrap();

        assert!(run.store().get("https://apkbr.ru/").unwrap().is_none());
        let record = run.store().get("https://apkbr.ru/node/1").unwrap().unwrap();
        assert_eq!(record.get("title"), Some("Статья"));
        assert!(record.has_field("author"));
        assert_eq!(record.get("author"), None);
    }

    #[tokio::test]
    async fn test_crawl_ignores_unmatched_and_offsite_links() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(StaticFetcher::default().page(
            "https://apkbr.ru/",
            &article(
                "Главная",
                &["/other/42", "https://smikbr.ru/node/1", "/node/42"],
            ),
        ));

        let mut run = start(&crawl_source(true), &dir, fetcher.clone(), YearOverrides::default());
        run.run().await.unwrap();

        assert_eq!(
            fetcher.requests(),
            vec!["https://apkbr.ru/", "https://apkbr.ru/node/42"]
        );
    }

    #[tokio::test]
    async fn test_rule_without_follow_stops_discovery() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(
            StaticFetcher::default()
                .page("https://apkbr.ru/", &article("Главная", &["/node/1"]))
                .page("https://apkbr.ru/node/1", &article("1", &["/node/2"]))
                .page("https://apkbr.ru/node/2", &article("2", &[])),
        );

        let mut run = start(&crawl_source(false), &dir, fetcher.clone(), YearOverrides::default());
        run.run().await.unwrap();

        assert_eq!(fetcher.count("https://apkbr.ru/node/2"), 0);
        assert_eq!(run.store().count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_does_not_abort() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(
            StaticFetcher::default()
                .page("https://apkbr.ru/", &article("Главная", &["/node/gone", "/node/2"]))
                .page("https://apkbr.ru/node/2", &article("2", &[])),
        );

        let mut run = start(&crawl_source(true), &dir, fetcher, YearOverrides::default());
        let summary = run.run().await.unwrap();

        assert_eq!(summary.counters.fetch_failures, 1);
        assert_eq!(summary.counters.records_extracted, 1);
        assert_eq!(summary.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_dump_html_writes_flattened_file() {
        let dir = TempDir::new().unwrap();
        let mut source = crawl_source(true);
        if let SourceConfig::Crawl(crawl) = &mut source {
            crawl.dump_html = true;
        }
        let fetcher = Arc::new(
            StaticFetcher::default()
                .page("https://apkbr.ru/", &article("Главная", &["/node/42"]))
                .page("https://apkbr.ru/node/42", &article("42", &[])),
        );

        let mut run = start(&source, &dir, fetcher, YearOverrides::default());
        run.run().await.unwrap();

        let dump = run.source_dir().join("__node__42.html");
        assert!(std::fs::read_to_string(dump).unwrap().contains("42"));
    }

    #[tokio::test]
    async fn test_archive_requests_years_in_order() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(StaticFetcher::default());

        let mut run = start(&archive_source(2007, 2009), &dir, fetcher.clone(), YearOverrides::default());
        let summary = run.run().await.unwrap();

        assert_eq!(
            fetcher.requests(),
            vec![
                "https://smikbr.ru/oshhamaho2007",
                "https://smikbr.ru/oshhamaho2008",
                "https://smikbr.ru/oshhamaho2009",
            ]
        );
        assert_eq!(summary.counters.fetch_failures, 3);
    }

    #[tokio::test]
    async fn test_archive_saves_matching_assets_only() {
        let dir = TempDir::new().unwrap();
        let index = r#"<html><body>
            <a href="/arhiv/2020/pressa/oshamaho/01.2020.pdf">Январь</a>
            <a href="/arhiv/2020/pressa/oshamaho/01.2020.pdf">Январь ещё раз</a>
            <a href="/arhiv/2020/other/02.2020.pdf">Другое</a>
            <a href="https://elsewhere.ru/arhiv/2020/pressa/oshamaho/03.2020.pdf">Чужое</a>
        </body></html>"#;
        let fetcher = Arc::new(
            StaticFetcher::default()
                .page("https://smikbr.ru/oshhamaho2020", index)
                .page(
                    "https://smikbr.ru/arhiv/2020/pressa/oshamaho/01.2020.pdf",
                    "%PDF-1.4",
                ),
        );

        let mut run = start(&archive_source(2020, 2020), &dir, fetcher.clone(), YearOverrides::default());
        let summary = run.run().await.unwrap();

        assert_eq!(summary.counters.assets_saved, 1);
        assert_eq!(fetcher.requests().len(), 2);
        let saved = run.source_dir().join("01.2020.pdf");
        assert_eq!(std::fs::read(saved).unwrap(), b"%PDF-1.4");
        assert!(!run.source_dir().join("02.2020.pdf").exists());
    }

    #[tokio::test]
    async fn test_archive_skips_existing_assets() {
        let dir = TempDir::new().unwrap();
        let index = r#"<a href="/arhiv/2020/pressa/oshamaho/01.2020.pdf">pdf</a>"#;
        let fetcher = Arc::new(
            StaticFetcher::default()
                .page("https://smikbr.ru/oshhamaho2020", index)
                .page("https://smikbr.ru/arhiv/2020/pressa/oshamaho/01.2020.pdf", "pdf"),
        );

        let mut first = start(&archive_source(2020, 2020), &dir, fetcher.clone(), YearOverrides::default());
        first.run().await.unwrap();
        drop(first);

        let mut second = start(&archive_source(2020, 2020), &dir, fetcher.clone(), YearOverrides::default());
        let summary = second.run().await.unwrap();

        assert_eq!(summary.counters.assets_saved, 0);
        assert_eq!(
            fetcher.count("https://smikbr.ru/arhiv/2020/pressa/oshamaho/01.2020.pdf"),
            1
        );
    }

    #[tokio::test]
    async fn test_year_overrides_replace_config() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(StaticFetcher::default());
        let years = YearOverrides {
            start: Some(2022),
            end: Some(2023),
        };

        let mut run = start(&archive_source(2007, 2023), &dir, fetcher.clone(), years);
        run.run().await.unwrap();

        assert_eq!(fetcher.requests().len(), 2);
        assert_eq!(fetcher.requests()[0], "https://smikbr.ru/oshhamaho2022");
    }

    #[test]
    fn test_inverted_year_range_fails_before_fetching() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(StaticFetcher::default());

        let result = HarvestRun::new(
            &archive_source(2023, 2007),
            &harvester(&dir),
            fetcher.clone(),
            "hash",
            YearOverrides::default(),
        );

        assert!(matches!(
            result,
            Err(crate::HarvestError::Config(ConfigError::InvalidYearRange {
                start: 2023,
                end: 2007
            }))
        ));
        assert!(fetcher.requests().is_empty());
        assert!(!dir.path().join("oshhamaho").exists());
    }

    #[tokio::test]
    async fn test_feed_duplicate_entries() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(
            StaticFetcher::default()
                .page(
                    "https://apkbr.ru/taxonomy/term/1/feed",
                    &feed(&[("https://apkbr.ru/node/7", "Семь")]),
                )
                .page(
                    "https://apkbr.ru/taxonomy/term/2/feed",
                    &feed(&[("https://apkbr.ru/node/7", "Семь")]),
                ),
        );

        let mut run = start(&feed_source(), &dir, fetcher, YearOverrides::default());
        let summary = run.run().await.unwrap();

        assert_eq!(summary.counters.records_extracted, 2);
        assert_eq!(run.store().count().unwrap(), 1);
        let logged = read_records(&log_path(run.source_dir(), "apkbr_ru_rss")).unwrap();
        assert_eq!(logged.len(), 2);
    }

    #[tokio::test]
    async fn test_feed_keeps_latest_version() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(
            StaticFetcher::default()
                .page(
                    "https://apkbr.ru/taxonomy/term/1/feed",
                    &feed(&[("https://apkbr.ru/node/7", "Старый")]),
                )
                .page(
                    "https://apkbr.ru/taxonomy/term/2/feed",
                    &feed(&[("https://apkbr.ru/node/7", "Новый")]),
                ),
        );

        let mut run = start(&feed_source(), &dir, fetcher, YearOverrides::default());
        run.run().await.unwrap();

        let record = run.store().get("https://apkbr.ru/node/7").unwrap().unwrap();
        assert_eq!(record.get("title"), Some("Новый"));
    }

    #[tokio::test]
    async fn test_redirect_target_is_not_fetched_again() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(
            StaticFetcher::default()
                .page("https://apkbr.ru/", &article("Главная", &["/node/old", "/node/new"]))
                .page("https://apkbr.ru/node/new", &article("Новая", &[]))
                .redirect("https://apkbr.ru/node/old", "https://apkbr.ru/node/new"),
        );

        let mut run = start(&crawl_source(true), &dir, fetcher.clone(), YearOverrides::default());
        let summary = run.run().await.unwrap();

        assert_eq!(
            fetcher.requests(),
            vec!["https://apkbr.ru/", "https://apkbr.ru/node/old"]
        );
        assert_eq!(summary.counters.records_extracted, 1);
        let logged = read_records(&log_path(run.source_dir(), "apkbr_ru")).unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].url(), "https://apkbr.ru/node/new");
    }

    #[tokio::test]
    async fn test_second_redirect_to_visited_page_is_not_extracted() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(
            StaticFetcher::default()
                .page("https://apkbr.ru/", &article("Главная", &["/node/new", "/node/old"]))
                .page("https://apkbr.ru/node/new", &article("Новая", &[]))
                .redirect("https://apkbr.ru/node/old", "https://apkbr.ru/node/new"),
        );

        let mut run = start(&crawl_source(true), &dir, fetcher.clone(), YearOverrides::default());
        let summary = run.run().await.unwrap();

        assert_eq!(fetcher.requests().len(), 3);
        assert_eq!(summary.counters.records_extracted, 1);
        assert_eq!(run.store().count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_fails_run() {
        let dir = TempDir::new().unwrap();
        let index = r#"<html><body>
            <a href="/arhiv/2020/pressa/oshamaho/01.2020.pdf">Январь</a>
            <a href="/arhiv/2020/pressa/oshamaho/02.2020.pdf">Февраль</a>
        </body></html>"#;
        let fetcher = Arc::new(
            StaticFetcher::default()
                .page("https://smikbr.ru/oshhamaho2020", index)
                .page("https://smikbr.ru/oshhamaho2021", index)
                .page("https://smikbr.ru/arhiv/2020/pressa/oshamaho/01.2020.pdf", "%PDF-1.4")
                .page("https://smikbr.ru/arhiv/2020/pressa/oshamaho/02.2020.pdf", "%PDF-1.4"),
        );

        let mut run = start(&archive_source(2020, 2021), &dir, fetcher.clone(), YearOverrides::default());
        // The partial file cannot be created over a directory
        std::fs::create_dir(run.source_dir().join("01.2020.pdf.part")).unwrap();

        let result = run.run().await;

        assert!(matches!(result, Err(HarvestError::Storage(_))));
        assert_eq!(
            fetcher.requests(),
            vec![
                "https://smikbr.ru/oshhamaho2020",
                "https://smikbr.ru/arhiv/2020/pressa/oshamaho/01.2020.pdf",
            ]
        );
        assert_eq!(run.summary().status, RunStatus::Failed);
        let stored = run.store().get_run(run.run_id()).unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert!(stored.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_feed_skips_offsite_entries() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(StaticFetcher::default().page(
            "https://apkbr.ru/taxonomy/term/1/feed",
            &feed(&[
                ("https://apkbr.ru/node/1", "Своя"),
                ("https://elsewhere.ru/node/2", "Чужая"),
            ]),
        ));

        let mut run = start(&feed_source(), &dir, fetcher, YearOverrides::default());
        let summary = run.run().await.unwrap();

        assert_eq!(summary.counters.records_extracted, 1);
        assert!(run.store().get("https://elsewhere.ru/node/2").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_interrupted() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(StaticFetcher::default());

        let mut run = start(&feed_source(), &dir, fetcher, YearOverrides::default());
        let summary = run.mark_interrupted().unwrap();

        assert_eq!(summary.status, RunStatus::Interrupted);
        let stored = run.store().get_run(run.run_id()).unwrap();
        assert_eq!(stored.status, RunStatus::Interrupted);
    }
}
