use crate::ConfigError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;

/// Main configuration structure for the harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub harvester: HarvesterConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Looks up a source by name
    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name() == name)
    }
}

/// Harvester behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HarvesterConfig {
    /// Root directory; each source writes into `<data-dir>/<source name>/`
    #[serde(rename = "data-dir")]
    pub data_dir: PathBuf,

    /// Minimum time between two requests (milliseconds)
    #[serde(rename = "request-delay", default = "default_request_delay")]
    pub request_delay: u64,

    /// Maximum number of requests in flight
    #[serde(
        rename = "max-concurrent-requests",
        default = "default_max_concurrent_requests"
    )]
    pub max_concurrent_requests: u32,

    /// Retries for timeouts and transient HTTP statuses
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Whether robots.txt is consulted before each request
    #[serde(rename = "obey-robots", default = "default_true")]
    pub obey_robots: bool,

    /// Re-download assets that already exist on disk
    #[serde(rename = "overwrite-assets", default)]
    pub overwrite_assets: bool,

    /// Upper bound on a robots.txt `Crawl-delay` (seconds)
    #[serde(rename = "max-crawl-delay", default = "default_max_crawl_delay")]
    pub max_crawl_delay: u64,
}

impl HarvesterConfig {
    /// Output directory for one source
    pub fn source_dir(&self, source: &str) -> PathBuf {
        self.data_dir.join(source)
    }
}

fn default_request_delay() -> u64 {
    500
}

fn default_max_concurrent_requests() -> u32 {
    4
}

fn default_max_retries() -> u32 {
    2
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_crawl_delay() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the header value: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// One harvest source, tagged by its harvest strategy
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind")]
pub enum SourceConfig {
    /// Rule-driven recursive link traversal
    #[serde(rename = "crawl")]
    Crawl(CrawlSource),

    /// Syndication feed iteration
    #[serde(rename = "feed")]
    Feed(FeedSource),

    /// Year-ranged archive pages scanned for binary assets
    #[serde(rename = "archive")]
    Archive(ArchiveSource),
}

impl SourceConfig {
    pub fn name(&self) -> &str {
        match self {
            Self::Crawl(s) => &s.name,
            Self::Feed(s) => &s.name,
            Self::Archive(s) => &s.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Crawl(_) => "crawl",
            Self::Feed(_) => "feed",
            Self::Archive(_) => "archive",
        }
    }

    pub fn allowed_domains(&self) -> &[String] {
        match self {
            Self::Crawl(s) => &s.allowed_domains,
            Self::Feed(s) => &s.allowed_domains,
            Self::Archive(s) => &s.allowed_domains,
        }
    }
}

/// Recursive crawl source
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlSource {
    pub name: String,

    /// Hosts links may point at (a bare domain also admits its subdomains)
    #[serde(rename = "allowed-domains", default)]
    pub allowed_domains: Vec<String>,

    /// Seed URLs; fetched for link discovery only
    #[serde(rename = "start-urls")]
    pub start_urls: Vec<String>,

    /// Traversal rules, first match wins
    #[serde(rename = "rule", default)]
    pub rules: Vec<RuleConfig>,

    /// Record fields extracted from matching pages
    #[serde(rename = "field", default)]
    pub fields: Vec<HtmlFieldConfig>,

    /// Also keep each extracted page's raw HTML next to the records
    #[serde(rename = "dump-html", default)]
    pub dump_html: bool,
}

/// Link traversal rule
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    /// Regular expression searched for in the absolute link URL
    pub allow: String,

    /// Discover links on pages reached through this rule
    #[serde(default = "default_true")]
    pub follow: bool,

    /// Route pages reached through this rule to extraction
    #[serde(default = "default_true")]
    pub extract: bool,
}

/// HTML field extraction rule
#[derive(Debug, Clone, Deserialize)]
pub struct HtmlFieldConfig {
    pub name: String,

    /// CSS selector
    pub selector: String,

    /// How matched elements are turned into text
    #[serde(default)]
    pub mode: TextMode,

    /// Read this attribute instead of text
    #[serde(default)]
    pub attr: Option<String>,
}

/// Text extraction mode for HTML fields
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum TextMode {
    /// Direct text children of the first match
    #[default]
    #[serde(rename = "text")]
    Text,

    /// All descendant text of all matches, in document order
    #[serde(rename = "all-text")]
    AllText,
}

/// Syndication feed source
#[derive(Debug, Clone, Deserialize)]
pub struct FeedSource {
    pub name: String,

    #[serde(rename = "allowed-domains", default)]
    pub allowed_domains: Vec<String>,

    /// Feed URL template containing `{channel}`
    #[serde(rename = "feed-template")]
    pub feed_template: String,

    /// Channel ids substituted into the template
    pub channels: Vec<ChannelId>,

    /// Element name of one feed entry
    #[serde(rename = "item-tag", default = "default_item_tag")]
    pub item_tag: String,

    /// Record fields read from each entry; one must be named `url`
    #[serde(rename = "field", default)]
    pub fields: Vec<FeedFieldConfig>,

    /// Prefix to namespace URI bindings used by field paths
    #[serde(default)]
    pub namespaces: BTreeMap<String, String>,
}

impl FeedSource {
    /// One feed URL per channel, in configured order
    pub fn feed_urls(&self) -> Vec<String> {
        self.channels
            .iter()
            .map(|channel| self.feed_template.replace("{channel}", &channel.to_string()))
            .collect()
    }
}

/// Feed channel identifier, numeric (`3`) or named (`"news"`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ChannelId {
    Number(i64),
    Name(String),
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Name(s) => f.write_str(s),
        }
    }
}

fn default_item_tag() -> String {
    "item".to_string()
}

/// Feed field extraction rule
#[derive(Debug, Clone, Deserialize)]
pub struct FeedFieldConfig {
    pub name: String,

    /// Child element name, e.g. `title` or `dc:creator`; a prefix bound in
    /// the source's `namespaces` is matched by namespace URI
    pub path: String,
}

/// Year-ranged PDF archive source
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveSource {
    pub name: String,

    #[serde(rename = "allowed-domains", default)]
    pub allowed_domains: Vec<String>,

    /// Index page template containing `{year}`
    #[serde(rename = "url-template")]
    pub url_template: String,

    /// Regular expression matched against the path of each linked URL
    #[serde(rename = "asset-pattern")]
    pub asset_pattern: String,

    #[serde(rename = "start-year")]
    pub start_year: Option<i32>,

    #[serde(rename = "end-year")]
    pub end_year: Option<i32>,
}

impl ArchiveSource {
    /// Index page URL for one year
    pub fn year_url(&self, year: i32) -> String {
        self.url_template.replace("{year}", &year.to_string())
    }

    /// Resolves the year range, letting run parameters override the file
    pub fn year_range(
        &self,
        start_override: Option<i32>,
        end_override: Option<i32>,
    ) -> Result<YearRange, ConfigError> {
        let start = start_override.or(self.start_year).ok_or_else(|| {
            ConfigError::Validation(format!("Source '{}' needs a start year", self.name))
        })?;
        let end = end_override.or(self.end_year).ok_or_else(|| {
            ConfigError::Validation(format!("Source '{}' needs an end year", self.name))
        })?;
        YearRange::new(start, end)
    }
}

/// Inclusive range of archive years
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn new(start: i32, end: i32) -> Result<Self, ConfigError> {
        if start > end {
            return Err(ConfigError::InvalidYearRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Years in ascending order
    pub fn years(&self) -> RangeInclusive<i32> {
        self.start..=self.end
    }
}
