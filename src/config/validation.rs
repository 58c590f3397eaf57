use crate::config::types::{
    ArchiveSource, Config, CrawlSource, FeedSource, HarvesterConfig, SourceConfig,
    UserAgentConfig, YearRange,
};
use crate::ConfigError;
use regex::Regex;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_harvester_config(&config.harvester)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_sources(&config.sources)?;
    Ok(())
}

/// Validates harvester configuration
fn validate_harvester_config(config: &HarvesterConfig) -> Result<(), ConfigError> {
    if config.data_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "data_dir cannot be empty".to_string(),
        ));
    }

    if config.max_concurrent_requests < 1 || config.max_concurrent_requests > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_requests must be between 1 and 100, got {}",
            config.max_concurrent_requests
        )));
    }

    if config.request_timeout < 1 {
        return Err(ConfigError::Validation(format!(
            "request_timeout must be >= 1s, got {}s",
            config.request_timeout
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters, hyphens and underscores, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates the source list and each source in it
fn validate_sources(sources: &[SourceConfig]) -> Result<(), ConfigError> {
    if sources.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[source]] must be configured".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for source in sources {
        validate_source_name(source.name())?;
        if !names.insert(source.name()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate source name '{}'",
                source.name()
            )));
        }

        for domain in source.allowed_domains() {
            validate_domain_pattern(domain)?;
        }

        match source {
            SourceConfig::Crawl(crawl) => validate_crawl_source(crawl)?,
            SourceConfig::Feed(feed) => validate_feed_source(feed)?,
            SourceConfig::Archive(archive) => validate_archive_source(archive)?,
        }
    }

    Ok(())
}

/// Source names double as directory and file names
fn validate_source_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "Source name '{}' must be non-empty and contain only ASCII letters, digits, '-' or '_'",
            name
        )));
    }
    Ok(())
}

fn validate_crawl_source(source: &CrawlSource) -> Result<(), ConfigError> {
    if source.start_urls.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Crawl source '{}' must have at least one start URL",
            source.name
        )));
    }

    for seed in &source.start_urls {
        validate_http_url(seed)?;
    }

    if source.rules.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Crawl source '{}' must have at least one rule",
            source.name
        )));
    }

    for rule in &source.rules {
        validate_regex(&rule.allow)?;
    }

    for field in &source.fields {
        if field.name.is_empty() || field.name == "url" {
            return Err(ConfigError::Validation(format!(
                "Crawl source '{}' has an invalid field name '{}'",
                source.name, field.name
            )));
        }
        Selector::parse(&field.selector).map_err(|e| {
            ConfigError::InvalidSelector(format!("'{}': {:?}", field.selector, e))
        })?;
    }

    Ok(())
}

fn validate_feed_source(source: &FeedSource) -> Result<(), ConfigError> {
    if !source.feed_template.contains("{channel}") {
        return Err(ConfigError::Validation(format!(
            "Feed source '{}' template must contain {{channel}}",
            source.name
        )));
    }

    if source.channels.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Feed source '{}' must list at least one channel",
            source.name
        )));
    }

    for url in source.feed_urls() {
        validate_http_url(&url)?;
    }

    if source.item_tag.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Feed source '{}' item_tag cannot be empty",
            source.name
        )));
    }

    if !source.fields.iter().any(|f| f.name == "url") {
        return Err(ConfigError::Validation(format!(
            "Feed source '{}' must map a field named 'url'",
            source.name
        )));
    }

    for (prefix, uri) in &source.namespaces {
        if prefix.is_empty() || prefix.contains(':') || uri.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Feed source '{}' has an invalid namespace binding '{}' = '{}'",
                source.name, prefix, uri
            )));
        }
    }

    Ok(())
}

fn validate_archive_source(source: &ArchiveSource) -> Result<(), ConfigError> {
    if !source.url_template.contains("{year}") {
        return Err(ConfigError::Validation(format!(
            "Archive source '{}' template must contain {{year}}",
            source.name
        )));
    }

    validate_http_url(&source.year_url(2000))?;
    validate_regex(&source.asset_pattern)?;

    if let (Some(start), Some(end)) = (source.start_year, source.end_year) {
        YearRange::new(start, end)?;
    }

    Ok(())
}

fn validate_http_url(candidate: &str) -> Result<(), ConfigError> {
    let url = Url::parse(candidate)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid URL '{}': {}", candidate, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "URL '{}' must use HTTP or HTTPS",
            candidate
        )));
    }

    Ok(())
}

fn validate_regex(pattern: &str) -> Result<(), ConfigError> {
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", pattern, e)))
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    if let Some(domain) = pattern.strip_prefix("*.") {
        validate_domain_string(domain)?;
    } else {
        validate_domain_string(pattern)?;
    }

    Ok(())
}

/// Checks a host name label by label
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must have at least two labels, e.g. 'apkbr.ru'",
            domain
        )));
    }

    for label in labels {
        if label.is_empty() || label.starts_with('-') || label.ends_with('-') {
            return Err(ConfigError::InvalidPattern(format!(
                "Domain '{}' has an empty or hyphen-edged label",
                domain
            )));
        }
        if !label.chars().all(|c| c.is_alphanumeric() || c == '-') {
            return Err(ConfigError::InvalidPattern(format!(
                "Domain '{}' contains invalid characters",
                domain
            )));
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
