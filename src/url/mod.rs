//! URL handling module
//!
//! This module provides URL normalization, domain extraction, allow-list
//! matching, and classification of discovered links against traversal rules.

mod domain;
mod matcher;
mod normalize;

use crate::config::RuleConfig;
use crate::ConfigError;
use regex::Regex;
use url::Url;

// Re-export main functions
pub use domain::{extract_domain, file_name_from_url, flatten_path};
pub use matcher::{is_domain_allowed, matches_domain};
pub use normalize::normalize_url;

/// A compiled traversal rule
#[derive(Debug, Clone)]
pub struct TraversalRule {
    /// Searched for anywhere in the absolute URL
    pub allow: Regex,
    /// Discover links on documents reached through this rule
    pub follow: bool,
    /// Route documents reached through this rule to extraction
    pub extract: bool,
}

impl TraversalRule {
    pub fn compile(config: &RuleConfig) -> Result<Self, ConfigError> {
        let allow = Regex::new(&config.allow)
            .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", config.allow, e)))?;
        Ok(Self {
            allow,
            follow: config.follow,
            extract: config.extract,
        })
    }
}

/// Link classification types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkClassification {
    /// Host allowed and the rule at this index matched
    Matched(usize),
    /// Host is outside the allowed domains
    OffDomain,
    /// Host allowed but no rule matched
    Unmatched,
}

/// Classifies a discovered link
///
/// The domain allow-list is checked first, then the rules in order; the
/// first matching rule wins.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use zbze_harvest::config::RuleConfig;
/// use zbze_harvest::url::{classify_link, LinkClassification, TraversalRule};
///
/// let rules = vec![TraversalRule::compile(&RuleConfig {
///     allow: "/node".to_string(),
///     follow: true,
///     extract: true,
/// })
/// .unwrap()];
/// let allowed = vec!["apkbr.ru".to_string()];
///
/// let node = Url::parse("https://apkbr.ru/node/42").unwrap();
/// assert_eq!(classify_link(&node, &allowed, &rules), LinkClassification::Matched(0));
///
/// let other = Url::parse("https://apkbr.ru/other/42").unwrap();
/// assert_eq!(classify_link(&other, &allowed, &rules), LinkClassification::Unmatched);
/// ```
pub fn classify_link(
    url: &Url,
    allowed_domains: &[String],
    rules: &[TraversalRule],
) -> LinkClassification {
    let allowed = extract_domain(url)
        .map(|domain| is_domain_allowed(allowed_domains, &domain))
        .unwrap_or(false);
    if !allowed {
        return LinkClassification::OffDomain;
    }

    rules
        .iter()
        .position(|rule| rule.allow.is_match(url.as_str()))
        .map(LinkClassification::Matched)
        .unwrap_or(LinkClassification::Unmatched)
}
