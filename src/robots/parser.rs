//! Robots.txt rules
//!
//! Permission checks delegate to the robotstxt crate's matcher; the
//! `Crawl-delay` extension is read separately since the matcher ignores it.

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Robots.txt rules of one host
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    /// Raw robots.txt body; `None` allows everything
    content: Option<String>,
}

impl RobotsRules {
    /// Creates rules from a robots.txt body
    pub fn from_content(content: &str) -> Self {
        Self {
            content: Some(content.to_string()),
        }
    }

    /// Rules that allow every URL
    ///
    /// Used when robots.txt is missing or cannot be fetched.
    pub fn allow_all() -> Self {
        Self { content: None }
    }

    /// Checks if a URL may be fetched by the given user agent token
    ///
    /// # Arguments
    ///
    /// * `url` - The absolute URL to check
    /// * `agent` - The product token of the user agent, e.g. `ZbzeHarvest`
    pub fn is_allowed(&self, url: &str, agent: &str) -> bool {
        match self.content.as_deref() {
            None | Some("") => true,
            Some(body) => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(body, agent, url)
            }
        }
    }

    /// Crawl delay requested for `agent`, a group naming the agent winning
    /// over the `*` group
    pub fn crawl_delay(&self, agent: &str) -> Option<Duration> {
        let body = self.content.as_deref()?;
        let agent = agent.to_lowercase();

        let mut group_agents: Vec<String> = Vec::new();
        let mut in_agent_lines = false;
        let mut specific = None;
        let mut wildcard = None;

        for line in body.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            if key == "user-agent" {
                // Consecutive user-agent lines share one group
                if !in_agent_lines {
                    group_agents.clear();
                }
                group_agents.push(value.to_lowercase());
                in_agent_lines = true;
                continue;
            }
            in_agent_lines = false;

            if key != "crawl-delay" {
                continue;
            }
            let Ok(seconds) = value.parse::<f64>() else {
                continue;
            };
            if !seconds.is_finite() || seconds < 0.0 {
                continue;
            }

            let names_agent = group_agents
                .iter()
                .any(|ua| ua != "*" && !ua.is_empty() && agent.contains(ua.as_str()));
            if names_agent {
                specific = Some(seconds);
            } else if group_agents.iter().any(|ua| ua == "*") {
                wildcard = Some(seconds);
            }
        }

        specific.or(wildcard).map(Duration::from_secs_f64)
    }
}
