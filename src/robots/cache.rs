//! Per-host robots.txt cache
//!
//! Entries expire after a day so long harvests pick up changes.

use crate::robots::RobotsRules;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Robots.txt rules with their fetch time
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub rules: RobotsRules,
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    pub fn new(rules: RobotsRules) -> Self {
        Self {
            rules,
            fetched_at: Utc::now(),
        }
    }

    /// Returns true once the entry is older than 24 hours
    pub fn is_stale(&self) -> bool {
        Utc::now() - self.fetched_at > Duration::hours(24)
    }
}

/// Robots.txt rules keyed by origin (`scheme://host:port`)
#[derive(Debug, Default)]
pub struct RobotsCache {
    entries: HashMap<String, CachedRobots>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh rules for an origin, if cached
    pub fn get(&self, origin: &str) -> Option<&RobotsRules> {
        self.entries
            .get(origin)
            .filter(|cached| !cached.is_stale())
            .map(|cached| &cached.rules)
    }

    pub fn insert(&mut self, origin: &str, rules: RobotsRules) {
        self.entries
            .insert(origin.to_string(), CachedRobots::new(rules));
    }
}
