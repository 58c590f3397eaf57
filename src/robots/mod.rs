//! Robots.txt handling module
//!
//! This module fetches, parses and caches robots.txt files so the fetcher
//! can honor them before every request.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache};
pub use parser::RobotsRules;

use reqwest::Client;
use url::Url;

/// Origin key of a URL, e.g. `https://apkbr.ru`
pub fn origin_key(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Fetches robots.txt for the origin of `url`
///
/// A missing file (4xx) allows everything. Server errors and network
/// failures also fall back to allowing everything, with a warning.
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `url` - Any URL on the origin
pub async fn fetch_robots(client: &Client, url: &Url) -> RobotsRules {
    let robots_url = match url.join("/robots.txt") {
        Ok(u) => u,
        Err(_) => return RobotsRules::allow_all(),
    };

    tracing::debug!("Fetching {}", robots_url);

    let response = match client.get(robots_url.clone()).send().await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!("Could not fetch {}: {}", robots_url, e);
            return RobotsRules::allow_all();
        }
    };

    let status = response.status();
    if status.is_client_error() {
        tracing::debug!("No robots.txt at {} ({})", robots_url, status);
        return RobotsRules::allow_all();
    }
    if !status.is_success() {
        tracing::warn!("robots.txt at {} returned {}", robots_url, status);
        return RobotsRules::allow_all();
    }

    match response.text().await {
        Ok(body) => RobotsRules::from_content(&body),
        Err(e) => {
            tracing::warn!("Could not read {}: {}", robots_url, e);
            RobotsRules::allow_all()
        }
    }
}
