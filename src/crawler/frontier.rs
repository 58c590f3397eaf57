//! Crawl frontier
//!
//! A FIFO queue of pages still to visit, the set of every URL ever
//! scheduled in the run and the set of pages actually fetched, keyed by
//! the URL a request landed on after redirects. A URL enters the queue at
//! most once, which keeps cyclic link graphs finite, and a page reached
//! through a redirect is not fetched again under its own URL.

use crate::url::normalize_url;
use std::collections::{HashSet, VecDeque};
use url::Url;

/// A page waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedPage {
    /// The URL to fetch
    pub url: Url,

    /// Index of the traversal rule that admitted the page; `None` for seeds
    pub rule: Option<usize>,
}

/// Run-scoped crawl frontier
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<QueuedPage>,
    seen: HashSet<String>,
    visited: HashSet<String>,
}

fn page_key(url: &Url) -> String {
    match normalize_url(url.as_str()) {
        Ok(normalized) => normalized.to_string(),
        Err(_) => url.to_string(),
    }
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `url` unless it was already scheduled in this run
    ///
    /// URLs are compared in normalized form, so fragment or query-order
    /// variants of the same page are visited once.
    ///
    /// # Returns
    ///
    /// `true` if the URL was newly queued
    pub fn schedule(&mut self, url: Url, rule: Option<usize>) -> bool {
        if !self.seen.insert(page_key(&url)) {
            return false;
        }

        self.queue.push_back(QueuedPage { url, rule });
        true
    }

    /// Takes the oldest queued page
    pub fn pop(&mut self) -> Option<QueuedPage> {
        self.queue.pop_front()
    }

    /// Pages still waiting
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether a page with this URL was already fetched in this run
    pub fn is_visited(&self, url: &Url) -> bool {
        self.visited.contains(&page_key(url))
    }

    /// Records that a request for `requested` landed on `landed`
    ///
    /// Both URLs count as visited afterwards, and `landed` can no longer be
    /// scheduled.
    ///
    /// # Returns
    ///
    /// `false` if `landed` is a different page that was already visited,
    /// in which case the document must not be processed again
    pub fn record_visit(&mut self, requested: &Url, landed: &Url) -> bool {
        let requested = page_key(requested);
        let landed = page_key(landed);

        self.visited.insert(requested.clone());
        self.seen.insert(landed.clone());
        landed == requested || self.visited.insert(landed)
    }
}
