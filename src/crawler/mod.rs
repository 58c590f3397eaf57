//! Crawler module for harvest runs
//!
//! This module contains the core harvesting logic, including:
//! - HTTP fetching with pacing, robots.txt and retry logic
//! - HTML link extraction
//! - The per-run crawl frontier
//! - Overall run coordination for crawl, feed and archive sources

mod coordinator;
mod fetcher;
mod frontier;
mod parser;

pub use coordinator::{HarvestRun, RunSummary, YearOverrides};
pub use fetcher::{build_http_client, DocumentFetcher, FetchError, FetchedDocument, HttpFetcher};
pub use frontier::{Frontier, QueuedPage};
pub use parser::{extract_links, extract_links_from_str, resolve_link};
