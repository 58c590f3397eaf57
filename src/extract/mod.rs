//! Extraction module: turning fetched documents into records
//!
//! This module contains:
//! - The `Record` type persisted by the record sink
//! - `HtmlRuleSet`: CSS-selector field rules evaluated against one page
//! - `FeedRuleSet`: child-element field rules evaluated per feed item
//! - `FeedItems`: a lazy iterator over the entries of a feed document

mod feed;
mod html;
mod record;

pub use feed::{FeedError, FeedItems, FeedNode, FeedRuleSet};
pub use html::HtmlRuleSet;
pub use record::{clean_value, Record};
