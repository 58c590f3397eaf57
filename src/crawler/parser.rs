//! Link extraction from HTML pages
//!
//! # Link Extraction Rules
//!
//! **Include:**
//! - `<a href="...">` and `<area href="...">`, in document order
//! - relative links, resolved against `<base href>` when present, else the page URL
//!
//! **Exclude:**
//! - `javascript:`, `mailto:`, `tel:` and `data:` links
//! - fragment-only links (same page anchors)
//! - anything that is not HTTP(S) after resolution

use scraper::{Html, Selector};
use url::Url;

/// Extracts all followable links from a parsed page
///
/// # Arguments
///
/// * `document` - The parsed page
/// * `page_url` - The URL the page was fetched from
///
/// # Returns
///
/// Absolute URLs in document order; duplicates are kept
pub fn extract_links(document: &Html, page_url: &Url) -> Vec<Url> {
    let base = document_base(document, page_url);
    let mut links = Vec::new();

    let Ok(selector) = Selector::parse("a[href], area[href]") else {
        return links;
    };

    for element in document.select(&selector) {
        if let Some(href) = element.value().attr("href") {
            if let Some(url) = resolve_link(href, &base) {
                links.push(url);
            }
        }
    }

    links
}

/// Convenience function for extracting links from raw HTML
pub fn extract_links_from_str(html: &str, page_url: &Url) -> Vec<Url> {
    extract_links(&Html::parse_document(html), page_url)
}

/// The URL relative links resolve against
fn document_base(document: &Html, page_url: &Url) -> Url {
    Selector::parse("base[href]")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .and_then(|base| base.value().attr("href"))
                .and_then(|href| page_url.join(href.trim()).ok())
        })
        .unwrap_or_else(|| page_url.clone())
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded.
pub fn resolve_link(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let absolute = base.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute),
        _ => None,
    }
}
