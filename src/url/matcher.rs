/// Checks if a host falls under an allowed-domain entry
///
/// Entries follow the usual allow-list convention for harvest sources:
/// 1. A bare domain: "example.com" matches "example.com" and every subdomain
/// 2. An explicit wildcard: "*.example.com" behaves the same way
///
/// A candidate only matches on whole labels, so "myexample.com" never
/// matches "example.com".
///
/// # Examples
///
/// ```
/// use zbze_harvest::url::matches_domain;
///
/// assert!(matches_domain("apkbr.ru", "apkbr.ru"));
/// assert!(matches_domain("apkbr.ru", "www.apkbr.ru"));
/// assert!(matches_domain("*.apkbr.ru", "news.apkbr.ru"));
/// assert!(!matches_domain("apkbr.ru", "notapkbr.ru"));
/// ```
pub fn matches_domain(pattern: &str, candidate: &str) -> bool {
    let base = pattern.strip_prefix("*.").unwrap_or(pattern);
    if base.is_empty() || candidate.is_empty() {
        return false;
    }
    candidate == base || candidate.ends_with(&format!(".{}", base))
}

/// Checks a host against a whole allow-list; an empty list admits every host
pub fn is_domain_allowed(allowed: &[String], candidate: &str) -> bool {
    allowed.is_empty() || allowed.iter().any(|p| matches_domain(p, candidate))
}
