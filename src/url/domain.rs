use crate::UrlError;
use url::Url;

/// Extracts the domain from a URL
///
/// This function retrieves the host portion of a URL and converts it to lowercase.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use zbze_harvest::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Derives an asset file name from the final path segment of a URL
///
/// The query string and fragment never take part in the name. Segments
/// that cannot name a file inside the output directory are rejected.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use zbze_harvest::url::file_name_from_url;
///
/// let url = Url::parse("https://smikbr.ru/arhiv/2020/pressa/oshamaho/01.2020.pdf").unwrap();
/// assert_eq!(file_name_from_url(&url).unwrap(), "01.2020.pdf");
/// ```
pub fn file_name_from_url(url: &Url) -> Result<String, UrlError> {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");

    if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
        return Err(UrlError::NoFileName(url.to_string()));
    }

    Ok(segment.to_string())
}

/// Flattens a URL path into a single file name, e.g. `/node/42` -> `__node__42`
pub fn flatten_path(url: &Url) -> String {
    url.path().split('/').collect::<Vec<_>>().join("__")
}
