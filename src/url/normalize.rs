use crate::UrlError;
use url::Url;

/// Normalizes a URL into the form used for the per-run visited check
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Accept only http and https
/// 3. Lowercase the host (the `url` crate already does this for special schemes)
/// 4. Normalize path: remove dot segments, empty path becomes /
/// 5. Remove fragment (everything after #)
/// 6. Sort query parameters, drop an empty query string
///
/// Trailing slashes and `www.` prefixes are kept: the harvested sites
/// treat them as distinct resources.
///
/// # Examples
///
/// ```
/// use zbze_harvest::url::normalize_url;
///
/// let url = normalize_url("https://APKBR.RU/node/42?b=2&a=1#comments").unwrap();
/// assert_eq!(url.as_str(), "https://apkbr.ru/node/42?a=1&b=2");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingDomain);
    }

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let params = sorted_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Removes dot segments from a URL path, keeping a trailing slash if present
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut normalized_segments: Vec<&str> = Vec::new();
    for segment in path.split('/').skip(1) {
        match segment {
            "." => continue,
            ".." => {
                normalized_segments.pop();
            }
            _ => normalized_segments.push(segment),
        }
    }

    format!("/{}", normalized_segments.join("/"))
}

/// Sorts query parameters by key, keeping the relative order of equal keys
fn sorted_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0));

    params
}
