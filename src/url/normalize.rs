//! URL normalization

use crate::UrlError;
use url::Url;

/// Normalizes a raw URL string into the canonical form used as the dedup key
///
/// # Normalization Steps
///
/// 1. Trim surrounding whitespace
/// 2. Parse the string, resolving it against `base` when one is given
/// 3. Reject anything that is not http(s) or has no host
/// 4. Lowercase scheme and host, strip default ports (80/443) and collapse
///    `.`/`..` path segments (done by the URL parser)
/// 5. Remove the fragment
/// 6. Remove trailing slashes from the path (the root `/` stays)
///
/// The query string is kept verbatim: two URLs that differ only in their
/// query are different resources.
///
/// # Arguments
///
/// * `raw` - The URL string as found in a document, a redirect or the seed list
/// * `base` - Optional base URL for resolving relative references
///
/// # Returns
///
/// * `Ok(Url)` - The normalized absolute URL
/// * `Err(UrlError)` - The input is malformed
///
/// # Examples
///
/// ```
/// use skein::url::normalize;
/// use url::Url;
///
/// let url = normalize("HTTP://Example.COM:80/a/./b/../c/#top", None).unwrap();
/// assert_eq!(url.as_str(), "http://example.com/a/c");
///
/// let base = Url::parse("http://example.com/dir/page").unwrap();
/// let url = normalize("../other?q=1", Some(&base)).unwrap();
/// assert_eq!(url.as_str(), "http://example.com/other?q=1");
/// ```
pub fn normalize(raw: &str, base: Option<&Url>) -> Result<Url, UrlError> {
    let raw = raw.trim();

    let parsed = match base {
        Some(base) => base.join(raw),
        None => Url::parse(raw),
    };
    let mut url = parsed.map_err(|e| UrlError::Parse(format!("'{}': {}", raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::MissingHost),
    }

    url.set_fragment(None);

    let path = normalize_path(url.path());
    if path != url.path() {
        url.set_path(&path);
    }

    Ok(url)
}

/// Strips trailing slashes, keeping the root path
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}
