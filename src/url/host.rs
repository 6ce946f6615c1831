use url::Url;

/// Extracts the host key used for per-host politeness
///
/// The key is the lowercase host, followed by `:port` when the URL uses a
/// non-default port. Two servers on the same machine but different ports are
/// separate hosts as far as rate limiting and robots rules go.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use skein::url::host_key;
///
/// let url = Url::parse("https://Example.com/path").unwrap();
/// assert_eq!(host_key(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/").unwrap();
/// assert_eq!(host_key(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Builds the robots.txt URL for the origin of `url`
pub fn robots_url(url: &Url) -> Option<Url> {
    url.host_str()?;
    url.join("/robots.txt").ok()
}
