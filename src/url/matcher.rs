/// Checks if a host matches a scope pattern
///
/// `"example.com"` matches only that host. `"*.example.com"` matches the bare
/// domain and any subdomain at any depth. Comparison ignores ASCII case and
/// any `:port` suffix on the candidate.
///
/// # Examples
///
/// ```
/// use skein::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "Example.com"));
/// assert!(matches_wildcard("*.example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "api.v2.example.com:8080"));
/// assert!(!matches_wildcard("*.example.com", "notexample.com"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    let host = strip_port(candidate);
    if host.is_empty() || pattern.is_empty() {
        return false;
    }

    match pattern.strip_prefix("*.") {
        Some(base) => {
            if host.eq_ignore_ascii_case(base) {
                return true;
            }
            // Needs a label boundary before the base: "x.example.com", not "xexample.com"
            match host.len().checked_sub(base.len() + 1) {
                Some(dot) => {
                    host.as_bytes()[dot] == b'.'
                        && host
                            .get(dot + 1..)
                            .map_or(false, |tail| tail.eq_ignore_ascii_case(base))
                }
                None => false,
            }
        }
        None => host.eq_ignore_ascii_case(pattern),
    }
}

fn strip_port(candidate: &str) -> &str {
    match candidate.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => host,
        _ => candidate,
    }
}
