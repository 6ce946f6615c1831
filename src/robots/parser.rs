//! Robots.txt parser implementation
//!
//! Allow/disallow matching is delegated to the robotstxt crate. Crawl-delay is
//! not covered by that crate, so it is read here with the same group rules:
//! consecutive `User-agent` lines open a group, and the group's rules apply
//! until the next `User-agent` line that follows a rule.

use robotstxt::DefaultMatcher;
use url::Url;

/// Parsed robots.txt data
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content (empty string means allow all)
    content: String,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    ///
    /// Used when a host has no robots.txt or it could not be fetched.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
        }
    }

    /// Returns true if there are no rules at all
    pub fn is_unrestricted(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Checks if a URL is allowed for the given product token
    ///
    /// # Arguments
    ///
    /// * `url` - The absolute URL to check
    /// * `product_token` - The crawler's robots.txt product token
    pub fn is_allowed(&self, url: &Url, product_token: &str) -> bool {
        if self.is_unrestricted() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, product_token, url.as_str())
    }

    /// Gets the crawl delay in seconds for a product token
    ///
    /// A group naming the token wins over the `*` group.
    pub fn crawl_delay(&self, product_token: &str) -> Option<f64> {
        if self.is_unrestricted() {
            return None;
        }

        let token = product_token.to_lowercase();
        let mut group_agents: Vec<String> = Vec::new();
        let mut group_has_rules = false;
        let mut delay_for_agent: Option<f64> = None;
        let mut delay_for_wildcard: Option<f64> = None;

        for line in self.content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let (key, value) = match line.split_once(':') {
                Some((key, value)) => (key.trim().to_lowercase(), value.trim()),
                None => continue,
            };

            match key.as_str() {
                "user-agent" => {
                    if group_has_rules {
                        group_agents.clear();
                        group_has_rules = false;
                    }
                    group_agents.push(value.to_lowercase());
                }
                "crawl-delay" => {
                    group_has_rules = true;
                    let delay = match value.parse::<f64>() {
                        Ok(delay) if delay.is_finite() && delay >= 0.0 => delay,
                        _ => continue,
                    };
                    if group_agents.iter().any(|ua| *ua == token) {
                        delay_for_agent.get_or_insert(delay);
                    } else if group_agents.iter().any(|ua| ua == "*") {
                        delay_for_wildcard.get_or_insert(delay);
                    }
                }
                _ => group_has_rules = true,
            }
        }

        delay_for_agent.or(delay_for_wildcard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(path: &str) -> Url {
        Url::parse("http://host.test").unwrap().join(path).unwrap()
    }

    #[test]
    fn test_allow_all() {
        let robots = ParsedRobots::allow_all();
        assert!(robots.is_unrestricted());
        assert!(robots.is_allowed(&url("/admin"), "TestBot"));
    }

    #[test]
    fn test_parse_disallow_all() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /");
        assert!(!robots.is_allowed(&url("/"), "TestBot"));
        assert!(!robots.is_allowed(&url("/page"), "TestBot"));
    }

    #[test]
    fn test_parse_disallow_prefix() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /private");
        assert!(robots.is_allowed(&url("/"), "TestBot"));
        assert!(robots.is_allowed(&url("/public/page"), "TestBot"));
        assert!(!robots.is_allowed(&url("/private"), "TestBot"));
        assert!(!robots.is_allowed(&url("/private/page"), "TestBot"));
    }

    #[test]
    fn test_parse_allow_overrides_disallow() {
        let robots =
            ParsedRobots::from_content("User-agent: *\nDisallow: /private\nAllow: /private/public");
        assert!(!robots.is_allowed(&url("/private"), "TestBot"));
        assert!(robots.is_allowed(&url("/private/public"), "TestBot"));
    }

    #[test]
    fn test_parse_specific_user_agent() {
        let content = "User-agent: BadBot\nDisallow: /\n\nUser-agent: *\nAllow: /";
        let robots = ParsedRobots::from_content(content);
        assert!(robots.is_allowed(&url("/page"), "GoodBot"));
        assert!(!robots.is_allowed(&url("/page"), "BadBot"));
    }

    #[test]
    fn test_garbage_robots_txt_allows() {
        let robots = ParsedRobots::from_content("This is not valid robots.txt {{{");
        assert!(robots.is_allowed(&url("/any/path"), "TestBot"));
    }

    #[test]
    fn test_crawl_delay_wildcard() {
        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: 10\nDisallow: /admin");
        assert_eq!(robots.crawl_delay("TestBot"), Some(10.0));
    }

    #[test]
    fn test_crawl_delay_specific_agent_wins() {
        let content = "User-agent: *\nCrawl-delay: 10\n\nUser-agent: TestBot\nCrawl-delay: 5";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(robots.crawl_delay("TestBot"), Some(5.0));
        assert_eq!(robots.crawl_delay("OtherBot"), Some(10.0));
    }

    #[test]
    fn test_crawl_delay_after_rules_in_group() {
        let content = "User-agent: TestBot\nDisallow: /tmp\nCrawl-delay: 2.5\n\nUser-agent: *\nDisallow: /";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(robots.crawl_delay("testbot"), Some(2.5));
        assert_eq!(robots.crawl_delay("OtherBot"), None);
    }

    #[test]
    fn test_crawl_delay_multiple_user_agents() {
        let content = "User-agent: BotA\nUser-agent: BotB # shared\nCrawl-delay: 3";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(robots.crawl_delay("BotA"), Some(3.0));
        assert_eq!(robots.crawl_delay("BotB"), Some(3.0));
        assert_eq!(robots.crawl_delay("BotC"), None);
    }

    #[test]
    fn test_crawl_delay_invalid_values_ignored() {
        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: soon\nCrawl-delay: -4");
        assert_eq!(robots.crawl_delay("TestBot"), None);
    }
}
