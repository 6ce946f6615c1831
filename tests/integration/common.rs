//! Helpers shared by the integration tests

use async_trait::async_trait;
use skein::config::{parse_config, Config};
use skein::crawler::{FetchOutcome, Fetcher, HtmlLinkExtractor, HttpFetcher};
use skein::robots::{RobotsFetchError, RobotsSource};
use skein::sink::{ContentSink, FetchedDocument, SinkError};
use skein::storage::SqliteStore;
use skein::Coordinator;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

const BASE_CONFIG: &str = r#"
[crawler]
max-depth = 3
concurrency = 4
per-host-interval-ms = 1
max-retries = 3
retry-backoff-base-ms = 1
retry-backoff-cap-ms = 20
fetch-timeout-ms = 2000
connect-timeout-ms = 1000
lease-timeout-ms = 10000
quiescence-ms = 100
idle-poll-ms = 10

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0"
contact-url = "https://example.com/bot"
contact-email = "bot@example.com"
"#;

/// Creates a fast-paced configuration crawling `seeds` into `db_path`
pub fn create_test_config(seeds: &[String], db_path: &Path) -> Config {
    let mut config = parse_config(BASE_CONFIG).unwrap();
    config.seeds = seeds.to_vec();
    config.store.database_path = db_path.display().to_string();
    config
}

/// Sink that keeps every document it accepts
#[derive(Default)]
pub struct RecordingSink {
    pub documents: Mutex<Vec<FetchedDocument>>,
}

impl RecordingSink {
    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .documents
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.url.to_string())
            .collect();
        urls.sort();
        urls
    }

    pub fn body_of(&self, url: &str) -> Option<String> {
        self.documents
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.url.as_str() == url)
            .map(|d| d.text().into_owned())
    }
}

#[async_trait]
impl ContentSink for RecordingSink {
    async fn accept(&self, document: &FetchedDocument) -> Result<(), SinkError> {
        self.documents.lock().unwrap().push(document.clone());
        Ok(())
    }
}

/// Fetcher for hosts that cannot be served locally
///
/// Each URL has a script of outcomes; the last one repeats once the script
/// runs out. Unknown URLs are 404s.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: HashMap<String, Vec<FetchOutcome>>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl ScriptedFetcher {
    pub fn html(self, url: &str, body: &str) -> Self {
        let outcome = FetchOutcome::Success {
            status_code: 200,
            body: body.as_bytes().to_vec(),
            final_url: Url::parse(url).unwrap(),
            content_type: "text/html; charset=utf-8".to_string(),
        };
        self.script(url, vec![outcome])
    }

    pub fn script(mut self, url: &str, outcomes: Vec<FetchOutcome>) -> Self {
        self.scripts.insert(url.to_string(), outcomes);
        self
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &Url, _timeout: Duration) -> FetchOutcome {
        let attempt = {
            let mut fetches = self.fetches.lock().unwrap();
            let count = fetches.entry(url.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        match self.scripts.get(url.as_str()) {
            Some(script) if !script.is_empty() => {
                script[(attempt - 1).min(script.len() - 1)].clone()
            }
            _ => FetchOutcome::PermanentFailure {
                reason: "HTTP 404".to_string(),
            },
        }
    }
}

/// Serves robots.txt bodies by host
#[derive(Default)]
pub struct StaticRobots {
    bodies: HashMap<String, String>,
}

impl StaticRobots {
    pub fn with(mut self, host: &str, body: &str) -> Self {
        self.bodies.insert(host.to_string(), body.to_string());
        self
    }
}

#[async_trait]
impl RobotsSource for StaticRobots {
    async fn fetch_robots(&self, robots_url: &Url) -> Result<Option<String>, RobotsFetchError> {
        Ok(robots_url
            .host_str()
            .and_then(|host| self.bodies.get(host))
            .cloned())
    }
}

/// Coordinator over a scripted network
pub fn scripted_coordinator(
    config: Config,
    store: Arc<SqliteStore>,
    fetcher: Arc<ScriptedFetcher>,
    robots: StaticRobots,
    sink: Arc<RecordingSink>,
) -> Coordinator {
    Coordinator::new(
        config,
        store,
        fetcher,
        Arc::new(robots),
        Arc::new(HtmlLinkExtractor),
        sink,
    )
}

/// Coordinator over real HTTP with a recording sink
pub fn http_coordinator(
    config: Config,
    store: Arc<SqliteStore>,
    sink: Arc<RecordingSink>,
) -> Coordinator {
    let http = Arc::new(HttpFetcher::from_config(&config).unwrap());
    Coordinator::new(
        config,
        store,
        Arc::clone(&http) as Arc<dyn Fetcher>,
        http,
        Arc::new(HtmlLinkExtractor),
        sink,
    )
}

/// HTML page linking to `hrefs`
pub fn page(hrefs: &[&str]) -> String {
    let links: String = hrefs
        .iter()
        .map(|href| format!(r#"<a href="{}">link</a>"#, href))
        .collect();
    format!("<html><head><title>Test</title></head><body>{}</body></html>", links)
}
