//! Crawl scenarios over a scripted network
//!
//! These hosts cannot be served locally, so fetches and robots.txt come from
//! in-process fakes while the store stays real.

use crate::common::{
    create_test_config, page, scripted_coordinator, RecordingSink, ScriptedFetcher, StaticRobots,
};
use skein::crawler::FetchOutcome;
use skein::state::ItemState;
use skein::storage::{SessionStatus, SqliteStore};
use std::sync::Arc;
use tempfile::TempDir;

fn transient() -> FetchOutcome {
    FetchOutcome::TransientFailure {
        reason: "HTTP 503".to_string(),
    }
}

fn create_test_store(dir: &TempDir) -> (Arc<SqliteStore>, std::path::PathBuf) {
    let db_path = dir.path().join("scenario.db");
    (Arc::new(SqliteStore::open(&db_path).unwrap()), db_path)
}

#[tokio::test]
async fn test_equivalent_links_enqueued_once() {
    let dir = TempDir::new().unwrap();
    let (store, db_path) = create_test_store(&dir);
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .html("http://a.test/", &page(&["/b", "http://a.test/b", "http://b.test/"]))
            .html("http://a.test/b", &page(&[]))
            .html("http://b.test/", &page(&[])),
    );

    let config = create_test_config(&["http://a.test/".to_string()], &db_path);
    let report = scripted_coordinator(
        config,
        Arc::clone(&store),
        Arc::clone(&fetcher),
        StaticRobots::default(),
        Arc::new(RecordingSink::default()),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.stats.links_enqueued, 2);

    let mut urls: Vec<String> = store
        .frontier_entries(report.session_id)
        .unwrap()
        .into_iter()
        .map(|entry| entry.url)
        .collect();
    urls.sort();
    assert_eq!(
        urls,
        vec!["http://a.test/", "http://a.test/b", "http://b.test/"]
    );
    assert_eq!(fetcher.fetch_count("http://a.test/b"), 1);
}

#[tokio::test]
async fn test_503_three_times_then_200() {
    let dir = TempDir::new().unwrap();
    let (store, db_path) = create_test_store(&dir);
    let ok = FetchOutcome::Success {
        status_code: 200,
        body: b"recovered".to_vec(),
        final_url: url::Url::parse("http://x.test/").unwrap(),
        content_type: "text/plain".to_string(),
    };
    let fetcher = Arc::new(ScriptedFetcher::default().script(
        "http://x.test/",
        vec![transient(), transient(), transient(), ok],
    ));
    let sink = Arc::new(RecordingSink::default());

    let config = create_test_config(&["http://x.test/".to_string()], &db_path);
    let report = scripted_coordinator(
        config,
        Arc::clone(&store),
        Arc::clone(&fetcher),
        StaticRobots::default(),
        Arc::clone(&sink),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(fetcher.fetch_count("http://x.test/"), 4);

    let entry = store
        .frontier_entry(report.session_id, "http://x.test/")
        .unwrap()
        .unwrap();
    assert_eq!(entry.state, ItemState::Completed);
    assert_eq!(sink.body_of("http://x.test/").as_deref(), Some("recovered"));
}

#[tokio::test]
async fn test_always_transient_fetched_max_retries_plus_one() {
    let dir = TempDir::new().unwrap();
    let (store, db_path) = create_test_store(&dir);
    let fetcher = Arc::new(ScriptedFetcher::default().script("http://x.test/", vec![transient()]));

    let mut config = create_test_config(&["http://x.test/".to_string()], &db_path);
    config.crawler.max_retries = 2;
    let report = scripted_coordinator(
        config,
        Arc::clone(&store),
        Arc::clone(&fetcher),
        StaticRobots::default(),
        Arc::new(RecordingSink::default()),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(fetcher.fetch_count("http://x.test/"), 3);
    let entry = store
        .frontier_entry(report.session_id, "http://x.test/")
        .unwrap()
        .unwrap();
    assert_eq!(entry.state, ItemState::Dropped);
    assert_eq!(entry.retry_count, 2);
}

#[tokio::test]
async fn test_robots_disallow_drops_before_fetch() {
    let dir = TempDir::new().unwrap();
    let (store, db_path) = create_test_store(&dir);
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .html("http://host.test/", &page(&["http://host.test/private/page"]))
            .html("http://host.test/private/page", &page(&[])),
    );
    let robots = StaticRobots::default().with("host.test", "User-agent: *\nDisallow: /private");

    let config = create_test_config(&["http://host.test/".to_string()], &db_path);
    let report = scripted_coordinator(
        config,
        Arc::clone(&store),
        Arc::clone(&fetcher),
        robots,
        Arc::new(RecordingSink::default()),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(fetcher.fetch_count("http://host.test/private/page"), 0);
    let entry = store
        .frontier_entry(report.session_id, "http://host.test/private/page")
        .unwrap()
        .unwrap();
    assert_eq!(entry.state, ItemState::Dropped);
    assert_eq!(entry.drop_reason.as_deref(), Some("robots_disallowed"));
}

#[tokio::test]
async fn test_malformed_redirect_dropped() {
    let dir = TempDir::new().unwrap();
    let (store, db_path) = create_test_store(&dir);
    let fetcher = Arc::new(ScriptedFetcher::default().script(
        "http://a.test/",
        vec![FetchOutcome::Redirect {
            status_code: 302,
            target: "ftp://files.a.test/".to_string(),
        }],
    ));

    let config = create_test_config(&["http://a.test/".to_string()], &db_path);
    let report = scripted_coordinator(
        config,
        Arc::clone(&store),
        fetcher,
        StaticRobots::default(),
        Arc::new(RecordingSink::default()),
    )
    .run()
    .await
    .unwrap();

    let entry = store
        .frontier_entry(report.session_id, "http://a.test/")
        .unwrap()
        .unwrap();
    assert_eq!(entry.state, ItemState::Dropped);
    assert_eq!(entry.drop_reason.as_deref(), Some("malformed_redirect"));
}

#[tokio::test]
async fn test_stay_on_seed_hosts() {
    let dir = TempDir::new().unwrap();
    let (store, db_path) = create_test_store(&dir);
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .html(
                "http://a.test/",
                &page(&["/local", "http://elsewhere.test/", "/image.png"]),
            )
            .html("http://a.test/local", &page(&[])),
    );

    let mut config = create_test_config(&["http://a.test/".to_string()], &db_path);
    config.scope.stay_on_seed_hosts = true;
    let report = scripted_coordinator(
        config,
        Arc::clone(&store),
        Arc::clone(&fetcher),
        StaticRobots::default(),
        Arc::new(RecordingSink::default()),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.stats.links_enqueued, 1);
    assert_eq!(fetcher.total_fetches(), 2);
    assert!(store
        .frontier_entry(report.session_id, "http://elsewhere.test/")
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_non_html_documents_reach_sink_without_links() {
    let dir = TempDir::new().unwrap();
    let (store, db_path) = create_test_store(&dir);
    let fetcher = Arc::new(ScriptedFetcher::default().script(
        "http://a.test/feed",
        vec![FetchOutcome::Success {
            status_code: 200,
            body: br#"{"href": "/not-a-link"}"#.to_vec(),
            final_url: url::Url::parse("http://a.test/feed").unwrap(),
            content_type: "application/json".to_string(),
        }],
    ));
    let sink = Arc::new(RecordingSink::default());

    let config = create_test_config(&["http://a.test/feed".to_string()], &db_path);
    let report = scripted_coordinator(
        config,
        store,
        Arc::clone(&fetcher),
        StaticRobots::default(),
        Arc::clone(&sink),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.stats.links_enqueued, 0);
    assert_eq!(sink.urls(), vec!["http://a.test/feed"]);
}
