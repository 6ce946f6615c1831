//! End-to-end crawls against a local mock HTTP server

use crate::common::{create_test_config, http_coordinator, page, RecordingSink};
use skein::state::ItemState;
use skein::storage::{SessionStatus, SqliteStore};
use skein::Coordinator;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html")
}

async fn mount_page(server: &MockServer, route: &str, body: String, fetches: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .expect(fetches)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_crawl_fetches_each_page_once() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("crawl.db");

    mount_page(&server, "/", page(&["/a", "/b", "/a#top", "/b/"]), 1).await;
    mount_page(&server, "/a", page(&["/", "/b"]), 1).await;
    mount_page(&server, "/b", page(&["/a", "mailto:x@example.com"]), 1).await;

    let config = create_test_config(&[format!("{}/", server.uri())], &db_path);
    let report = Coordinator::from_config(config, "hash")
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(report.stats.completed, 3);
    assert_eq!(report.stats.dropped, 0);
    assert_eq!(report.stats.links_enqueued, 2);

    let store = SqliteStore::open(&db_path).unwrap();
    assert_eq!(store.count_claims(report.session_id).unwrap(), 3);
    assert_eq!(store.count_documents(report.session_id).unwrap(), 3);
}

#[tokio::test]
async fn test_robots_disallowed_link_never_fetched() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("robots.db");

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/", page(&["/private/page", "/public"]), 1).await;
    mount_page(&server, "/public", page(&[]), 1).await;
    mount_page(&server, "/private/page", page(&[]), 0).await;

    let config = create_test_config(&[format!("{}/", server.uri())], &db_path);
    let store = Arc::new(SqliteStore::open(&db_path).unwrap());
    let report = http_coordinator(config, Arc::clone(&store), Arc::new(RecordingSink::default()))
        .run()
        .await
        .unwrap();

    let private = store
        .frontier_entry(report.session_id, &format!("{}/private/page", server.uri()))
        .unwrap()
        .unwrap();
    assert_eq!(private.state, ItemState::Dropped);
    assert_eq!(private.drop_reason.as_deref(), Some("robots_disallowed"));
    assert_eq!(report.stats.completed, 2);
}

#[tokio::test]
async fn test_transient_failures_then_success() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("retry.db");

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;
    mount_page(&server, "/flaky", "<p>finally</p>".to_string(), 1).await;

    let seed = format!("{}/flaky", server.uri());
    let config = create_test_config(&[seed.clone()], &db_path);
    let store = Arc::new(SqliteStore::open(&db_path).unwrap());
    let sink = Arc::new(RecordingSink::default());
    let report = http_coordinator(config, Arc::clone(&store), Arc::clone(&sink))
        .run()
        .await
        .unwrap();

    assert_eq!(report.stats.requeued, 3);
    assert_eq!(report.stats.completed, 1);

    let entry = store.frontier_entry(report.session_id, &seed).unwrap().unwrap();
    assert_eq!(entry.state, ItemState::Completed);
    assert_eq!(entry.retry_count, 3);
    assert_eq!(sink.body_of(&seed).as_deref(), Some("<p>finally</p>"));
}

#[tokio::test]
async fn test_retry_cap_drops_after_max_retries_plus_one() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("cap.db");

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&server)
        .await;

    let seed = format!("{}/down", server.uri());
    let config = create_test_config(&[seed.clone()], &db_path);
    let store = Arc::new(SqliteStore::open(&db_path).unwrap());
    let report = http_coordinator(config, Arc::clone(&store), Arc::new(RecordingSink::default()))
        .run()
        .await
        .unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(report.stats.fetched, 4);

    let entry = store.frontier_entry(report.session_id, &seed).unwrap().unwrap();
    assert_eq!(entry.state, ItemState::Dropped);
    assert_eq!(entry.drop_reason.as_deref(), Some("retries_exhausted"));
    assert_eq!(entry.last_error.as_deref(), Some("HTTP 500"));
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("gone.db");

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(410))
        .expect(1)
        .mount(&server)
        .await;

    let seed = format!("{}/gone", server.uri());
    let config = create_test_config(&[seed.clone()], &db_path);
    let store = Arc::new(SqliteStore::open(&db_path).unwrap());
    let report = http_coordinator(config, Arc::clone(&store), Arc::new(RecordingSink::default()))
        .run()
        .await
        .unwrap();

    let entry = store.frontier_entry(report.session_id, &seed).unwrap().unwrap();
    assert_eq!(entry.state, ItemState::Dropped);
    assert_eq!(entry.drop_reason.as_deref(), Some("permanent_failure"));
}

#[tokio::test]
async fn test_depth_boundary() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("depth.db");

    mount_page(&server, "/", page(&["/1"]), 1).await;
    mount_page(&server, "/1", page(&["/2"]), 1).await;
    mount_page(&server, "/2", page(&["/3"]), 1).await;
    mount_page(&server, "/3", page(&[]), 0).await;

    let mut config = create_test_config(&[format!("{}/", server.uri())], &db_path);
    config.crawler.max_depth = 2;
    let store = Arc::new(SqliteStore::open(&db_path).unwrap());
    let report = http_coordinator(config, Arc::clone(&store), Arc::new(RecordingSink::default()))
        .run()
        .await
        .unwrap();

    let deepest = store
        .frontier_entry(report.session_id, &format!("{}/2", server.uri()))
        .unwrap()
        .unwrap();
    assert_eq!(deepest.depth, 2);
    assert!(store
        .frontier_entry(report.session_id, &format!("{}/3", server.uri()))
        .unwrap()
        .is_none());
    assert_eq!(store.count_claims(report.session_id).unwrap(), 3);
}

#[tokio::test]
async fn test_redirect_target_enqueued_at_same_depth() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("redirect.db");

    mount_page(&server, "/", page(&["/old"]), 1).await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/new"))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/new", page(&["/old"]), 1).await;

    let config = create_test_config(&[format!("{}/", server.uri())], &db_path);
    let store = Arc::new(SqliteStore::open(&db_path).unwrap());
    let report = http_coordinator(config, Arc::clone(&store), Arc::new(RecordingSink::default()))
        .run()
        .await
        .unwrap();

    assert_eq!(report.stats.redirects_followed, 1);

    let old = store
        .frontier_entry(report.session_id, &format!("{}/old", server.uri()))
        .unwrap()
        .unwrap();
    assert_eq!(old.state, ItemState::Completed);

    let new = store
        .frontier_entry(report.session_id, &format!("{}/new", server.uri()))
        .unwrap()
        .unwrap();
    assert_eq!(new.state, ItemState::Completed);
    assert_eq!(new.depth, old.depth);
    assert_eq!(new.redirect_hops, 1);
}

#[tokio::test]
async fn test_redirect_loop_terminates() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("loop.db");

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/b"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/a"))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&[format!("{}/a", server.uri())], &db_path);
    let store = Arc::new(SqliteStore::open(&db_path).unwrap());
    let report = http_coordinator(config, store, Arc::new(RecordingSink::default()))
        .run()
        .await
        .unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(report.stats.completed, 2);
}

#[tokio::test]
async fn test_two_processes_share_one_session() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("shared.db");

    mount_page(&server, "/", page(&["/a", "/b", "/c", "/d"]), 1).await;
    for route in ["/a", "/b", "/c", "/d"] {
        mount_page(&server, route, page(&["/", "/a", "/b", "/c", "/d"]), 1).await;
    }

    let seeds = [format!("{}/", server.uri())];
    let first = http_coordinator(
        create_test_config(&seeds, &db_path),
        Arc::new(SqliteStore::open(&db_path).unwrap()),
        Arc::new(RecordingSink::default()),
    );
    let second = http_coordinator(
        create_test_config(&seeds, &db_path),
        Arc::new(SqliteStore::open(&db_path).unwrap()),
        Arc::new(RecordingSink::default()),
    );

    let (first, second) = tokio::join!(first.run(), second.run());
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first.session_id, second.session_id);
    assert_eq!(first.seeds_enqueued + second.seeds_enqueued, 1);
    assert_eq!(first.stats.completed + second.stats.completed, 5);
}

#[tokio::test]
async fn test_crashed_lease_is_recovered_on_resume() {
    use skein::storage::{CoordinationStore, UrlRecord};
    use std::time::Duration;

    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("crash.db");
    mount_page(&server, "/", page(&[]), 1).await;

    let seed = format!("{}/", server.uri());
    let store = Arc::new(SqliteStore::open(&db_path).unwrap());

    // A process that leased the seed and died without settling it
    let session = store.open_session("default", "hash").unwrap();
    let url = skein::normalize(&seed, None).unwrap();
    assert!(store
        .claim_and_push(session.id, &UrlRecord::seed(seed.as_str(), url))
        .unwrap());
    let abandoned = store.pop(session.id, Duration::ZERO).unwrap().unwrap();
    assert_eq!(abandoned.lease_id, 1);

    let config = create_test_config(&[seed.clone()], &db_path);
    let report = http_coordinator(config, Arc::clone(&store), Arc::new(RecordingSink::default()))
        .run()
        .await
        .unwrap();

    assert!(report.resumed);
    assert_eq!(report.seeds_enqueued, 0);
    assert_eq!(report.stats.completed, 1);

    // The dead process cannot settle the recovered item
    assert!(!store.complete(&abandoned).unwrap());
    let entry = store.frontier_entry(session.id, &seed).unwrap().unwrap();
    assert_eq!(entry.state, ItemState::Completed);
}
