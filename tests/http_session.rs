//! End-to-end: a session driving the HTTP authority against a mock server.

use pretty_assertions::assert_eq;
use riffle::filter::FilterState;
use riffle::remote::{HttpAuthority, ItemId, RetryPolicy};
use riffle::session::{FeedSession, SessionSettings, SyncEvent};
use std::time::Duration;
use tokio::sync::mpsc;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn item_json(id: &str, minute: u32) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "feedId": 7,
        "title": format!("Item {id}"),
        "content": format!("Body {id}"),
        "publishedAt": format!("2026-02-01T09:{minute:02}:00Z"),
        "receivedAt": { "seconds": 1_769_936_400, "nanos": 0 },
        "isRead": false,
    })
}

async fn session_for(
    server: &MockServer,
) -> (FeedSession<HttpAuthority>, mpsc::Receiver<SyncEvent>) {
    let authority = HttpAuthority::new(reqwest::Client::new(), &server.uri(), None)
        .unwrap()
        .with_retry_policy(RetryPolicy::none());
    let (tx, rx) = mpsc::channel(32);
    let session = FeedSession::new(authority, tx, SessionSettings::default(), FilterState::default());
    (session, rx)
}

async fn settle(session: &mut FeedSession<HttpAuthority>, rx: &mut mpsc::Receiver<SyncEvent>) {
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await {
        session.handle_event(event);
    }
}

async fn mount_list(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("isRead", "false"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [item_json("a", 1), item_json("b", 2)],
            "totalCount": 2,
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_session_lists_and_marks_read_over_http() {
    let server = MockServer::start().await;
    mount_list(&server).await;
    Mock::given(method("POST"))
        .and(path("/items/read"))
        .and(body_json(serde_json::json!({ "ids": ["a"], "isRead": true })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let (mut session, mut rx) = session_for(&server).await;
    assert!(session.refresh());
    settle(&mut session, &mut rx).await;
    assert_eq!(
        session.views().sequence,
        vec![ItemId::new("a"), ItemId::new("b")]
    );
    assert!(session.is_exhausted());

    assert!(session.toggle_read(&ItemId::new("a")));
    settle(&mut session, &mut rx).await;
    assert_eq!(session.is_read(&ItemId::new("a")), Some(true));
    assert_eq!(session.item_error(&ItemId::new("a")), None);
}

#[tokio::test]
async fn test_server_rejection_rolls_back_read_flag() {
    let server = MockServer::start().await;
    mount_list(&server).await;
    Mock::given(method("POST"))
        .and(path("/items/read"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (mut session, mut rx) = session_for(&server).await;
    session.refresh();
    settle(&mut session, &mut rx).await;

    assert!(session.toggle_read(&ItemId::new("b")));
    settle(&mut session, &mut rx).await;
    assert_eq!(session.is_read(&ItemId::new("b")), Some(false));
    assert!(session
        .item_error(&ItemId::new("b"))
        .is_some_and(|e| e.contains("500")));
}

#[tokio::test]
async fn test_reader_loads_body_over_http() {
    let server = MockServer::start().await;
    mount_list(&server).await;
    Mock::given(method("GET"))
        .and(path("/items/a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(item_json("a", 1)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items/b"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let (mut session, mut rx) = session_for(&server).await;
    session.refresh();
    settle(&mut session, &mut rx).await;

    session.open(&ItemId::new("a"));
    settle(&mut session, &mut rx).await;
    assert!(matches!(
        session.reader(),
        riffle::session::ReaderContent::Ready(item) if item.content.as_deref() == Some("Body a")
    ));

    // Prefetched as gone: served from cache without a second request.
    session.next();
    assert_eq!(
        session.reader(),
        &riffle::session::ReaderContent::NotFound(ItemId::new("b"))
    );
}
