use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveDate;
use futures::StreamExt;
use serde_json::{json, Value};
use siphon_client::{
    harvest, harvest_windows, ApiClient, Credentials, MediaDownloader, RecentSearch, ResearchApi,
    StopReason, TokenProvider, WebClient,
};
use siphon_core::window::split_windows;
use siphon_core::{
    DateWindow, DedupPolicy, HarvestError, HttpConfig, PaginationConfig, Query, RateLimitConfig,
};
use wiremock::matchers::{body_partial_json, body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_http(max_retries: u32) -> HttpConfig {
    HttpConfig {
        max_retries,
        retry_base_delay: Duration::from_millis(5),
        timeout: Duration::from_secs(5),
        ..HttpConfig::default()
    }
}

fn no_wait() -> RateLimitConfig {
    RateLimitConfig {
        buffer: Duration::ZERO,
        fallback: Duration::ZERO,
        max_wait: None,
    }
}

fn client(max_retries: u32) -> ApiClient {
    ApiClient::builder(fast_http(max_retries))
        .rate_limit(no_wait())
        .bearer("test-token")
        .build()
        .unwrap()
}

#[tokio::test]
async fn throttled_request_is_reissued_without_spending_an_attempt() {
    let server = MockServer::start().await;
    let reset = chrono::Utc::now().timestamp() - 10;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(
            ResponseTemplate::new(429).insert_header("x-rate-limit-reset", reset.to_string()),
        )
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    // A single attempt is allowed, so success proves 429s were not counted.
    let body = client(1)
        .get_json(format!("{}/data", server.uri()).parse().unwrap())
        .await
        .unwrap();
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn transient_failures_exhaust_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(3)
        .get_json(format!("{}/flaky", server.uri()).parse().unwrap())
        .await
        .unwrap_err();
    match err {
        HarvestError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(last.contains("503"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn transient_failure_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2])))
        .mount(&server)
        .await;

    let body = client(3)
        .get_json(format!("{}/x", server.uri()).parse().unwrap())
        .await
        .unwrap();
    assert_eq!(body, json!([1, 2]));
}

#[tokio::test]
async fn unauthorized_is_fatal_and_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(3)
        .get_json(format!("{}/secret", server.uri()).parse().unwrap())
        .await
        .unwrap_err();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn terminal_status_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(3)
        .get_json(format!("{}/missing", server.uri()).parse().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::Http { status: 404, .. }));
}

#[tokio::test]
async fn throttle_wait_above_ceiling_fails() {
    let server = MockServer::start().await;
    let reset = chrono::Utc::now().timestamp() + 3600;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(429).insert_header("x-rate-limit-reset", reset.to_string()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let http = ApiClient::builder(fast_http(3))
        .rate_limit(RateLimitConfig {
            max_wait: Some(Duration::from_secs(60)),
            ..no_wait()
        })
        .build()
        .unwrap();
    let err = http
        .get_json(format!("{}/busy", server.uri()).parse().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::RateLimited { .. }));
}

fn search_page(ids: &[&str], user: &str, next: Option<&str>) -> Value {
    let mut meta = json!({ "result_count": ids.len() });
    if let Some(token) = next {
        meta["next_token"] = json!(token);
    }
    json!({
        "data": ids.iter().map(|id| json!({ "id": id, "text": format!("post {id}") })).collect::<Vec<_>>(),
        "includes": { "users": [{ "id": user }] },
        "meta": meta
    })
}

#[tokio::test]
async fn search_follows_next_tokens_and_merges_includes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/tweets/search/recent"))
        .and(query_param("next_token", "t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_page(&["3"], "u2", Some("t2"))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2/tweets/search/recent"))
        .and(query_param("next_token", "t2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_page(&["4", "5"], "u3", None)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2/tweets/search/recent"))
        .and(query_param("query", "rust"))
        .and(query_param("sort_order", "recency"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_page(&["1", "2"], "u1", Some("t1"))))
        .expect(1)
        .mount(&server)
        .await;

    let source = RecentSearch::new(client(3), &server.uri()).unwrap();
    let result = harvest(
        &source,
        Query::new("rust", 100),
        &PaginationConfig::default(),
        &mut DedupPolicy::None.deduplicator(),
    )
    .await
    .unwrap();

    assert_eq!(result.pages, 3);
    assert_eq!(result.stop, StopReason::Exhausted);
    let doc = result.accumulator.into_document("tweets");
    let ids: Vec<&str> = doc["tweets"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
    assert_eq!(doc["includes"]["users"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn search_stops_when_token_repeats() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_page(&["1"], "u", Some("again"))))
        .expect(2)
        .mount(&server)
        .await;

    let source = RecentSearch::new(client(3), &server.uri()).unwrap();
    let config = PaginationConfig {
        max_requests: Some(5),
        ..PaginationConfig::default()
    };
    let result = harvest(
        &source,
        Query::new("q", 10),
        &config,
        &mut DedupPolicy::None.deduplicator(),
    )
    .await
    .unwrap();

    // The server repeats its token, so the second page ends the harvest.
    assert_eq!(result.pages, 2);
    assert!(matches!(result.stop, StopReason::RepeatedCursor(_)));
}

#[tokio::test]
async fn token_exchange_posts_form_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/oauth/token/"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_key=my-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "clt.xyz",
            "expires_in": 7200,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = TokenProvider::new(client(1), &server.uri()).unwrap();
    let token = provider
        .fetch(&Credentials::new("my-key", "my-secret"))
        .await
        .unwrap();
    assert_eq!(token.access_token, "clt.xyz");
    assert_eq!(token.raw["token_type"], "Bearer");
}

#[tokio::test]
async fn token_response_without_token_is_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": "invalid_client" })))
        .mount(&server)
        .await;

    let provider = TokenProvider::new(client(1), &server.uri()).unwrap();
    let err = provider
        .fetch(&Credentials::new("k", "s"))
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::Authentication(_)));
}

#[tokio::test]
async fn token_rejection_is_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .mount(&server)
        .await;

    let provider = TokenProvider::new(client(1), &server.uri()).unwrap();
    let err = provider
        .fetch(&Credentials::new("k", "s"))
        .await
        .unwrap_err();
    assert!(err.is_fatal());
}

fn videos(ids: &[u64], has_more: bool, cursor: u64, search_id: &str) -> Value {
    json!({
        "data": {
            "videos": ids.iter().map(|id| json!({ "id": id })).collect::<Vec<_>>(),
            "has_more": has_more,
            "cursor": cursor,
            "search_id": search_id
        },
        "error": { "code": "ok" }
    })
}

#[tokio::test]
async fn windowed_video_query_runs_windows_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/research/video/query/"))
        .and(body_partial_json(json!({ "start_date": "20240101", "search_id": "s1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(videos(&[2], false, 2, "s1")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/research/video/query/"))
        .and(body_partial_json(json!({
            "start_date": "20240101",
            "end_date": "20240130",
            "max_count": 100
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(videos(&[1], true, 1, "s1")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/research/video/query/"))
        .and(body_partial_json(json!({ "start_date": "20240131", "end_date": "20240215" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(videos(&[3], false, 1, "s2")))
        .expect(1)
        .mount(&server)
        .await;

    let api = ResearchApi::new(client(3), &server.uri()).unwrap();
    let d = |m, day| NaiveDate::from_ymd_opt(2024, m, day).unwrap();
    let windows = split_windows(DateWindow::new(d(1, 1), d(2, 15)), 30).unwrap();

    let result = harvest_windows(
        &api.videos(),
        &Query::new("alice", 100),
        &windows,
        &PaginationConfig::default(),
        &mut DedupPolicy::None.deduplicator(),
    )
    .await
    .unwrap();

    let ids: Vec<u64> = result
        .accumulator
        .records()
        .iter()
        .map(|v| v["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(result.windows.len(), 2);
    assert_eq!(result.windows[0].pages, 2);
    assert_eq!(result.windows[1].records, 1);
}

#[tokio::test]
async fn failing_window_is_recorded_and_next_window_runs() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "start_date": "20240101" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": { "code": "invalid_params" } })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "start_date": "20240131" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(videos(&[9], false, 1, "s")))
        .mount(&server)
        .await;

    let api = ResearchApi::new(client(3), &server.uri()).unwrap();
    let d = |m, day| NaiveDate::from_ymd_opt(2024, m, day).unwrap();
    let windows = split_windows(DateWindow::new(d(1, 1), d(2, 1)), 30).unwrap();

    let result = harvest_windows(
        &api.videos(),
        &Query::new("alice", 100),
        &windows,
        &PaginationConfig::default(),
        &mut DedupPolicy::None.deduplicator(),
    )
    .await
    .unwrap();

    assert_eq!(result.failed_windows(), 1);
    assert_eq!(result.accumulator.len(), 1);
}

#[tokio::test]
async fn research_comments_paginate_by_offset() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/research/video/comment/list/"))
        .and(body_partial_json(json!({ "video_id": 7301, "cursor": 0 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "comments": [{ "id": 1, "text": "first" }], "has_more": true, "cursor": 50 }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/research/video/comment/list/"))
        .and(body_partial_json(json!({ "video_id": 7301, "cursor": 50 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "comments": [{ "id": 2, "text": "ünïcode 🎉" }], "has_more": false, "cursor": 51 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = ResearchApi::new(client(3), &server.uri()).unwrap();
    let result = harvest(
        &api.comments(),
        Query::new("7301", 50),
        &PaginationConfig::default(),
        &mut DedupPolicy::None.deduplicator(),
    )
    .await
    .unwrap();

    assert_eq!(result.accumulator.len(), 2);
    assert_eq!(result.accumulator.records()[1]["text"], "ünïcode 🎉");
}

#[tokio::test]
async fn web_profile_and_comments() {
    let server = MockServer::start().await;
    let state = json!({
        "__DEFAULT_SCOPE__": {
            "webapp.user-detail": {
                "userInfo": { "user": { "id": "42", "uniqueId": "alice" }, "stats": {} }
            }
        }
    });
    let html = format!(
        r#"<html><script id="__UNIVERSAL_DATA_FOR_REHYDRATION__">{}</script></html>"#,
        state
    );
    Mock::given(method("GET"))
        .and(path("/@alice"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html; charset=utf-8"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/comment/list/"))
        .and(query_param("aweme_id", "p1"))
        .and(query_param("msToken", "signed"))
        .and(query_param("cursor", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status_code": 0,
            "comments": [{ "cid": "c1" }],
            "has_more": 1,
            "cursor": 20
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/comment/list/"))
        .and(query_param("cursor", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status_code": 0,
            "comments": [{ "cid": "c2" }],
            "has_more": 0,
            "cursor": 40
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut signing = BTreeMap::new();
    signing.insert("msToken".to_string(), "signed".to_string());
    let web = WebClient::new(client(3), &server.uri(), signing).unwrap();

    let profile = web.profile("alice").await.unwrap();
    assert_eq!(profile["user"]["id"], "42");

    let result = harvest(
        &web.comments(),
        Query::new("p1", 20),
        &PaginationConfig::default(),
        &mut DedupPolicy::None.deduplicator(),
    )
    .await
    .unwrap();
    assert_eq!(result.accumulator.len(), 2);
}

#[tokio::test]
async fn connections_stop_at_max() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/user/follower/list/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_list": [
                { "user_info": { "uid": "1" } },
                { "user_info": { "uid": "2" } },
                { "user_info": { "uid": "3" } }
            ],
            "has_more": true,
            "cursor": 3
        })))
        .mount(&server)
        .await;

    let web = WebClient::new(client(3), &server.uri(), BTreeMap::new()).unwrap();
    let ids = web
        .connections("42", siphon_client::ConnectionKind::Followers, 2)
        .await
        .unwrap();
    assert_eq!(ids, vec!["1", "2"]);
}

#[tokio::test]
async fn downloader_fetches_each_url_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/clip.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 1024]))
        .expect(1)
        .mount(&server)
        .await;

    let downloader = MediaDownloader::new(client(3));
    let url: reqwest::Url = format!("{}/media/clip.mp4", server.uri()).parse().unwrap();

    let mut stream = downloader.fetch(url.clone()).await.unwrap().unwrap();
    let mut total = 0;
    while let Some(chunk) = stream.next().await {
        total += chunk.unwrap().len();
    }
    assert_eq!(total, 1024);

    assert!(downloader.fetch(url).await.unwrap().is_none());
    assert_eq!(downloader.requested(), 1);
}

/// Serves `body` one byte at a time, pausing `pause` between bytes.
async fn trickle_server(body: &'static [u8], pause: Duration) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
                    body.len()
                );
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                for byte in body {
                    tokio::time::sleep(pause).await;
                    if socket.write_all(&[*byte]).await.is_err() {
                        return;
                    }
                    let _ = socket.flush().await;
                }
            });
        }
    });
    format!("http://{}/slow", addr)
}

fn short_timeout_client() -> ApiClient {
    ApiClient::builder(HttpConfig {
        max_retries: 1,
        retry_base_delay: Duration::from_millis(5),
        timeout: Duration::from_millis(300),
        ..HttpConfig::default()
    })
    .rate_limit(no_wait())
    .build()
    .unwrap()
}

#[tokio::test]
async fn slow_download_outlives_the_request_timeout() {
    let url = trickle_server(b"abcdefgh", Duration::from_millis(100)).await;
    let downloader = MediaDownloader::new(short_timeout_client());

    let mut stream = downloader.fetch(url.parse().unwrap()).await.unwrap().unwrap();
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        body.extend(chunk.unwrap());
    }
    assert_eq!(body, b"abcdefgh");
}

#[tokio::test]
async fn slow_json_body_hits_the_request_timeout() {
    let url = trickle_server(br#"{"ok":true}"#, Duration::from_millis(100)).await;
    let result = short_timeout_client().get_json(url.parse().unwrap()).await;
    assert!(result.is_err());
}
