use httpmock::prelude::*;
use mediastack_setup::{
    ApiRequest, Credentials, RequestBody, RetryPolicy, RetryingTransport, SessionGuard, SetupError,
};
use std::sync::Arc;
use std::time::Duration;

const LOGIN_PATH: &str = "/api/v2/auth/login";
const CATEGORIES_PATH: &str = "/api/v2/torrents/categories";

fn guard_for(server: &MockServer) -> SessionGuard {
    let policy = RetryPolicy::new(
        2,
        Duration::from_millis(5),
        Duration::from_millis(10),
        Duration::from_secs(2),
    )
    .unwrap();
    let transport = Arc::new(RetryingTransport::new(policy).unwrap());
    let credentials = Credentials {
        username: "admin".to_string(),
        password: "adminadmin".to_string(),
    };
    SessionGuard::new("qbittorrent", &server.base_url(), LOGIN_PATH, credentials, transport)
}

#[tokio::test]
async fn test_concurrent_callers_share_one_login() {
    let server = MockServer::start_async().await;
    let login = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(LOGIN_PATH)
                .body_contains("username=admin")
                .body_contains("password=adminadmin");
            then.status(200)
                .header("Set-Cookie", "SID=abc123; HttpOnly; path=/")
                .body("Ok.");
        })
        .await;

    let guard = Arc::new(guard_for(&server));
    assert!(!guard.is_logged_in().await);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let guard = guard.clone();
            tokio::spawn(async move { guard.ensure_logged_in().await })
        })
        .collect();

    for handle in handles {
        let cookie = handle.await.unwrap().unwrap();
        assert_eq!(cookie, "SID=abc123");
    }

    assert!(guard.is_logged_in().await);
    login.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_forbidden_triggers_single_relogin_and_retry() {
    let server = MockServer::start_async().await;
    let mut first_login = server
        .mock_async(|when, then| {
            when.method(POST).path(LOGIN_PATH);
            then.status(200).header("Set-Cookie", "SID=stale; path=/");
        })
        .await;

    let guard = guard_for(&server);
    assert_eq!(guard.ensure_logged_in().await.unwrap(), "SID=stale");
    assert_eq!(first_login.hits_async().await, 1);
    first_login.delete_async().await;

    let second_login = server
        .mock_async(|when, then| {
            when.method(POST).path(LOGIN_PATH);
            then.status(200).header("Set-Cookie", "SID=fresh; path=/");
        })
        .await;
    let stale_request = server
        .mock_async(|when, then| {
            when.method(GET).path(CATEGORIES_PATH).header("Cookie", "SID=stale");
            then.status(403).body("Forbidden");
        })
        .await;
    let fresh_request = server
        .mock_async(|when, then| {
            when.method(GET).path(CATEGORIES_PATH).header("Cookie", "SID=fresh");
            then.status(200).json_body(serde_json::json!({}));
        })
        .await;

    let response = guard
        .do_authenticated(ApiRequest::get(server.url(CATEGORIES_PATH)))
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    second_login.assert_hits_async(1).await;
    stale_request.assert_hits_async(1).await;
    fresh_request.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_second_forbidden_is_returned_to_caller() {
    let server = MockServer::start_async().await;
    let login = server
        .mock_async(|when, then| {
            when.method(POST).path(LOGIN_PATH);
            then.status(200).header("Set-Cookie", "SID=abc123");
        })
        .await;
    let request = server
        .mock_async(|when, then| {
            when.method(GET).path(CATEGORIES_PATH);
            then.status(403);
        })
        .await;

    let guard = guard_for(&server);
    let response = guard
        .do_authenticated(ApiRequest::get(server.url(CATEGORIES_PATH)))
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 403);
    login.assert_hits_async(2).await;
    request.assert_hits_async(2).await;
}

#[tokio::test]
async fn test_one_shot_body_is_not_resent_after_forbidden() {
    let server = MockServer::start_async().await;
    let login = server
        .mock_async(|when, then| {
            when.method(POST).path(LOGIN_PATH);
            then.status(200).header("Set-Cookie", "SID=abc123");
        })
        .await;
    let upload = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v2/torrents/add");
            then.status(403);
        })
        .await;

    let guard = guard_for(&server);
    let request = ApiRequest::post(server.url("/api/v2/torrents/add"))
        .body(RequestBody::once("application/x-bittorrent", b"d4:infoe".to_vec()));
    let response = guard.do_authenticated(request).await.unwrap();

    assert_eq!(response.status().as_u16(), 403);
    login.assert_hits_async(1).await;
    upload.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_login_without_cookie_is_rejected() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(LOGIN_PATH);
            then.status(200).body("Fails.");
        })
        .await;
    let request = server
        .mock_async(|when, then| {
            when.method(GET).path(CATEGORIES_PATH);
            then.status(200);
        })
        .await;

    let guard = guard_for(&server);
    let err = guard
        .do_authenticated(ApiRequest::get(server.url(CATEGORIES_PATH)))
        .await
        .unwrap_err();

    match err {
        SetupError::LoginRejected { service, reason } => {
            assert_eq!(service, "qbittorrent");
            assert!(reason.contains("Fails."));
        }
        other => panic!("expected LoginRejected, got {:?}", other),
    }
    assert!(!guard.is_logged_in().await);
    request.assert_hits_async(0).await;
}

#[tokio::test]
async fn test_login_forbidden_status_is_rejected() {
    let server = MockServer::start_async().await;
    let login = server
        .mock_async(|when, then| {
            when.method(POST).path(LOGIN_PATH);
            then.status(403).body("Your IP address has been banned");
        })
        .await;

    let guard = guard_for(&server);
    let err = guard.ensure_logged_in().await.unwrap_err();

    assert!(matches!(err, SetupError::LoginRejected { .. }));
    login.assert_hits_async(1).await;
}
