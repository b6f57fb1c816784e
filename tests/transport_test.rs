use httpmock::prelude::*;
use mediastack_setup::{ApiRequest, RequestBody, RetryPolicy, RetryingTransport, TransportError};
use serde_json::json;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn fast_transport(max_attempts: u32) -> RetryingTransport {
    let policy = RetryPolicy::new(
        max_attempts,
        Duration::from_millis(5),
        Duration::from_millis(20),
        Duration::from_secs(2),
    )
    .unwrap();
    RetryingTransport::new(policy).unwrap()
}

fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn assert_exhausted_with_status(err: TransportError, expected_attempts: u32, expected_status: u16) {
    match err {
        TransportError::RetryExhausted { attempts, last, .. } => {
            assert_eq!(attempts, expected_attempts);
            assert!(
                matches!(*last, TransportError::Status { status, .. } if status == expected_status),
                "unexpected last failure: {:?}",
                last
            );
        }
        other => panic!("expected RetryExhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_get_retries_every_eligible_status_until_exhausted() {
    for status in [429, 500, 502, 503, 504] {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v3/rootfolder");
                then.status(status);
            })
            .await;

        let transport = fast_transport(3);
        let result = transport
            .execute(ApiRequest::get(server.url("/api/v3/rootfolder")))
            .await;

        assert_exhausted_with_status(result.unwrap_err(), 3, status);
        mock.assert_hits_async(3).await;
    }
}

#[tokio::test]
async fn test_post_server_error_is_never_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v3/downloadclient");
            then.status(500).body("boom");
        })
        .await;

    let transport = fast_transport(4);
    let request = ApiRequest::post(server.url("/api/v3/downloadclient"))
        .body(RequestBody::json(&json!({"name": "qBittorrent"})).unwrap());
    let response = transport.execute(request).await.unwrap();

    assert_eq!(response.status().as_u16(), 500);
    assert_eq!(response.text(), "boom");
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_post_rate_limit_is_retried_with_same_body() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v1/applications")
                .json_body(json!({"name": "Radarr"}));
            then.status(429);
        })
        .await;

    let transport = fast_transport(3);
    let request = ApiRequest::post(server.url("/api/v1/applications"))
        .body(RequestBody::json(&json!({"name": "Radarr"})).unwrap());
    let result = transport.execute(request).await;

    assert_exhausted_with_status(result.unwrap_err(), 3, 429);
    mock.assert_hits_async(3).await;
}

#[tokio::test]
async fn test_non_eligible_status_returns_immediately() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/missing");
            then.status(404);
        })
        .await;

    let transport = fast_transport(5);
    let response = transport
        .execute(ApiRequest::get(server.url("/missing")))
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 404);
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_network_failure_exhausts_retries() {
    let transport = fast_transport(2);
    let url = format!("http://127.0.0.1:{}/ping", closed_port());

    let err = transport.execute(ApiRequest::get(url)).await.unwrap_err();

    match err {
        TransportError::RetryExhausted { attempts, last, .. } => {
            assert_eq!(attempts, 2);
            assert!(matches!(*last, TransportError::Network { .. }));
        }
        other => panic!("expected RetryExhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_one_shot_body_fails_fast_instead_of_resending() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/upload");
            then.status(429);
        })
        .await;

    let transport = fast_transport(4);
    let request = ApiRequest::post(server.url("/upload"))
        .body(RequestBody::once("application/octet-stream", b"chunk".to_vec()));
    let err = transport.execute(request).await.unwrap_err();

    assert!(matches!(err, TransportError::BodyNotReplayable { .. }));
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_retry_after_header_extends_delay() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/busy");
            then.status(503).header("Retry-After", "1");
        })
        .await;

    let transport = fast_transport(2);
    let started = Instant::now();
    let result = transport.execute(ApiRequest::get(server.url("/busy"))).await;

    assert!(result.is_err());
    assert!(started.elapsed() >= Duration::from_secs(1));
    mock.assert_hits_async(2).await;
}

#[tokio::test]
async fn test_cancellation_interrupts_backoff() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/busy");
            then.status(503);
        })
        .await;

    let policy = RetryPolicy::new(
        3,
        Duration::from_secs(30),
        Duration::from_secs(60),
        Duration::from_secs(2),
    )
    .unwrap();
    let cancel = CancellationToken::new();
    let transport = RetryingTransport::new(policy)
        .unwrap()
        .with_cancellation(cancel.clone());

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = transport
        .execute(ApiRequest::get(server.url("/busy")))
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::Cancelled { .. }));
    assert!(started.elapsed() < Duration::from_secs(10));
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_cancelled_transport_sends_nothing() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v3/rootfolder");
            then.status(201);
        })
        .await;

    let cancel = CancellationToken::new();
    let transport = fast_transport(3).with_cancellation(cancel.clone());
    cancel.cancel();

    let request = ApiRequest::post(server.url("/api/v3/rootfolder"))
        .body(RequestBody::json(&json!({"path": "/data/media/tv"})).unwrap());
    let err = transport.execute(request).await.unwrap_err();

    assert!(matches!(err, TransportError::Cancelled { .. }));
    mock.assert_hits_async(0).await;
}
