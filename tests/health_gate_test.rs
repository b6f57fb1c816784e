use httpmock::prelude::*;
use mediastack_setup::domain::model::ProbeEndpoint;
use mediastack_setup::HealthGate;
use std::collections::HashMap;
use std::time::Duration;

fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn server_answering(path: &str, status: u16) -> MockServer {
    let server = MockServer::start_async().await;
    let path = path.to_string();
    server
        .mock_async(move |when, then| {
            when.method(GET).path(path);
            then.status(status);
        })
        .await;
    server
}

fn names(services: &[&str]) -> Vec<String> {
    services.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_probe_classifies_status_and_keeps_input_order() {
    let radarr = server_answering("/ping", 200).await;
    let sonarr = server_answering("/ping", 401).await;
    let bazarr = server_answering("/", 403).await;
    let prowlarr = server_answering("/ping", 404).await;
    let jellyfin = server_answering("/health", 503).await;

    let endpoints = HashMap::from([
        ("radarr".to_string(), ProbeEndpoint::new(radarr.port(), "/ping")),
        ("sonarr".to_string(), ProbeEndpoint::new(sonarr.port(), "/ping")),
        ("bazarr".to_string(), ProbeEndpoint::new(bazarr.port(), "/")),
        ("prowlarr".to_string(), ProbeEndpoint::new(prowlarr.port(), "/ping")),
        ("jellyfin".to_string(), ProbeEndpoint::new(jellyfin.port(), "/health")),
    ]);
    let gate = HealthGate::with_timeout("127.0.0.1", endpoints, Duration::from_secs(2)).unwrap();

    let order = names(&["jellyfin", "radarr", "prowlarr", "sonarr", "bazarr"]);
    let results = gate.probe_all(&order).await;

    let seen: Vec<&str> = results.iter().map(|h| h.name.as_str()).collect();
    assert_eq!(seen, vec!["jellyfin", "radarr", "prowlarr", "sonarr", "bazarr"]);

    let codes: Vec<u16> = results.iter().map(|h| h.status_code).collect();
    assert_eq!(codes, vec![503, 200, 404, 401, 403]);

    let healthy: Vec<bool> = results.iter().map(|h| h.healthy).collect();
    assert_eq!(healthy, vec![false, true, true, true, true]);
    assert_eq!(results[0].error.as_deref(), Some("HTTP 503"));
    assert!(results[1].error.is_none());
}

#[tokio::test]
async fn test_unreachable_service_reports_status_zero() {
    let port = closed_port();
    let endpoints = HashMap::from([("lidarr".to_string(), ProbeEndpoint::new(port, "/ping"))]);
    let gate = HealthGate::with_timeout("127.0.0.1", endpoints, Duration::from_secs(2)).unwrap();

    let results = gate.probe_all(&names(&["lidarr"])).await;

    assert_eq!(results.len(), 1);
    assert!(!results[0].healthy);
    assert_eq!(results[0].status_code, 0);
    assert_eq!(results[0].endpoint, format!("http://127.0.0.1:{}/ping", port));
    assert!(results[0].error.is_some());
}

#[tokio::test]
async fn test_unknown_service_never_touches_network() {
    let radarr = MockServer::start_async().await;
    let ping = radarr
        .mock_async(|when, then| {
            when.method(GET);
            then.status(200);
        })
        .await;

    let endpoints = HashMap::from([("radarr".to_string(), ProbeEndpoint::new(radarr.port(), "/ping"))]);
    let gate = HealthGate::new("127.0.0.1", endpoints).unwrap();

    let results = gate.probe_all(&names(&["kodi", "radarr"])).await;

    assert_eq!(results[0].name, "kodi");
    assert!(!results[0].healthy);
    assert_eq!(results[0].status_code, 0);
    assert_eq!(results[0].error.as_deref(), Some("unknown service"));
    assert!(results[1].healthy);
    ping.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_empty_input_yields_empty_result() {
    let gate = HealthGate::new("127.0.0.1", HashMap::new()).unwrap();
    assert!(gate.probe_all(&[]).await.is_empty());
}
