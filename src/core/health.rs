use crate::domain::model::{ProbeEndpoint, ServiceHealth};
use crate::utils::error::Result;
use futures::future::join_all;
use reqwest::Client;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// 已知服務的預設健康檢查端點（容器內的 port）
const KNOWN_ENDPOINTS: &[(&str, u16, &str)] = &[
    ("qbittorrent", 8080, "/"),
    ("transmission", 9091, "/transmission/web/"),
    ("radarr", 7878, "/ping"),
    ("sonarr", 8989, "/ping"),
    ("lidarr", 8686, "/ping"),
    ("readarr", 8787, "/ping"),
    ("prowlarr", 9696, "/ping"),
    ("bazarr", 6767, "/"),
    ("flaresolverr", 8191, "/"),
    ("jellyfin", 8096, "/health"),
    ("plex", 32400, "/identity"),
    ("jellyseerr", 5055, "/api/v1/status"),
];

pub fn known_services() -> Vec<&'static str> {
    KNOWN_ENDPOINTS.iter().map(|(name, _, _)| *name).collect()
}

pub fn default_endpoint(name: &str) -> Option<ProbeEndpoint> {
    KNOWN_ENDPOINTS
        .iter()
        .find(|(known, _, _)| *known == name)
        .map(|(_, port, path)| ProbeEndpoint::new(*port, path))
}

enum Slot {
    Ready(ServiceHealth),
    Probing {
        name: String,
        endpoint: String,
        handle: JoinHandle<ServiceHealth>,
    },
}

/// 並行探測多個服務的 HTTP 健康狀態，不做任何重試
pub struct HealthGate {
    client: Client,
    host: String,
    endpoints: HashMap<String, ProbeEndpoint>,
}

impl HealthGate {
    pub fn new(host: &str, endpoints: HashMap<String, ProbeEndpoint>) -> Result<Self> {
        Self::with_timeout(host, endpoints, DEFAULT_PROBE_TIMEOUT)
    }

    pub fn with_timeout(
        host: &str,
        endpoints: HashMap<String, ProbeEndpoint>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            host: host.to_string(),
            endpoints,
        })
    }

    pub fn endpoint_url(&self, name: &str) -> Option<String> {
        self.endpoints.get(name).map(|endpoint| endpoint.url(&self.host))
    }

    /// 每個探測各自一個 task；結果依輸入順序回傳
    pub async fn probe_all(&self, names: &[String]) -> Vec<ServiceHealth> {
        let slots: Vec<Slot> = names
            .iter()
            .map(|name| match self.endpoint_url(name) {
                Some(endpoint) => {
                    let client = self.client.clone();
                    let task_name = name.clone();
                    let task_endpoint = endpoint.clone();
                    Slot::Probing {
                        name: name.clone(),
                        endpoint,
                        handle: tokio::spawn(async move {
                            probe_one(&client, &task_name, &task_endpoint).await
                        }),
                    }
                }
                None => Slot::Ready(ServiceHealth::unknown(name)),
            })
            .collect();

        join_all(slots.into_iter().map(|slot| async move {
            match slot {
                Slot::Ready(health) => health,
                Slot::Probing {
                    name,
                    endpoint,
                    handle,
                } => handle.await.unwrap_or_else(|e| {
                    ServiceHealth::unreachable(
                        &name,
                        &endpoint,
                        format!("probe task failed: {}", e),
                        Duration::ZERO,
                    )
                }),
            }
        }))
        .await
    }
}

async fn probe_one(client: &Client, name: &str, endpoint: &str) -> ServiceHealth {
    let started = Instant::now();
    let health = match client.get(endpoint).send().await {
        Ok(response) => {
            ServiceHealth::from_status(name, endpoint, response.status().as_u16(), started.elapsed())
        }
        Err(e) => ServiceHealth::unreachable(name, endpoint, e.to_string(), started.elapsed()),
    };

    if health.healthy {
        tracing::debug!("💚 {} answered HTTP {} in {:?}", name, health.status_code, health.latency);
    } else {
        tracing::debug!(
            "💔 {} is not healthy: {}",
            name,
            health.error.as_deref().unwrap_or("unknown error")
        );
    }
    health
}
