#[cfg(feature = "cli")]
pub mod cli;

use crate::core::health::{default_endpoint, known_services};
use crate::domain::model::{ProbeEndpoint, RetryPolicy};
use crate::utils::error::{Result, SetupError};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TorrentClient {
    Qbittorrent,
    Transmission,
}

impl TorrentClient {
    pub fn service_id(&self) -> &'static str {
        match self {
            TorrentClient::Qbittorrent => "qbittorrent",
            TorrentClient::Transmission => "transmission",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            TorrentClient::Qbittorrent => "qBittorrent",
            TorrentClient::Transmission => "Transmission",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaServer {
    Jellyfin,
    Plex,
}

impl MediaServer {
    pub fn service_id(&self) -> &'static str {
        match self {
            MediaServer::Jellyfin => "jellyfin",
            MediaServer::Plex => "plex",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    pub stack: StackInfo,
    /// 覆寫預設的對外 port
    #[serde(default)]
    pub ports: BTreeMap<String, u16>,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub health: HealthSettings,
    pub qbittorrent: Option<QbittorrentSettings>,
    pub notifications: Option<NotificationSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackInfo {
    pub name: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_config_dir")]
    pub config_dir: String,
    #[serde(default = "default_media_dir")]
    pub media_dir: String,
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: String,
    #[serde(default)]
    pub services: Vec<String>,
    pub torrent_client: Option<TorrentClient>,
    pub media_server: Option<MediaServer>,
    #[serde(default = "default_env_files")]
    pub env_files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            request_timeout_secs: 30,
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> Result<RetryPolicy> {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            Duration::from_secs(self.request_timeout_secs),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    pub rounds: u32,
    pub interval_ms: u64,
    pub probe_timeout_ms: u64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            rounds: 3,
            interval_ms: 10_000,
            probe_timeout_ms: 5_000,
        }
    }
}

impl HealthSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QbittorrentSettings {
    #[serde(default = "default_qbittorrent_user")]
    pub username: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub webhook_url: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_config_dir() -> String {
    "config".to_string()
}

fn default_media_dir() -> String {
    "/data/media".to_string()
}

fn default_downloads_dir() -> String {
    "/data/torrents".to_string()
}

fn default_env_files() -> Vec<String> {
    vec![".env".to_string()]
}

fn default_qbittorrent_user() -> String {
    "admin".to_string()
}

impl StackConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| SetupError::Config {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${QBIT_PASSWORD})，未定義的保持原樣
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR_RE
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    /// 依固定順序列出啟用的服務：下載器、其他服務、媒體伺服器
    pub fn enabled_services(&self) -> Vec<String> {
        let mut services: Vec<String> = Vec::new();
        let candidates = self
            .stack
            .torrent_client
            .map(|client| client.service_id().to_string())
            .into_iter()
            .chain(self.stack.services.iter().cloned())
            .chain(
                self.stack
                    .media_server
                    .map(|server| server.service_id().to_string()),
            );

        for service in candidates {
            if !services.contains(&service) {
                services.push(service);
            }
        }
        services
    }

    pub fn is_enabled(&self, service: &str) -> bool {
        self.enabled_services().iter().any(|s| s == service)
    }

    /// 所有已知服務的預設端點加上 [ports] 覆寫
    pub fn probe_endpoints(&self) -> HashMap<String, ProbeEndpoint> {
        known_services()
            .into_iter()
            .filter_map(|service| {
                let mut endpoint = default_endpoint(service)?;
                if let Some(port) = self.ports.get(service) {
                    endpoint.port = *port;
                }
                Some((service.to_string(), endpoint))
            })
            .collect()
    }

    /// 本機可連到的服務 URL
    pub fn service_url(&self, service: &str) -> Option<String> {
        let endpoint = default_endpoint(service)?;
        let port = self.ports.get(service).copied().unwrap_or(endpoint.port);
        Some(format!("http://{}:{}", self.stack.host, port))
    }

    /// 容器網路內其他服務看到的 URL
    pub fn internal_url(&self, service: &str) -> Option<String> {
        let endpoint = default_endpoint(service)?;
        Some(format!("http://{}:{}", service, endpoint.port))
    }

    pub fn webhook_url(&self) -> Option<&str> {
        self.notifications
            .as_ref()
            .and_then(|n| n.webhook_url.as_deref())
    }
}

impl Validate for StackConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("stack.name", &self.stack.name)?;
        validation::validate_non_empty_string("stack.host", &self.stack.host)?;
        validation::validate_path("stack.config_dir", &self.stack.config_dir)?;
        validation::validate_path("stack.media_dir", &self.stack.media_dir)?;
        validation::validate_path("stack.downloads_dir", &self.stack.downloads_dir)?;

        let known = known_services();
        for service in &self.stack.services {
            validation::validate_one_of("stack.services", service, &known)?;
        }
        for service in self.ports.keys() {
            validation::validate_one_of("ports", service, &known)?;
        }
        for file in &self.stack.env_files {
            validation::validate_path("stack.env_files", file)?;
        }

        validation::validate_positive_number("retry.max_attempts", self.retry.max_attempts as u64, 1)?;
        validation::validate_positive_number("health.rounds", self.health.rounds as u64, 1)?;
        validation::validate_positive_number("health.probe_timeout_ms", self.health.probe_timeout_ms, 1)?;

        if let Some(url) = self.webhook_url() {
            validation::validate_url("notifications.webhook_url", url)?;
        }

        Ok(())
    }
}
