use crate::utils::error::{Result, SetupError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// 服務名稱 → API key
pub type SecretMap = BTreeMap<String, String>;

/// 單一 transport 實例的重試策略，建立後不可變更
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    request_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        if max_attempts == 0 {
            return Err(SetupError::InvalidConfigValue {
                field: "retry.max_attempts".to_string(),
                value: "0".to_string(),
                reason: "a request must be attempted at least once".to_string(),
            });
        }

        if max_delay < base_delay {
            return Err(SetupError::InvalidConfigValue {
                field: "retry.max_delay_ms".to_string(),
                value: max_delay.as_millis().to_string(),
                reason: format!("must not be below base delay of {}ms", base_delay.as_millis()),
            });
        }

        Ok(Self {
            max_attempts,
            base_delay,
            max_delay,
            request_timeout,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// 健康檢查端點（port + path）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeEndpoint {
    pub port: u16,
    pub path: String,
}

impl ProbeEndpoint {
    pub fn new(port: u16, path: &str) -> Self {
        Self {
            port,
            path: path.to_string(),
        }
    }

    pub fn url(&self, host: &str) -> String {
        format!("http://{}:{}/{}", host, self.port, self.path.trim_start_matches('/'))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub name: String,
    pub endpoint: String,
    pub healthy: bool,
    /// 0 表示沒有收到任何 HTTP 回應
    pub status_code: u16,
    pub error: Option<String>,
    pub latency: Duration,
}

impl ServiceHealth {
    pub fn from_status(name: &str, endpoint: &str, status_code: u16, latency: Duration) -> Self {
        let healthy = status_code < 500;
        Self {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            healthy,
            status_code,
            error: (!healthy).then(|| format!("HTTP {}", status_code)),
            latency,
        }
    }

    pub fn unreachable(name: &str, endpoint: &str, error: String, latency: Duration) -> Self {
        Self {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            healthy: false,
            status_code: 0,
            error: Some(error),
            latency,
        }
    }

    pub fn unknown(name: &str) -> Self {
        Self::unreachable(name, "", "unknown service".to_string(), Duration::ZERO)
    }
}

/// 一筆設定動作的結果，建立後不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    service: String,
    action: String,
    ok: bool,
    error: Option<String>,
}

impl ActionOutcome {
    pub fn success(service: &str, action: &str) -> Self {
        Self {
            service: service.to_string(),
            action: action.to_string(),
            ok: true,
            error: None,
        }
    }

    pub fn failure(service: &str, action: &str, error: impl fmt::Display) -> Self {
        let mut message = error.to_string();
        if message.trim().is_empty() {
            message = "unspecified failure".to_string();
        }

        Self {
            service: service.to_string(),
            action: action.to_string(),
            ok: false,
            error: Some(message),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn ok(&self) -> bool {
        self.ok
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => write!(f, "✅ {:<12} {}", self.service, self.action),
            Some(error) => write!(f, "❌ {:<12} {}: {}", self.service, self.action, error),
        }
    }
}

/// 可透過 list-then-create 冪等建立的資源種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    ApplicationLink,
    DownloadClient,
    IndexerProxy,
    Notification,
    RootFolder,
    Category,
}

impl ResourceKind {
    /// 用來比對「是否已存在」的欄位
    pub fn identity_field(&self) -> &'static str {
        match self {
            ResourceKind::RootFolder => "path",
            _ => "name",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::ApplicationLink => "application",
            ResourceKind::DownloadClient => "download client",
            ResourceKind::IndexerProxy => "indexer proxy",
            ResourceKind::Notification => "notification",
            ResourceKind::RootFolder => "root folder",
            ResourceKind::Category => "category",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
