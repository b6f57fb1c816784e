use crate::core::session::{Credentials, SessionGuard};
use crate::core::transport::{ApiRequest, RequestBody, RetryingTransport};
use crate::domain::model::ResourceKind;
use crate::domain::ports::ResourceApi;
use crate::utils::error::{Result, SetupError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

const SERVICE: &str = "qbittorrent";

/// qBittorrent WebUI API；所有請求都經過 SessionGuard
pub struct QbittorrentClient {
    base_url: String,
    session: SessionGuard,
}

impl QbittorrentClient {
    pub fn new(base_url: &str, credentials: Credentials, transport: Arc<RetryingTransport>) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            session: SessionGuard::new(SERVICE, &base_url, "/api/v2/auth/login", credentials, transport),
            base_url,
        }
    }

    pub fn session(&self) -> &SessionGuard {
        &self.session
    }

    fn unsupported(kind: ResourceKind) -> SetupError {
        SetupError::Config {
            message: format!("qbittorrent has no {} resource", kind),
        }
    }
}

#[async_trait]
impl ResourceApi for QbittorrentClient {
    fn service(&self) -> &str {
        SERVICE
    }

    async fn list(&self, kind: ResourceKind) -> Result<Vec<Value>> {
        if kind != ResourceKind::Category {
            return Err(Self::unsupported(kind));
        }

        let request = ApiRequest::get(format!("{}/api/v2/torrents/categories", self.base_url));
        let response = self.session.do_authenticated(request).await?;
        if !response.is_success() {
            return Err(SetupError::UnexpectedStatus {
                service: SERVICE.to_string(),
                status: response.status().as_u16(),
                body: response.text(),
            });
        }

        // 回應是 { "<name>": { "name": ..., "savePath": ... } }
        match response.json::<Value>()? {
            Value::Object(map) => Ok(map
                .into_iter()
                .map(|(name, details)| {
                    let save_path = details.get("savePath").cloned().unwrap_or(Value::Null);
                    json!({ "name": name, "savePath": save_path })
                })
                .collect()),
            other => Err(SetupError::UnexpectedStatus {
                service: SERVICE.to_string(),
                status: response.status().as_u16(),
                body: format!("expected a JSON object of categories, got {}", other),
            }),
        }
    }

    async fn create(&self, kind: ResourceKind, descriptor: &Value) -> Result<()> {
        if kind != ResourceKind::Category {
            return Err(Self::unsupported(kind));
        }

        let name = descriptor.get("name").and_then(Value::as_str).unwrap_or_default();
        let save_path = descriptor.get("savePath").and_then(Value::as_str).unwrap_or_default();

        let request = ApiRequest::post(format!("{}/api/v2/torrents/createCategory", self.base_url))
            .body(RequestBody::form(&[("category", name), ("savePath", save_path)]));
        let response = self.session.do_authenticated(request).await?;
        if !response.is_success() {
            return Err(SetupError::UnexpectedStatus {
                service: SERVICE.to_string(),
                status: response.status().as_u16(),
                body: response.text(),
            });
        }
        Ok(())
    }
}
