use crate::core::transport::{ApiRequest, ApiResponse, RequestBody, RetryingTransport};
use crate::domain::model::ResourceKind;
use crate::domain::ports::ResourceApi;
use crate::utils::error::{Result, SetupError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

const MAX_ERROR_BODY: usize = 500;

/// *arr 系列應用的靜態描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrApp {
    pub id: &'static str,
    pub display_name: &'static str,
    pub api_version: &'static str,
    pub media_subdir: &'static str,
    pub category_field: &'static str,
}

pub const RADARR: ArrApp = ArrApp {
    id: "radarr",
    display_name: "Radarr",
    api_version: "v3",
    media_subdir: "movies",
    category_field: "movieCategory",
};

pub const SONARR: ArrApp = ArrApp {
    id: "sonarr",
    display_name: "Sonarr",
    api_version: "v3",
    media_subdir: "tv",
    category_field: "tvCategory",
};

/// 需要跨服務設定的 *arr 應用（依執行順序）
pub const MANAGED_APPS: &[ArrApp] = &[RADARR, SONARR];

pub const PROWLARR_API_VERSION: &str = "v1";

pub fn managed_app(id: &str) -> Option<&'static ArrApp> {
    MANAGED_APPS.iter().find(|app| app.id == id)
}

/// 以 X-Api-Key 驗證的 *arr REST client
pub struct ArrClient {
    service: String,
    base_url: String,
    api_version: String,
    api_key: String,
    transport: Arc<RetryingTransport>,
}

impl ArrClient {
    pub fn new(
        service: &str,
        base_url: &str,
        api_version: &str,
        api_key: &str,
        transport: Arc<RetryingTransport>,
    ) -> Self {
        Self {
            service: service.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_version: api_version.to_string(),
            api_key: api_key.to_string(),
            transport,
        }
    }

    fn resource_url(&self, kind: ResourceKind) -> Result<String> {
        let resource = match kind {
            ResourceKind::ApplicationLink => "applications",
            ResourceKind::DownloadClient => "downloadclient",
            ResourceKind::IndexerProxy => "indexerProxy",
            ResourceKind::Notification => "notification",
            ResourceKind::RootFolder => "rootfolder",
            ResourceKind::Category => {
                return Err(SetupError::Config {
                    message: format!("{} has no {} resource", self.service, kind),
                })
            }
        };
        Ok(format!("{}/api/{}/{}", self.base_url, self.api_version, resource))
    }

    fn check(&self, response: ApiResponse) -> Result<ApiResponse> {
        if response.is_success() {
            return Ok(response);
        }

        let mut body = response.text();
        if body.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|index| body.is_char_boundary(*index))
                .unwrap_or(0);
            body.truncate(cut);
            body.push_str("...");
        }

        Err(SetupError::UnexpectedStatus {
            service: self.service.clone(),
            status: response.status().as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ResourceApi for ArrClient {
    fn service(&self) -> &str {
        &self.service
    }

    async fn list(&self, kind: ResourceKind) -> Result<Vec<Value>> {
        let request = ApiRequest::get(self.resource_url(kind)?)
            .header("X-Api-Key", self.api_key.as_str())
            .header("Accept", "application/json");
        let response = self.check(self.transport.execute(request).await?)?;

        match response.json::<Value>()? {
            Value::Array(items) => Ok(items),
            other => Err(SetupError::UnexpectedStatus {
                service: self.service.clone(),
                status: response.status().as_u16(),
                body: format!("expected a JSON array, got {}", other),
            }),
        }
    }

    async fn create(&self, kind: ResourceKind, descriptor: &Value) -> Result<()> {
        let request = ApiRequest::post(self.resource_url(kind)?)
            .header("X-Api-Key", self.api_key.as_str())
            .body(RequestBody::json(descriptor)?);
        self.check(self.transport.execute(request).await?)?;
        Ok(())
    }
}
