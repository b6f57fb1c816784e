use crate::domain::ports::Storage;
use crate::utils::error::{Result, SetupError};
use regex::Regex;
use std::sync::LazyLock;

/// 會在 config.xml 內自行產生 API key 的服務
pub const SECRET_SERVICES: &[&str] = &["radarr", "sonarr", "lidarr", "readarr", "prowlarr"];

static API_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<ApiKey>\s*([^<\s]+)\s*</ApiKey>").expect("static regex"));

pub fn has_secret_source(service: &str) -> bool {
    SECRET_SERVICES.contains(&service)
}

pub fn config_xml_path(config_dir: &str, service: &str) -> String {
    format!("{}/{}/config.xml", config_dir.trim_end_matches('/'), service)
}

pub fn parse_api_key(service: &str, content: &str) -> Result<String> {
    API_KEY_RE
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|key| key.as_str().to_string())
        .ok_or_else(|| SetupError::Secret {
            service: service.to_string(),
            message: "no <ApiKey> element in config.xml".to_string(),
        })
}

/// 讀取服務啟動後寫入的 API key
pub async fn read_api_key<S: Storage>(storage: &S, config_dir: &str, service: &str) -> Result<String> {
    let path = config_xml_path(config_dir, service);
    let bytes = storage.read_file(&path).await.map_err(|e| SetupError::Secret {
        service: service.to_string(),
        message: format!("cannot read {}: {}", path, e),
    })?;

    let content = String::from_utf8(bytes).map_err(|_| SetupError::Secret {
        service: service.to_string(),
        message: format!("{} is not valid UTF-8", path),
    })?;

    parse_api_key(service, &content)
}
