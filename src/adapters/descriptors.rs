//! 建立各種設定資源的 JSON 內容。只涵蓋建立資源所需的最少欄位。

use crate::adapters::arr::ArrApp;
use crate::config::TorrentClient;
use serde_json::{json, Value};

pub const WEBHOOK_NAME: &str = "Stack Webhook";
pub const FLARESOLVERR_PROXY_NAME: &str = "FlareSolverr";

/// Prowlarr 同步到各應用時使用的 Newznab 分類
fn sync_categories(app: &ArrApp) -> Vec<u32> {
    match app.id {
        "radarr" => vec![2000, 2010, 2020, 2030, 2040, 2045, 2050, 2060, 2070, 2080],
        "sonarr" => vec![5000, 5010, 5020, 5030, 5040, 5045, 5050, 5090],
        _ => Vec::new(),
    }
}

fn fields(pairs: Vec<(&str, Value)>) -> Value {
    Value::Array(
        pairs
            .into_iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect(),
    )
}

pub struct TorrentClientSettings<'a> {
    pub client: TorrentClient,
    pub host: &'a str,
    pub port: u16,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
}

pub fn download_client(app: &ArrApp, settings: &TorrentClientSettings<'_>) -> Value {
    let mut pairs = vec![
        ("host", json!(settings.host)),
        ("port", json!(settings.port)),
        ("useSsl", json!(false)),
        (app.category_field, json!(app.id)),
    ];
    if let Some(username) = settings.username {
        pairs.push(("username", json!(username)));
    }
    if let Some(password) = settings.password {
        pairs.push(("password", json!(password)));
    }

    let (implementation, contract) = match settings.client {
        TorrentClient::Qbittorrent => ("QBittorrent", "QBittorrentSettings"),
        TorrentClient::Transmission => {
            pairs.push(("urlBase", json!("/transmission/")));
            ("Transmission", "TransmissionSettings")
        }
    };

    json!({
        "name": settings.client.display_name(),
        "enable": true,
        "protocol": "torrent",
        "priority": 1,
        "removeCompletedDownloads": true,
        "removeFailedDownloads": true,
        "implementation": implementation,
        "configContract": contract,
        "fields": fields(pairs),
        "tags": [],
    })
}

pub fn root_folder(path: &str) -> Value {
    json!({ "path": path })
}

pub fn qbittorrent_category(name: &str, save_path: &str) -> Value {
    json!({ "name": name, "savePath": save_path })
}

pub fn application_link(app: &ArrApp, prowlarr_url: &str, app_url: &str, api_key: &str) -> Value {
    json!({
        "name": app.display_name,
        "syncLevel": "fullSync",
        "implementation": app.display_name,
        "configContract": format!("{}Settings", app.display_name),
        "fields": fields(vec![
            ("prowlarrUrl", json!(prowlarr_url)),
            ("baseUrl", json!(app_url)),
            ("apiKey", json!(api_key)),
            ("syncCategories", json!(sync_categories(app))),
        ]),
        "tags": [],
    })
}

pub fn flaresolverr_proxy(flaresolverr_url: &str) -> Value {
    json!({
        "name": FLARESOLVERR_PROXY_NAME,
        "implementation": "FlareSolverr",
        "configContract": "FlareSolverrSettings",
        "fields": fields(vec![
            ("host", json!(flaresolverr_url)),
            ("requestTimeout", json!(60)),
        ]),
        "tags": [],
    })
}

pub fn webhook_notification(url: &str) -> Value {
    json!({
        "name": WEBHOOK_NAME,
        "implementation": "Webhook",
        "configContract": "WebhookSettings",
        "onGrab": true,
        "onDownload": true,
        "onUpgrade": true,
        "onHealthIssue": true,
        "fields": fields(vec![
            ("url", json!(url)),
            ("method", json!(1)),
        ]),
        "tags": [],
    })
}
