use crate::adapters::arr::{ArrApp, ArrClient, MANAGED_APPS, PROWLARR_API_VERSION};
use crate::adapters::descriptors::{self, TorrentClientSettings, FLARESOLVERR_PROXY_NAME, WEBHOOK_NAME};
use crate::adapters::patcher::{patch_file, secret_env_vars};
use crate::adapters::qbittorrent::QbittorrentClient;
use crate::adapters::secrets::{has_secret_source, read_api_key};
use crate::config::{StackConfig, TorrentClient};
use crate::core::health::{default_endpoint, HealthGate};
use crate::core::idempotent::{ensure_resource, Applied};
use crate::core::ledger::ResultLedger;
use crate::core::session::Credentials;
use crate::core::transport::RetryingTransport;
use crate::domain::model::{ActionOutcome, ResourceKind, SecretMap, ServiceHealth};
use crate::domain::ports::{ResourceApi, Storage};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub const ACTION_HEALTH: &str = "health check";
pub const ACTION_READ_SECRET: &str = "read api key";
pub const ACTION_CONFIGURE: &str = "configure";

/// 健康檢查階段的結果
#[derive(Debug, Clone)]
pub struct HealthGateReport {
    pub rounds: u32,
    pub results: Vec<ServiceHealth>,
    pub cancelled: bool,
}

impl HealthGateReport {
    pub fn all_healthy(&self) -> bool {
        self.results.iter().all(|h| h.healthy)
    }
}

/// 依固定階段設定整個 stack，每個動作各自記錄結果
pub struct SetupOrchestrator<S: Storage> {
    config: StackConfig,
    storage: S,
}

impl<S: Storage> SetupOrchestrator<S> {
    pub fn new(config: StackConfig, storage: S) -> Self {
        Self { config, storage }
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// 執行所有階段並回傳完整結果；只有取消會提前結束
    pub async fn run(&self, cancel: &CancellationToken) -> Vec<ActionOutcome> {
        let run_id = format!("setup_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S"));
        let started = Instant::now();
        let services = self.config.enabled_services();
        let mut ledger = ResultLedger::new();

        tracing::info!(
            "🚀 Starting {} for stack '{}' ({} services)",
            run_id,
            self.config.stack.name,
            services.len()
        );

        // 1. health gating
        let healthy: HashSet<String> = match self.health_gate() {
            Ok(gate) => {
                let report = self.wait_for_healthy(&gate, &services, cancel).await;
                for health in &report.results {
                    if health.healthy {
                        ledger.record_success(&health.name, ACTION_HEALTH);
                    } else {
                        let reason = health.error.as_deref().unwrap_or("not healthy");
                        ledger.record_failure(&health.name, ACTION_HEALTH, reason);
                    }
                }
                if report.cancelled {
                    tracing::warn!("🛑 {} cancelled during health gating", run_id);
                    return ledger.into_outcomes();
                }
                report
                    .results
                    .into_iter()
                    .filter(|h| h.healthy)
                    .map(|h| h.name)
                    .collect()
            }
            Err(e) => {
                for service in &services {
                    ledger.record_failure(service, ACTION_HEALTH, &e);
                }
                HashSet::new()
            }
        };

        // 2. secret extraction
        let secrets = self.extract_secrets(&services, &mut ledger).await;
        if self.stop_requested(cancel, &run_id, "secret extraction") {
            return ledger.into_outcomes();
        }

        // 3. config patching
        self.patch_config_files(&secrets, &mut ledger).await;
        if self.stop_requested(cancel, &run_id, "config patching") {
            return ledger.into_outcomes();
        }

        // 4. per-service configuration
        match self.config.retry.to_policy().and_then(RetryingTransport::new) {
            Ok(transport) => {
                let transport = Arc::new(transport.with_cancellation(cancel.child_token()));
                self.configure_services(&transport, &healthy, &secrets, cancel, &mut ledger)
                    .await;
                if self.stop_requested(cancel, &run_id, "service configuration") {
                    return ledger.into_outcomes();
                }
            }
            Err(e) => {
                ledger.record_failure(&self.config.stack.name, ACTION_CONFIGURE, &e);
            }
        }

        tracing::info!(
            "🏁 {} finished in {:?} with {} recorded actions",
            run_id,
            started.elapsed(),
            ledger.len()
        );
        ledger.into_outcomes()
    }

    fn health_gate(&self) -> crate::utils::error::Result<HealthGate> {
        HealthGate::with_timeout(
            &self.config.stack.host,
            self.config.probe_endpoints(),
            self.config.health.probe_timeout(),
        )
    }

    fn stop_requested(&self, cancel: &CancellationToken, run_id: &str, phase: &str) -> bool {
        if cancel.is_cancelled() {
            tracing::warn!("🛑 {} cancelled after {}", run_id, phase);
            return true;
        }
        false
    }

    /// 重複探測直到全部健康或用完輪數；輪與輪之間的等待可被取消
    pub async fn wait_for_healthy(
        &self,
        gate: &HealthGate,
        services: &[String],
        cancel: &CancellationToken,
    ) -> HealthGateReport {
        let rounds = self.config.health.rounds.max(1);
        let interval = self.config.health.interval();
        let mut report = HealthGateReport {
            rounds: 0,
            results: Vec::new(),
            cancelled: false,
        };

        for round in 1..=rounds {
            report.results = gate.probe_all(services).await;
            report.rounds = round;

            let waiting: Vec<&str> = report
                .results
                .iter()
                .filter(|h| !h.healthy)
                .map(|h| h.name.as_str())
                .collect();
            if waiting.is_empty() {
                tracing::info!("💚 All {} services healthy after {} round(s)", services.len(), round);
                break;
            }
            if round == rounds {
                tracing::warn!("⚠️ Still unhealthy after {} rounds: {}", rounds, waiting.join(", "));
                break;
            }

            tracing::info!(
                "⏳ Waiting {:?} for {} (round {}/{})",
                interval,
                waiting.join(", "),
                round,
                rounds
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }

        report
    }

    async fn extract_secrets(&self, services: &[String], ledger: &mut ResultLedger) -> SecretMap {
        let mut secrets = SecretMap::new();

        for service in services.iter().filter(|s| has_secret_source(s)) {
            let result = read_api_key(&self.storage, &self.config.stack.config_dir, service).await;
            match result {
                Ok(key) => {
                    ledger.record_success(service, ACTION_READ_SECRET);
                    secrets.insert(service.clone(), key);
                }
                Err(e) => ledger.record_failure(service, ACTION_READ_SECRET, e),
            }
        }

        secrets
    }

    async fn patch_config_files(&self, secrets: &SecretMap, ledger: &mut ResultLedger) {
        let values = secret_env_vars(secrets);

        for file in &self.config.stack.env_files {
            let action = format!("patch {}", file);
            match patch_file(&self.storage, file, &values).await {
                Ok(count) => {
                    tracing::debug!("{} placeholder(s) replaced in {}", count, file);
                    ledger.record_success("stack", &action);
                }
                Err(e) => ledger.record_failure("stack", &action, e),
            }
        }
    }

    async fn configure_services(
        &self,
        transport: &Arc<RetryingTransport>,
        healthy: &HashSet<String>,
        secrets: &SecretMap,
        cancel: &CancellationToken,
        ledger: &mut ResultLedger,
    ) {
        if self.config.stack.torrent_client == Some(TorrentClient::Qbittorrent) {
            self.configure_qbittorrent(transport, healthy, cancel, ledger).await;
        }

        for app in self.enabled_apps() {
            if cancel.is_cancelled() {
                return;
            }
            self.configure_arr(app, transport, healthy, secrets, cancel, ledger)
                .await;
        }

        if self.config.is_enabled("prowlarr") && !cancel.is_cancelled() {
            self.configure_prowlarr(transport, healthy, secrets, cancel, ledger)
                .await;
        }
    }

    fn enabled_apps(&self) -> impl Iterator<Item = &'static ArrApp> + '_ {
        MANAGED_APPS.iter().filter(|app| self.config.is_enabled(app.id))
    }

    /// 服務不健康時記錄一筆略過並回傳 false
    fn require_healthy(&self, service: &str, healthy: &HashSet<String>, ledger: &mut ResultLedger) -> bool {
        if healthy.contains(service) {
            return true;
        }
        ledger.record_skip(service, ACTION_CONFIGURE, format!("{} is not healthy", service));
        false
    }

    async fn configure_qbittorrent(
        &self,
        transport: &Arc<RetryingTransport>,
        healthy: &HashSet<String>,
        cancel: &CancellationToken,
        ledger: &mut ResultLedger,
    ) {
        let service = TorrentClient::Qbittorrent.service_id();
        if !self.require_healthy(service, healthy, ledger) {
            return;
        }

        let settings = self.config.qbittorrent.as_ref();
        let Some(password) = settings.and_then(|s| s.password.clone()) else {
            ledger.record_skip(service, ACTION_CONFIGURE, "no qbittorrent password configured");
            return;
        };
        let Some(base_url) = self.config.service_url(service) else {
            ledger.record_skip(service, ACTION_CONFIGURE, "no endpoint known for qbittorrent");
            return;
        };

        let credentials = Credentials {
            username: settings.map(|s| s.username.clone()).unwrap_or_else(|| "admin".to_string()),
            password,
        };
        let client = QbittorrentClient::new(&base_url, credentials, transport.clone());
        let downloads_dir = self.config.stack.downloads_dir.trim_end_matches('/');

        for app in self.enabled_apps() {
            if cancel.is_cancelled() {
                return;
            }
            let save_path = format!("{}/{}", downloads_dir, app.id);
            let result = ensure_resource(&client, ResourceKind::Category, app.id, || {
                descriptors::qbittorrent_category(app.id, &save_path)
            })
            .await;
            record_apply(ledger, &client, ResourceKind::Category, app.id, result);
        }
    }

    async fn configure_arr(
        &self,
        app: &ArrApp,
        transport: &Arc<RetryingTransport>,
        healthy: &HashSet<String>,
        secrets: &SecretMap,
        cancel: &CancellationToken,
        ledger: &mut ResultLedger,
    ) {
        if !self.require_healthy(app.id, healthy, ledger) {
            return;
        }
        let Some(api_key) = secrets.get(app.id) else {
            ledger.record_skip(app.id, ACTION_CONFIGURE, format!("no API key extracted for {}", app.id));
            return;
        };
        let Some(base_url) = self.config.service_url(app.id) else {
            ledger.record_skip(app.id, ACTION_CONFIGURE, format!("no endpoint known for {}", app.id));
            return;
        };

        let client = ArrClient::new(app.id, &base_url, app.api_version, api_key, transport.clone());

        if let Some(torrent_client) = self.config.stack.torrent_client {
            let host = torrent_client.service_id();
            let port = default_endpoint(host).map(|e| e.port).unwrap_or_default();
            let qbit = self.config.qbittorrent.as_ref();
            let use_credentials = torrent_client == TorrentClient::Qbittorrent;
            let settings = TorrentClientSettings {
                client: torrent_client,
                host,
                port,
                username: qbit.filter(|_| use_credentials).map(|q| q.username.as_str()),
                password: qbit
                    .filter(|_| use_credentials)
                    .and_then(|q| q.password.as_deref()),
            };
            let name = torrent_client.display_name();
            if cancel.is_cancelled() {
                return;
            }
            let result = ensure_resource(&client, ResourceKind::DownloadClient, name, || {
                descriptors::download_client(app, &settings)
            })
            .await;
            record_apply(ledger, &client, ResourceKind::DownloadClient, name, result);
        }

        if cancel.is_cancelled() {
            return;
        }
        let root = format!("{}/{}", self.config.stack.media_dir.trim_end_matches('/'), app.media_subdir);
        let result = ensure_resource(&client, ResourceKind::RootFolder, &root, || {
            descriptors::root_folder(&root)
        })
        .await;
        record_apply(ledger, &client, ResourceKind::RootFolder, &root, result);

        if let Some(url) = self.config.webhook_url().filter(|_| !cancel.is_cancelled()) {
            let result = ensure_resource(&client, ResourceKind::Notification, WEBHOOK_NAME, || {
                descriptors::webhook_notification(url)
            })
            .await;
            record_apply(ledger, &client, ResourceKind::Notification, WEBHOOK_NAME, result);
        }
    }

    async fn configure_prowlarr(
        &self,
        transport: &Arc<RetryingTransport>,
        healthy: &HashSet<String>,
        secrets: &SecretMap,
        cancel: &CancellationToken,
        ledger: &mut ResultLedger,
    ) {
        let service = "prowlarr";
        if !self.require_healthy(service, healthy, ledger) {
            return;
        }
        let Some(api_key) = secrets.get(service) else {
            ledger.record_skip(service, ACTION_CONFIGURE, "no API key extracted for prowlarr");
            return;
        };
        let (Some(base_url), Some(prowlarr_url)) =
            (self.config.service_url(service), self.config.internal_url(service))
        else {
            ledger.record_skip(service, ACTION_CONFIGURE, "no endpoint known for prowlarr");
            return;
        };

        let client = ArrClient::new(service, &base_url, PROWLARR_API_VERSION, api_key, transport.clone());

        for app in self.enabled_apps() {
            if cancel.is_cancelled() {
                return;
            }
            let action = format!("link {}", app.id);
            let Some(app_key) = secrets.get(app.id) else {
                ledger.record_skip(service, &action, format!("no API key extracted for {}", app.id));
                continue;
            };
            let app_url = self.config.internal_url(app.id).unwrap_or_default();
            let result = ensure_resource(&client, ResourceKind::ApplicationLink, app.display_name, || {
                descriptors::application_link(app, &prowlarr_url, &app_url, app_key)
            })
            .await;
            ledger.record(service, &action, &result);
        }

        if self.config.is_enabled("flaresolverr") && !cancel.is_cancelled() {
            let flaresolverr_url = format!(
                "{}/",
                self.config.internal_url("flaresolverr").unwrap_or_default()
            );
            let result = ensure_resource(
                &client,
                ResourceKind::IndexerProxy,
                FLARESOLVERR_PROXY_NAME,
                || descriptors::flaresolverr_proxy(&flaresolverr_url),
            )
            .await;
            record_apply(ledger, &client, ResourceKind::IndexerProxy, FLARESOLVERR_PROXY_NAME, result);
        }
    }
}

fn record_apply<A: ResourceApi + ?Sized>(
    ledger: &mut ResultLedger,
    api: &A,
    kind: ResourceKind,
    identity: &str,
    result: crate::utils::error::Result<Applied>,
) {
    let action = format!("ensure {} {}", kind, identity);
    ledger.record(api.service(), &action, &result);
}

