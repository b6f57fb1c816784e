use crate::domain::model::ResourceKind;
use crate::domain::ports::ResourceApi;
use crate::utils::error::Result;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    AlreadyPresent,
    Created,
}

/// list → 依識別欄位比對 → 不存在才 create
pub async fn ensure_resource<A, F>(
    api: &A,
    kind: ResourceKind,
    identity: &str,
    descriptor: F,
) -> Result<Applied>
where
    A: ResourceApi + ?Sized,
    F: FnOnce() -> Value,
{
    let existing = api.list(kind).await?;
    let present = existing.iter().any(|resource| {
        api.identity_key(kind, resource)
            .is_some_and(|key| same_identity(&key, identity))
    });

    if present {
        tracing::info!(
            "⏭️ {} '{}' already exists on {}, nothing to do",
            kind,
            identity,
            api.service()
        );
        return Ok(Applied::AlreadyPresent);
    }

    api.create(kind, &descriptor()).await?;
    tracing::info!("➕ Created {} '{}' on {}", kind, identity, api.service());
    Ok(Applied::Created)
}

/// 名稱不分大小寫；路徑忽略結尾斜線
fn same_identity(existing: &str, expected: &str) -> bool {
    let normalize = |value: &str| {
        let trimmed = value.trim();
        if trimmed.len() > 1 {
            trimmed.trim_end_matches('/').to_lowercase()
        } else {
            trimmed.to_lowercase()
        }
    };
    normalize(existing) == normalize(expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::SetupError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct FakeApi {
        resources: Mutex<Vec<Value>>,
        creates: Mutex<usize>,
        fail_list: bool,
    }

    impl FakeApi {
        fn with(resources: Vec<Value>) -> Self {
            Self {
                resources: Mutex::new(resources),
                creates: Mutex::new(0),
                fail_list: false,
            }
        }

        fn creates(&self) -> usize {
            *self.creates.lock().unwrap()
        }
    }

    #[async_trait]
    impl ResourceApi for FakeApi {
        fn service(&self) -> &str {
            "fake"
        }

        async fn list(&self, _kind: ResourceKind) -> Result<Vec<Value>> {
            if self.fail_list {
                return Err(SetupError::UnexpectedStatus {
                    service: "fake".to_string(),
                    status: 500,
                    body: String::new(),
                });
            }
            Ok(self.resources.lock().unwrap().clone())
        }

        async fn create(&self, _kind: ResourceKind, descriptor: &Value) -> Result<()> {
            *self.creates.lock().unwrap() += 1;
            self.resources.lock().unwrap().push(descriptor.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_creates_when_absent_then_noop() {
        let api = FakeApi::with(vec![json!({"name": "Transmission"})]);

        let first = ensure_resource(&api, ResourceKind::DownloadClient, "qBittorrent", || {
            json!({"name": "qBittorrent"})
        })
        .await
        .unwrap();
        let second = ensure_resource(&api, ResourceKind::DownloadClient, "qBittorrent", || {
            json!({"name": "qBittorrent"})
        })
        .await
        .unwrap();

        assert_eq!(first, Applied::Created);
        assert_eq!(second, Applied::AlreadyPresent);
        assert_eq!(api.creates(), 1);
    }

    #[tokio::test]
    async fn test_root_folders_match_on_path() {
        let api = FakeApi::with(vec![json!({"id": 1, "path": "/data/media/movies/"})]);

        let applied = tokio_test::assert_ok!(
            ensure_resource(&api, ResourceKind::RootFolder, "/data/media/movies", || {
                json!({"path": "/data/media/movies"})
            })
            .await
        );

        assert_eq!(applied, Applied::AlreadyPresent);
        assert_eq!(api.creates(), 0);
    }

    #[tokio::test]
    async fn test_list_failure_prevents_create() {
        let mut api = FakeApi::with(vec![]);
        api.fail_list = true;

        let result = ensure_resource(&api, ResourceKind::ApplicationLink, "Radarr", || {
            json!({"name": "Radarr"})
        })
        .await;

        tokio_test::assert_err!(result);
        assert_eq!(api.creates(), 0);
    }

    #[test]
    fn test_same_identity() {
        assert!(same_identity("qBittorrent", "qbittorrent"));
        assert!(same_identity("/tv/", "/tv"));
        assert!(same_identity("/", "/"));
        assert!(!same_identity("Radarr", "Sonarr"));
    }
}
