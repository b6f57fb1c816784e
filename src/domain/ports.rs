use crate::domain::model::ResourceKind;
use crate::utils::error::Result;
use async_trait::async_trait;
use serde_json::Value;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// 可列出與建立設定資源的後端 API
#[async_trait]
pub trait ResourceApi: Send + Sync {
    fn service(&self) -> &str;

    async fn list(&self, kind: ResourceKind) -> Result<Vec<Value>>;

    async fn create(&self, kind: ResourceKind, descriptor: &Value) -> Result<()>;

    fn identity_key(&self, kind: ResourceKind, resource: &Value) -> Option<String> {
        resource
            .get(kind.identity_field())
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}
