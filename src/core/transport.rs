use crate::domain::model::RetryPolicy;
use crate::utils::error::Result;
use rand::Rng;
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// 抖動上限：延遲的 20%
pub const MAX_JITTER_FRACTION: f64 = 0.2;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error on {target}: {source}")]
    Network {
        target: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{target} answered HTTP {status}")]
    Status { target: String, status: u16 },

    #[error("gave up on {target} after {attempts} attempts: {last}")]
    RetryExhausted {
        target: String,
        attempts: u32,
        #[source]
        last: Box<TransportError>,
    },

    #[error("request body for {target} was already sent and cannot be replayed")]
    BodyNotReplayable { target: String },

    #[error("request to {target} cancelled")]
    Cancelled { target: String },
}

pub type BodyFactory = Arc<dyn Fn() -> Vec<u8> + Send + Sync>;

/// 請求內容。重試時必須能重新產生，否則直接失敗而不是重送殘缺的資料
#[derive(Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Replayable {
        content_type: &'static str,
        factory: BodyFactory,
    },
    /// 只能送出一次；clone 之間共用同一份資料
    Once {
        content_type: &'static str,
        bytes: Arc<Mutex<Option<Vec<u8>>>>,
    },
}

impl RequestBody {
    pub fn replayable<F>(content_type: &'static str, factory: F) -> Self
    where
        F: Fn() -> Vec<u8> + Send + Sync + 'static,
    {
        RequestBody::Replayable {
            content_type,
            factory: Arc::new(factory),
        }
    }

    pub fn once(content_type: &'static str, bytes: Vec<u8>) -> Self {
        RequestBody::Once {
            content_type,
            bytes: Arc::new(Mutex::new(Some(bytes))),
        }
    }

    pub fn json<T: Serialize + ?Sized>(payload: &T) -> std::result::Result<Self, serde_json::Error> {
        let bytes = serde_json::to_vec(payload)?;
        Ok(Self::replayable("application/json", move || bytes.clone()))
    }

    pub fn form(pairs: &[(&str, &str)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs.iter())
            .finish();
        Self::replayable("application/x-www-form-urlencoded", move || {
            encoded.clone().into_bytes()
        })
    }

    pub fn is_replayable(&self) -> bool {
        !matches!(self, RequestBody::Once { .. })
    }

    /// 產生本次要送出的內容；`None` 代表一次性內容已被用掉
    fn produce(&self) -> Option<Option<(&'static str, Vec<u8>)>> {
        match self {
            RequestBody::Empty => Some(None),
            RequestBody::Replayable {
                content_type,
                factory,
            } => Some(Some((*content_type, factory()))),
            RequestBody::Once {
                content_type,
                bytes,
            } => {
                let taken = bytes.lock().ok().and_then(|mut slot| slot.take())?;
                Some(Some((*content_type, taken)))
            }
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Replayable { content_type, .. } => {
                write!(f, "Replayable({})", content_type)
            }
            RequestBody::Once { content_type, .. } => write!(f, "Once({})", content_type),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn request_body(&self) -> &RequestBody {
        &self.body
    }

    pub fn is_read_only(&self) -> bool {
        is_read_only_method(&self.method)
    }

    pub fn target(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ApiResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// 所有後端 client 共用的重試 HTTP 傳輸層
#[derive(Debug, Clone)]
pub struct RetryingTransport {
    client: Client,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryingTransport {
    pub fn new(policy: RetryPolicy) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self::with_client(client, policy))
    }

    pub fn with_client(client: Client, policy: RetryPolicy) -> Self {
        Self {
            client,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// 重試之間的等待會與此 token 競速
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn execute(&self, request: ApiRequest) -> std::result::Result<ApiResponse, TransportError> {
        let target = request.target();
        let read_only = request.is_read_only();
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 1;

        loop {
            if self.cancel.is_cancelled() {
                return Err(TransportError::Cancelled {
                    target: target.clone(),
                });
            }

            let body = request
                .body
                .produce()
                .ok_or_else(|| TransportError::BodyNotReplayable {
                    target: target.clone(),
                })?;

            let (failure, retry_after) = match self.send_once(&request, body).await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if !is_retryable_status(status, read_only) {
                        return Ok(response);
                    }
                    let retry_after = parse_retry_after(response.headers());
                    (
                        TransportError::Status {
                            target: target.clone(),
                            status,
                        },
                        retry_after,
                    )
                }
                Err(source) => (
                    TransportError::Network {
                        target: target.clone(),
                        source,
                    },
                    None,
                ),
            };

            if attempt >= max_attempts {
                tracing::warn!("⛔ {} failed after {} attempts: {}", target, attempt, failure);
                return Err(TransportError::RetryExhausted {
                    target,
                    attempts: attempt,
                    last: Box::new(failure),
                });
            }

            if !request.body.is_replayable() {
                tracing::warn!("⛔ {} failed and its body cannot be resent: {}", target, failure);
                return Err(TransportError::BodyNotReplayable { target });
            }

            attempt += 1;
            let delay = retry_delay(&self.policy, attempt, retry_after);
            tracing::warn!(
                "🔁 {} failed ({}); attempt {}/{} in {:?}",
                target,
                failure,
                attempt,
                max_attempts,
                delay
            );
            self.pause(delay, &target).await?;
        }
    }

    async fn send_once(
        &self,
        request: &ApiRequest,
        body: Option<(&'static str, Vec<u8>)>,
    ) -> std::result::Result<ApiResponse, reqwest::Error> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .timeout(self.policy.request_timeout());

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some((content_type, bytes)) = body {
            builder = builder.header(CONTENT_TYPE, content_type).body(bytes);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        tracing::debug!("{} -> {}", request.target(), status);
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }

    async fn pause(&self, delay: Duration, target: &str) -> std::result::Result<(), TransportError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(TransportError::Cancelled {
                target: target.to_string(),
            }),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

pub fn is_read_only_method(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD || *method == Method::OPTIONS
}

/// 寫入類請求只重試 429：寫入可能已部分生效，重送有重複副作用的風險
pub fn is_retryable_status(status: u16, read_only: bool) -> bool {
    match status {
        429 => true,
        500 | 502 | 503 | 504 => read_only,
        _ => false,
    }
}

/// 第 k 次嘗試（k > 1）前的基本延遲：min(base * 2^(k-2), max)
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    if attempt <= 1 {
        return Duration::ZERO;
    }
    let exponent = (attempt - 2).min(31);
    policy
        .base_delay()
        .saturating_mul(1u32 << exponent)
        .min(policy.max_delay())
}

pub fn apply_jitter(delay: Duration, fraction: f64) -> Duration {
    delay + delay.mul_f64(fraction.clamp(0.0, MAX_JITTER_FRACTION))
}

pub fn retry_delay(policy: &RetryPolicy, attempt: u32, retry_after: Option<Duration>) -> Duration {
    let fraction = rand::thread_rng().gen_range(0.0..=MAX_JITTER_FRACTION);
    let computed = apply_jitter(backoff_delay(policy, attempt), fraction);
    retry_after.map_or(computed, |server_hint| computed.max(server_hint))
}

/// 只支援秒數格式的 Retry-After
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
