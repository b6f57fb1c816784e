use crate::core::transport::{ApiRequest, ApiResponse, RequestBody, RetryingTransport};
use crate::utils::error::{Result, SetupError};
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::StatusCode;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default)]
struct SessionState {
    logged_in: bool,
    cookie: Option<String>,
}

/// Cookie 型 session 的登入守門員。
///
/// 每個 client 擁有自己的 guard；並行呼叫者透過鎖序列化登入。
/// 收到 403 時只重新登入並重試一次，避免帳密錯誤時無限循環。
pub struct SessionGuard {
    service: String,
    login_url: String,
    referer: String,
    credentials: Credentials,
    transport: Arc<RetryingTransport>,
    state: Mutex<SessionState>,
}

impl SessionGuard {
    pub fn new(
        service: &str,
        base_url: &str,
        login_path: &str,
        credentials: Credentials,
        transport: Arc<RetryingTransport>,
    ) -> Self {
        let base_url = base_url.trim_end_matches('/');
        Self {
            service: service.to_string(),
            login_url: format!("{}/{}", base_url, login_path.trim_start_matches('/')),
            referer: base_url.to_string(),
            credentials,
            transport,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub async fn is_logged_in(&self) -> bool {
        self.state.lock().await.logged_in
    }

    /// 確保已登入並回傳目前的 session cookie
    pub async fn ensure_logged_in(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        if let (true, Some(cookie)) = (state.logged_in, state.cookie.as_ref()) {
            return Ok(cookie.clone());
        }

        let cookie = self.login().await?;
        state.logged_in = true;
        state.cookie = Some(cookie.clone());
        Ok(cookie)
    }

    pub async fn do_authenticated(&self, request: ApiRequest) -> Result<ApiResponse> {
        let cookie = self.ensure_logged_in().await?;
        let response = self
            .transport
            .execute(request.clone().header(COOKIE.as_str(), cookie.as_str()))
            .await?;

        if response.status() != StatusCode::FORBIDDEN {
            return Ok(response);
        }

        if !request.request_body().is_replayable() {
            tracing::warn!(
                "🔒 {} rejected the session for {}, body cannot be replayed",
                self.service,
                request.target()
            );
            return Ok(response);
        }

        tracing::info!("🔑 {} session expired, logging in again", self.service);
        let fresh = self.relogin(&cookie).await?;

        // 第二次 403 直接交回呼叫者
        let response = self
            .transport
            .execute(request.header(COOKIE.as_str(), fresh.as_str()))
            .await?;
        Ok(response)
    }

    async fn relogin(&self, stale_cookie: &str) -> Result<String> {
        let mut state = self.state.lock().await;

        // 其他呼叫者已經換過 session
        if let (true, Some(cookie)) = (state.logged_in, state.cookie.as_ref()) {
            if cookie != stale_cookie {
                return Ok(cookie.clone());
            }
        }

        state.logged_in = false;
        state.cookie = None;

        let cookie = self.login().await?;
        state.logged_in = true;
        state.cookie = Some(cookie.clone());
        Ok(cookie)
    }

    async fn login(&self) -> Result<String> {
        tracing::debug!("Logging in to {} as {}", self.service, self.credentials.username);

        let request = ApiRequest::post(self.login_url.as_str())
            .header("Referer", self.referer.as_str())
            .body(RequestBody::form(&[
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ]));
        let response = self.transport.execute(request).await?;

        if !response.is_success() {
            return Err(SetupError::LoginRejected {
                service: self.service.clone(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        session_cookie(&response).ok_or_else(|| SetupError::LoginRejected {
            service: self.service.clone(),
            reason: format!("no session cookie in response ({})", response.text().trim()),
        })
    }
}

/// 取出第一個 Set-Cookie 的 `name=value` 部分
fn session_cookie(response: &ApiResponse) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .map(str::trim)
        .find(|pair| pair.contains('=') && !pair.ends_with('='))
        .map(str::to_string)
}
