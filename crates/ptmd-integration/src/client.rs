//! PTMD后端HTTP客户端
//!
//! 负责URL拼接、Bearer认证头、错误响应到 `PtmdError` 的映射

use ptmd_core::{PtmdError, Result};
use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, warn};

/// 后端在备份失败时通过该响应头返回错误信息
pub const ERROR_MESSAGE_HEADER: &str = "X-Error-Message";

/// HTTP客户端
#[derive(Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    /// 创建客户端，`base_url` 形如 `http://localhost:8080/api`
    pub fn new(base_url: &str, request_timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| PtmdError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 设置或清除认证token
    pub fn set_token(&self, token: Option<String>) {
        let mut current = self.token.write().unwrap_or_else(|e| e.into_inner());
        *current = token;
    }

    pub fn has_token(&self) -> bool {
        self.token.read().map(|t| t.is_some()).unwrap_or(false)
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// 添加Bearer认证头
    pub(crate) fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self.token.read().unwrap_or_else(|e| e.into_inner());
        match token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// 发送请求，非2xx响应转换为 `PtmdError::Request`
    pub(crate) async fn send(&self, request: RequestBuilder, fallback: &str) -> Result<Response> {
        let response = match self.authorized(request).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Request transport failure: {}", e);
                return Err(PtmdError::request(None, None, fallback));
            }
        };

        let status = response.status();
        debug!("{} {}", status.as_u16(), response.url().path());
        if status.is_success() {
            return Ok(response);
        }

        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(&headers, &body);
        warn!(
            "Request failed with status {}: {}",
            status.as_u16(),
            message.as_deref().unwrap_or("<no message>")
        );
        Err(PtmdError::request(Some(status.as_u16()), message, fallback))
    }

    /// 发送请求并解析JSON响应体
    pub(crate) async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, fallback: &str) -> Result<T> {
        let response = self.send(request, fallback).await?;
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            warn!("Failed to read response body: {}", e);
            PtmdError::request(Some(status.as_u16()), None, fallback)
        })?;
        serde_json::from_str(&body).map_err(|e| {
            warn!("Failed to decode {} response: {}", status.as_u16(), e);
            PtmdError::request(Some(status.as_u16()), None, fallback)
        })
    }

    /// 发送请求并忽略响应体
    pub(crate) async fn send_empty(&self, request: RequestBuilder, fallback: &str) -> Result<StatusCode> {
        let response = self.send(request, fallback).await?;
        Ok(response.status())
    }
}

/// 从错误响应中提取服务端消息
///
/// 依次尝试 `X-Error-Message` 头、JSON体的 `error` 字段、纯文本响应体
pub fn extract_error_message(headers: &HeaderMap, body: &str) -> Option<String> {
    if let Some(header) = headers
        .get(ERROR_MESSAGE_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
    {
        return Some(header.to_string());
    }

    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => map
            .get("error")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        Ok(serde_json::Value::String(text)) => Some(text),
        Ok(_) => None,
        Err(_) => Some(body.to_string()),
    }
}
