use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::transport::{CompletionTransport, TransportError, TransportRequest, TransportResponse};

/// 基于 reqwest 的传输层：
/// - 发送 JSON POST
/// - 非 2xx 视为错误
/// - 把响应体解析为 JSON
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 复用调用方已有的 client (连接池、代理等)
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CompletionTransport for ReqwestTransport {
    async fn post_json(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        // 1) 组装请求
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        // 2) 发送
        let resp = builder
            .json(&request.body)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = resp.status();
        debug!("POST {} -> {}", request.url, status);

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                code: status.as_u16(),
                body,
            });
        }

        // 3) 解析 JSON
        let body: Value = resp
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        Ok(TransportResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }
}
