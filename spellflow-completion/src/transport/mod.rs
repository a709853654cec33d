// src/transport/mod.rs
//! 补全发出的唯一一次 HTTP 调用，抽象为 trait，测试时可替换为 mock。

pub mod reqwest_transport;

pub use reqwest_transport::ReqwestTransport;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// 一次 JSON POST 请求
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub url: String,
    /// 按发送顺序排列的 (name, value)
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl TransportRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// 2xx 响应
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub body: Value,
}

/// `Display` 就是返回给调用方的 error 文本
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("{0}")]
    Request(String),

    /// `body` 是响应体原文，只写进日志
    #[error("Request failed with status code {code}")]
    Status { code: u16, body: String },

    #[error("Invalid JSON response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn post_json(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}
