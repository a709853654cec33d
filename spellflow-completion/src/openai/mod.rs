// src/openai/mod.rs

pub mod completion_params;
pub mod completion_handler;

pub use completion_handler::CompletionRequester;
pub use completion_params::{CompletionRequest, CompletionSettings};

use crate::audit::AuditRecorder;
use crate::registry::HandlerRegistry;
use std::env;
use std::sync::Arc;

/// OpenAI API 的默认地址
pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";

/// 覆盖默认地址的环境变量
pub const OPENAI_ENDPOINT_ENV: &str = "OPENAI_ENDPOINT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiConfig {
    pub endpoint: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            endpoint: OPENAI_ENDPOINT.to_string(),
        }
    }
}

impl OpenAiConfig {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    /// 先加载 .env (不存在则忽略)，再读取 `OPENAI_ENDPOINT`
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        match env::var(OPENAI_ENDPOINT_ENV) {
            Ok(endpoint) if !endpoint.trim().is_empty() => Self::new(endpoint.trim()),
            _ => Self::default(),
        }
    }

    pub fn completions_url(&self) -> String {
        format!("{}/completions", self.endpoint)
    }
}

/// 供 registry_helper 调用，以注册 OpenAI 文本补全处理器
pub fn register_handler(registry: &mut HandlerRegistry, recorder: Arc<dyn AuditRecorder>) {
    registry.register(Arc::new(CompletionRequester::from_env(recorder)));
}
