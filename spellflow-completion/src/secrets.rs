//! secrets.rs
//!
//! 按项目划分的凭据查询。

use derivative::Derivative;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// OpenAI 处理器读取 API key 所用的 secret 名称
pub const OPENAI_API_KEY: &str = "openai_api_key";

/// 项目 secrets 的只读视图，生命周期由调用方管理。
pub trait SecretLookup: Send + Sync {
    /// 空值视为缺失。
    fn secret(&self, name: &str) -> Option<&str>;
}

impl SecretLookup for HashMap<String, String> {
    fn secret(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }
}

/// 挂在 spell 模块上下文上的 secrets。
/// `Debug` 输出中不会出现任何值。
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq, Derivative)]
#[derivative(Debug)]
#[serde(transparent)]
pub struct Secrets {
    #[derivative(Debug = "ignore")]
    values: HashMap<String, String>,
}

impl Secrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.values.insert(name.to_owned(), value.to_owned());
        self
    }
}

impl From<HashMap<String, String>> for Secrets {
    fn from(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

impl SecretLookup for Secrets {
    fn secret(&self, name: &str) -> Option<&str> {
        self.values.secret(name)
    }
}
