//! registry.rs
//!
//! 提供一个 `HandlerRegistry` 结构，用于维护 (name -> Arc<dyn CompletionHandler>)。
//! 通常在启动时一次性注册所有处理器，后续按名称检索即可。

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::CompletionHandlerInputData;
use crate::handler::{CompletionHandler, NodeError};
use crate::result::CompletionResult;

/// 一个简单的处理器注册表。
/// 注册只发生在启动阶段，因此不加锁。
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn CompletionHandler>>,
}

impl HandlerRegistry {
    /// 创建一个空的注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个处理器，以 `handler.name()` 作为映射的 key
    pub fn register(&mut self, handler: Arc<dyn CompletionHandler>) {
        self.handlers.insert(handler.name().to_owned(), handler);
    }

    /// 按名称获取处理器
    pub fn get(&self, name: &str) -> Option<Arc<dyn CompletionHandler>> {
        self.handlers.get(name).cloned()
    }

    /// 返回目前已注册的处理器名称列表（调试/枚举用）
    pub fn list_handlers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// 按名称找到处理器并执行
    pub async fn execute(
        &self,
        name: &str,
        data: &CompletionHandlerInputData,
    ) -> Result<CompletionResult, NodeError> {
        let handler = self
            .get(name)
            .ok_or_else(|| NodeError::ExecutionFailed(format!("No completion handler named '{name}'")))?;
        handler.execute(data).await
    }
}
