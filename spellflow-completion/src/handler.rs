//! handler.rs
//!
//! 定义所有补全处理器共同遵循的核心接口(`CompletionHandler`)，以及执行过程中使用的错误类型。

use async_trait::async_trait;
use thiserror::Error;

use crate::context::CompletionHandlerInputData;
use crate::result::CompletionResult;

/// 处理器执行过程中可能发生的错误类型：
/// - `InvalidConfig`: 配置缺失 (比如 secrets)；
/// - `InvalidInput`: 输入槽位缺失或为空；
/// - `MalformedResponse`: 上游返回的 JSON 缺少必要字段；
/// - `ExecutionFailed`: 调度层面的故障 (比如找不到处理器)。
///
/// 网络错误不在此列：它们会被转换成 `CompletionResult::failed`。
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

/// 描述一个补全 provider 的元数据，供编辑器生成模型下拉框等。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescription {
    /// 补全类型，例如 "text"
    pub type_: String,
    pub subtype: String,
    /// 支持的模型列表
    pub models: Vec<String>,
}

/// 所有补全处理器必须实现的核心 Trait。
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    /// 处理器的内在标识 (比如 "openai_text_completion")，用于注册与检索。
    fn name(&self) -> &str;

    /// UI要显示的名称。
    fn display_name(&self) -> &str;

    /// 可选：provider 元数据。默认返回 None。
    fn description(&self) -> Option<ProviderDescription> {
        None
    }

    /// 执行一次补全。
    ///
    /// `Ok` 里可能是成功或软失败；`Err` 表示调用被拒绝。
    async fn execute(
        &self,
        data: &CompletionHandlerInputData,
    ) -> Result<CompletionResult, NodeError>;
}
