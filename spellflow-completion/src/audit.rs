//! audit.rs
//!
//! 每次拿到响应的补全调用都会生成一条 `AuditRecord`，交给外部的 `AuditRecorder`。
//! 持久化由调用方负责；这里只提供内存版和 tracing 版两个实现。

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::context::NodeId;

pub const COMPLETION_TYPE: &str = "completion";
pub const OPENAI_PROVIDER: &str = "openai";

/// 一次补全请求的审计记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub project_id: String,
    pub request_data: String,
    pub response_data: String,
    /// 发起请求前的时间戳 (毫秒)
    pub start_time: i64,
    pub status_code: u16,
    pub status: String,
    pub model: Option<String>,
    pub parameters: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub provider: String,
    /// 上游没给出 `usage.total_tokens` 时为 None
    pub total_tokens: Option<u64>,
    pub hidden: bool,
    pub processed: bool,
    pub spell: Value,
    pub node_id: NodeId,
}

/// 审计记录的接收方。fire-and-forget：不返回结果，失败由实现自己处理。
pub trait AuditRecorder: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// 把记录保存在内存中，测试和本地调试用
#[derive(Debug, Default)]
pub struct MemoryAuditRecorder {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回目前已记录的副本
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl AuditRecorder for MemoryAuditRecorder {
    fn record(&self, record: AuditRecord) {
        self.records.lock().push(record);
    }
}

/// 以结构化日志的形式输出记录
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditRecorder;

impl AuditRecorder for TracingAuditRecorder {
    fn record(&self, record: AuditRecord) {
        info!(
            target: "spellflow::audit",
            project_id = %record.project_id,
            node_id = record.node_id,
            model = record.model.as_deref().unwrap_or(""),
            provider = %record.provider,
            type_ = %record.type_,
            status_code = record.status_code,
            total_tokens = ?record.total_tokens,
            start_time = record.start_time,
            "completion request recorded"
        );
    }
}
