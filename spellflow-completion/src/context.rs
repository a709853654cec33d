use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::handler::NodeError;
use crate::secrets::Secrets;

/// 输入槽位名称：prompt 取自该槽位的第一个值
pub const PROMPT_INPUT: &str = "input";

pub type NodeId = i64;

/// 节点上可配置的补全参数，全部可选。
/// 数值字段保留原始 JSON，编辑器可能存的是数字也可能是字符串。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompletionNodeData {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<Value>,
    #[serde(default)]
    pub max_tokens: Option<Value>,
    #[serde(default)]
    pub top_p: Option<Value>,
    #[serde(default)]
    pub frequency_penalty: Option<Value>,
    #[serde(default)]
    pub presence_penalty: Option<Value>,
    #[serde(default)]
    pub stop: Option<Value>,
}

/// 调用补全的节点：唯一标识 + 节点配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpellNode {
    pub id: NodeId,
    #[serde(default)]
    pub data: CompletionNodeData,
}

impl SpellNode {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            data: CompletionNodeData::default(),
        }
    }

    /// 设置模型名称
    pub fn with_model(mut self, model: &str) -> Self {
        self.data.model = Some(model.to_string());
        self
    }

    /// 设置节点配置
    pub fn with_data(mut self, data: CompletionNodeData) -> Self {
        self.data = data;
        self
    }
}

/// 当前模块的上下文，只关心 secrets
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModuleContext {
    #[serde(default)]
    pub secrets: Option<Secrets>,
}

/// 执行上下文：所属项目、发起调用的 spell、模块信息
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpellContext {
    pub project_id: String,
    /// spell 的标识或引用，本组件不解析
    #[serde(default)]
    pub current_spell: Value,
    #[serde(default)]
    pub module: ModuleContext,
}

impl SpellContext {
    pub fn new(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            ..Default::default()
        }
    }

    pub fn with_spell(mut self, spell: Value) -> Self {
        self.current_spell = spell;
        self
    }

    pub fn with_secrets(mut self, secrets: Secrets) -> Self {
        self.module.secrets = Some(secrets);
        self
    }
}

/// 引擎交给补全处理器的完整输入
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionHandlerInputData {
    pub node: SpellNode,
    #[serde(default)]
    pub inputs: HashMap<String, Vec<Value>>,
    #[serde(default)]
    pub context: SpellContext,
}

impl CompletionHandlerInputData {
    pub fn new(node: SpellNode) -> Self {
        Self {
            node,
            inputs: HashMap::new(),
            context: SpellContext::default(),
        }
    }

    /// 向槽位追加一个值
    pub fn with_input(mut self, slot: &str, value: Value) -> Self {
        self.inputs.entry(slot.to_string()).or_default().push(value);
        self
    }

    pub fn with_context(mut self, context: SpellContext) -> Self {
        self.context = context;
        self
    }

    /// `inputs["input"][0]`
    /// - 槽位缺失：返回 `InvalidInput`
    /// - 槽位为空：返回 `Ok(None)`，请求体中不带 prompt
    pub fn prompt(&self) -> Result<Option<&Value>, NodeError> {
        let values = self.inputs.get(PROMPT_INPUT).ok_or_else(|| {
            NodeError::InvalidInput(format!("input slot '{PROMPT_INPUT}' is missing"))
        })?;
        Ok(values.first())
    }
}
