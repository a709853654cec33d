// spellflow-completion/src/registry_helper.rs

use crate::audit::AuditRecorder;
use crate::openai;
use crate::registry::HandlerRegistry;
use std::sync::Arc;

/// 一次性注册所有补全处理器，所有处理器共用同一个 recorder。
pub fn register_all_handlers(registry: &mut HandlerRegistry, recorder: Arc<dyn AuditRecorder>) {
    openai::register_handler(registry, recorder);
}
