// src/openai/completion_handler.rs

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditRecord, AuditRecorder, COMPLETION_TYPE, OPENAI_PROVIDER};
use crate::context::CompletionHandlerInputData;
use crate::handler::{CompletionHandler, NodeError, ProviderDescription};
use crate::openai::completion_params::CompletionRequest;
use crate::openai::OpenAiConfig;
use crate::result::CompletionResult;
use crate::secrets::{SecretLookup, OPENAI_API_KEY};
use crate::transport::{CompletionTransport, ReqwestTransport, TransportError, TransportRequest};

pub const NO_CHOICES_ERROR: &str = "No choices returned";

const TEXT_COMPLETION_MODELS: &[&str] = &[
    "gpt-3.5-turbo-instruct",
    "text-davinci-003",
    "text-davinci-002",
    "text-curie-001",
    "text-babbage-001",
    "text-ada-001",
];

/// CompletionRequester 调用 OpenAI `/completions` 接口完成一次文本补全。
/// 它从节点配置构造请求体，把结果交给 AuditRecorder 记录，
/// 并把第一个 choice 映射为 `CompletionResult`。
///
/// 只持有不可变配置和 `Arc`，可以在多个任务间共享。
pub struct CompletionRequester {
    config: OpenAiConfig,
    transport: Arc<dyn CompletionTransport>,
    recorder: Arc<dyn AuditRecorder>,
}

impl CompletionRequester {
    pub fn new(
        config: OpenAiConfig,
        transport: Arc<dyn CompletionTransport>,
        recorder: Arc<dyn AuditRecorder>,
    ) -> Self {
        Self {
            config,
            transport,
            recorder,
        }
    }

    /// 使用环境配置和 reqwest 传输层
    pub fn from_env(recorder: Arc<dyn AuditRecorder>) -> Self {
        Self::new(
            OpenAiConfig::from_env(),
            Arc::new(ReqwestTransport::new()),
            recorder,
        )
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    pub async fn execute(
        &self,
        data: &CompletionHandlerInputData,
    ) -> Result<CompletionResult, NodeError> {
        let node = &data.node;
        let context = &data.context;

        // 1) 取 prompt 并构造请求体；槽位为空时请求体不带 prompt
        let prompt = data.prompt()?.cloned();
        let request = CompletionRequest::from_node_data(&node.data, prompt);

        // 2) secrets 必须存在，缺失时直接拒绝，不发请求
        let secrets = context
            .module
            .secrets
            .as_ref()
            .ok_or_else(|| NodeError::InvalidConfig("ERROR: No secrets found".into()))?;

        // 3) 请求头；没有 key 时照样发送 "Bearer null"
        let api_key = secrets.secret(OPENAI_API_KEY).unwrap_or("null");
        let headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Authorization".to_string(), format!("Bearer {api_key}")),
        ];

        let body = serde_json::to_value(&request)
            .map_err(|e| NodeError::InvalidInput(format!("Request serialization error: {e}")))?;
        let request_data = body.to_string();

        debug!(
            node_id = node.id,
            model = request.model.as_deref().unwrap_or(""),
            prompt_len = request.prompt.as_ref().and_then(serde_json::Value::as_str).map(str::len).unwrap_or_default(),
            "sending text completion request"
        );

        // 4) 发起请求
        let start = Utc::now().timestamp_millis();
        let resp = match self
            .transport
            .post_json(TransportRequest {
                url: self.config.completions_url(),
                headers,
                body,
            })
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                match &e {
                    TransportError::Status { code, body } => {
                        error!("text completion for node {} got status {}: {}", node.id, code, body)
                    }
                    _ => error!("text completion request failed for node {}: {}", node.id, e),
                }
                return Ok(CompletionResult::failed(e.to_string()));
            }
        };

        // 5) usage 必须存在；usage.total_tokens 缺失或不是整数时记录为 None
        let usage = resp
            .body
            .get("usage")
            .filter(|u| !u.is_null())
            .ok_or_else(|| NodeError::MalformedResponse("Completion response has no usage".into()))?;
        let total_tokens = usage.get("total_tokens").and_then(Value::as_u64);

        // 6) 记录本次请求
        self.recorder.record(AuditRecord {
            project_id: context.project_id.clone(),
            request_data: request_data.clone(),
            response_data: resp.body.to_string(),
            start_time: start,
            status_code: resp.status,
            status: resp.status_text.clone(),
            model: request.model.clone(),
            parameters: request_data,
            type_: COMPLETION_TYPE.to_string(),
            provider: OPENAI_PROVIDER.to_string(),
            total_tokens,
            hidden: false,
            processed: false,
            spell: context.current_spell.clone(),
            node_id: node.id,
        });

        // 7) 取第一个 choice
        let first_choice = resp
            .body
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first());
        match first_choice {
            Some(choice) => {
                let text = choice.get("text").and_then(Value::as_str).map(str::to_owned);
                info!(
                    node_id = node.id,
                    total_tokens = ?total_tokens,
                    text_len = text.as_deref().map(str::len).unwrap_or_default(),
                    "text completion succeeded"
                );
                Ok(CompletionResult::ok(text))
            }
            None => {
                warn!("text completion for node {} returned no choices", node.id);
                Ok(CompletionResult::failed(NO_CHOICES_ERROR))
            }
        }
    }
}

#[async_trait]
impl CompletionHandler for CompletionRequester {
    fn name(&self) -> &str {
        "openai_text_completion"
    }

    fn display_name(&self) -> &str {
        "OpenAI Text Completion"
    }

    fn description(&self) -> Option<ProviderDescription> {
        Some(ProviderDescription {
            type_: "text".to_string(),
            subtype: "text".to_string(),
            models: TEXT_COMPLETION_MODELS.iter().map(|m| m.to_string()).collect(),
        })
    }

    async fn execute(
        &self,
        data: &CompletionHandlerInputData,
    ) -> Result<CompletionResult, NodeError> {
        CompletionRequester::execute(self, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditRecorder;
    use crate::context::{SpellContext, SpellNode};
    use crate::secrets::Secrets;
    use crate::transport::{TransportError, TransportResponse};
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    /// 记录所有请求，并返回预设结果的传输层
    struct SpyTransport {
        reply: Result<TransportResponse, TransportError>,
        requests: Mutex<Vec<TransportRequest>>,
    }

    impl SpyTransport {
        fn replying(body: Value) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(TransportResponse {
                    status: 200,
                    status_text: "OK".into(),
                    body,
                }),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing(err: TransportError) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(err),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<TransportRequest> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl CompletionTransport for SpyTransport {
        async fn post_json(
            &self,
            request: TransportRequest,
        ) -> Result<TransportResponse, TransportError> {
            self.requests.lock().push(request);
            self.reply.clone()
        }
    }

    fn requester(
        transport: Arc<SpyTransport>,
        recorder: Arc<MemoryAuditRecorder>,
    ) -> CompletionRequester {
        CompletionRequester::new(OpenAiConfig::new("http://mock.local/v1"), transport, recorder)
    }

    fn input(secrets: Option<Secrets>) -> CompletionHandlerInputData {
        let mut context = SpellContext::new("proj-1").with_spell(json!("spell-a"));
        context.module.secrets = secrets;
        CompletionHandlerInputData::new(SpellNode::new(7).with_model("text-davinci-003"))
            .with_input("input", json!("Say hello"))
            .with_context(context)
    }

    fn with_key() -> Option<Secrets> {
        Some(Secrets::new().with(OPENAI_API_KEY, "sk-test"))
    }

    fn ok_body(choices: Value) -> Value {
        json!({
            "id": "cmpl-1",
            "object": "text_completion",
            "choices": choices,
            "usage": { "prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5 }
        })
    }

    #[tokio::test]
    async fn test_first_choice_is_returned_and_recorded() {
        let transport = SpyTransport::replying(ok_body(json!([{ "text": "hello" }, { "text": "ignored" }])));
        let recorder = Arc::new(MemoryAuditRecorder::new());
        let handler = requester(transport.clone(), recorder.clone());

        let result = handler.execute(&input(with_key())).await.unwrap();
        assert_eq!(result, CompletionResult::ok(Some("hello".into())));

        let records = recorder.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.type_, "completion");
        assert_eq!(record.provider, "openai");
        assert_eq!(record.total_tokens, Some(5));
        assert_eq!(record.project_id, "proj-1");
        assert_eq!(record.node_id, 7);
        assert_eq!(record.spell, json!("spell-a"));
        assert_eq!(record.status_code, 200);
        assert_eq!(record.status, "OK");
        assert_eq!(record.model.as_deref(), Some("text-davinci-003"));
        assert_eq!(record.request_data, record.parameters);
        assert!(!record.hidden && !record.processed);
        assert!(record.start_time > 0);

        let sent: Value = serde_json::from_str(&record.request_data).unwrap();
        assert_eq!(sent["prompt"], json!("Say hello"));
        let received: Value = serde_json::from_str(&record.response_data).unwrap();
        assert_eq!(received["id"], json!("cmpl-1"));
    }

    #[tokio::test]
    async fn test_request_goes_to_completions_with_payload() {
        let transport = SpyTransport::replying(ok_body(json!([{ "text": "x" }])));
        let recorder = Arc::new(MemoryAuditRecorder::new());
        let handler = requester(transport.clone(), recorder);

        handler.execute(&input(with_key())).await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.url, "http://mock.local/v1/completions");
        assert_eq!(call.header("Content-Type"), Some("application/json"));
        assert_eq!(call.header("Authorization"), Some("Bearer sk-test"));
        assert_eq!(call.body["max_tokens"], json!(100.0));
        assert_eq!(call.body["temperature"], json!(0.0));
        assert_eq!(call.body["top_p"], json!(1.0));
        assert_eq!(call.body["model"], json!("text-davinci-003"));
    }

    #[tokio::test]
    async fn test_empty_choices_still_recorded() {
        let transport = SpyTransport::replying(ok_body(json!([])));
        let recorder = Arc::new(MemoryAuditRecorder::new());
        let handler = requester(transport, recorder.clone());

        let result = handler.execute(&input(with_key())).await.unwrap();
        assert_eq!(result, CompletionResult::failed("No choices returned"));
        assert_eq!(recorder.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_choices_field_counts_as_empty() {
        let transport = SpyTransport::replying(json!({ "usage": { "total_tokens": 1 } }));
        let recorder = Arc::new(MemoryAuditRecorder::new());
        let handler = requester(transport, recorder.clone());

        let result = handler.execute(&input(with_key())).await.unwrap();
        assert_eq!(result.error.as_deref(), Some(NO_CHOICES_ERROR));
        assert_eq!(recorder.len(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_is_soft_failure_without_record() {
        let transport = SpyTransport::failing(TransportError::Request("timeout of 0ms exceeded".into()));
        let recorder = Arc::new(MemoryAuditRecorder::new());
        let handler = requester(transport, recorder.clone());

        let result = handler.execute(&input(with_key())).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("timeout of 0ms exceeded"));
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn test_non_success_status_is_soft_failure() {
        let transport = SpyTransport::failing(TransportError::Status { code: 401, body: "{}".into() });
        let recorder = Arc::new(MemoryAuditRecorder::new());
        let handler = requester(transport, recorder.clone());

        let result = handler.execute(&input(with_key())).await.unwrap();
        assert_eq!(result, CompletionResult::failed("Request failed with status code 401"));
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn test_missing_secrets_rejects_before_request() {
        let transport = SpyTransport::replying(ok_body(json!([{ "text": "x" }])));
        let recorder = Arc::new(MemoryAuditRecorder::new());
        let handler = requester(transport.clone(), recorder.clone());

        let err = handler.execute(&input(None)).await.unwrap_err();
        match err {
            NodeError::InvalidConfig(msg) => assert!(msg.contains("No secrets found")),
            other => panic!("Expected NodeError::InvalidConfig, got {other:?}"),
        }
        assert!(transport.calls().is_empty(), "transport must not be invoked");
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn test_missing_api_key_sends_bearer_null() {
        let transport = SpyTransport::replying(ok_body(json!([{ "text": "x" }])));
        let recorder = Arc::new(MemoryAuditRecorder::new());
        let handler = requester(transport.clone(), recorder);

        handler.execute(&input(Some(Secrets::new()))).await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls[0].header("Authorization"), Some("Bearer null"));
    }

    #[tokio::test]
    async fn test_missing_prompt_slot_rejects() {
        let transport = SpyTransport::replying(ok_body(json!([{ "text": "x" }])));
        let recorder = Arc::new(MemoryAuditRecorder::new());
        let handler = requester(transport.clone(), recorder);

        let data = CompletionHandlerInputData::new(SpellNode::new(1))
            .with_context(SpellContext::new("p").with_secrets(Secrets::new()));
        let err = handler.execute(&data).await.unwrap_err();
        assert!(matches!(err, NodeError::InvalidInput(_)));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_usage_rejects_without_record() {
        let transport = SpyTransport::replying(json!({ "choices": [{ "text": "hello" }] }));
        let recorder = Arc::new(MemoryAuditRecorder::new());
        let handler = requester(transport, recorder.clone());

        let err = handler.execute(&input(with_key())).await.unwrap_err();
        assert!(matches!(err, NodeError::MalformedResponse(_)));
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn test_empty_prompt_slot_sends_request_without_prompt() {
        let transport = SpyTransport::replying(ok_body(json!([{ "text": "free text" }])));
        let recorder = Arc::new(MemoryAuditRecorder::new());
        let handler = requester(transport.clone(), recorder.clone());

        let mut data = input(with_key());
        data.inputs.insert("input".to_string(), Vec::new());

        let result = handler.execute(&data).await.unwrap();
        assert_eq!(result, CompletionResult::ok(Some("free text".into())));

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].body.get("prompt").is_none(), "prompt should be left out");
        assert_eq!(recorder.len(), 1);
    }

    #[tokio::test]
    async fn test_usage_without_total_tokens_is_still_recorded() {
        for usage in [json!({}), json!({ "total_tokens": null }), json!({ "total_tokens": 4.5 })] {
            let transport = SpyTransport::replying(json!({
                "choices": [{ "text": "hi" }],
                "usage": usage
            }));
            let recorder = Arc::new(MemoryAuditRecorder::new());
            let handler = requester(transport, recorder.clone());

            let result = handler.execute(&input(with_key())).await.unwrap();
            assert_eq!(result, CompletionResult::ok(Some("hi".into())));

            let records = recorder.records();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].total_tokens, None);
        }
    }

    #[tokio::test]
    async fn test_null_usage_rejects_without_record() {
        let transport = SpyTransport::replying(json!({ "choices": [{ "text": "hi" }], "usage": null }));
        let recorder = Arc::new(MemoryAuditRecorder::new());
        let handler = requester(transport, recorder.clone());

        let err = handler.execute(&input(with_key())).await.unwrap_err();
        assert!(matches!(err, NodeError::MalformedResponse(_)));
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn test_choice_without_text_is_success_with_no_result() {
        let transport = SpyTransport::replying(ok_body(json!([{ "index": 0 }])));
        let recorder = Arc::new(MemoryAuditRecorder::new());
        let handler = requester(transport, recorder);

        let result = handler.execute(&input(with_key())).await.unwrap();
        assert!(result.success);
        assert_eq!(result.result, None);
    }

    #[test]
    fn test_provider_description() {
        let handler = requester(
            SpyTransport::replying(Value::Null),
            Arc::new(MemoryAuditRecorder::new()),
        );
        assert_eq!(CompletionHandler::name(&handler), "openai_text_completion");
        let desc = handler.description().unwrap();
        assert_eq!(desc.type_, "text");
        assert!(desc.models.iter().any(|m| m == "text-davinci-003"));
    }
}
