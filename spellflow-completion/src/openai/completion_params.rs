use serde::Serialize;
use serde_json::Value;

use crate::context::CompletionNodeData;

pub const DEFAULT_TEMPERATURE: f64 = 0.0;
pub const DEFAULT_MAX_TOKENS: f64 = 100.0;
pub const DEFAULT_TOP_P: f64 = 1.0;
pub const DEFAULT_FREQUENCY_PENALTY: f64 = 0.0;
pub const DEFAULT_PRESENCE_PENALTY: f64 = 0.0;

/// 文本补全的数值采样参数。
///
/// 所有字段都是浮点数，`max_tokens` 也不例外，与编辑器历来发出的请求保持一致。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompletionSettings {
    pub temperature: f64,
    pub max_tokens: f64,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            top_p: DEFAULT_TOP_P,
            frequency_penalty: DEFAULT_FREQUENCY_PENALTY,
            presence_penalty: DEFAULT_PRESENCE_PENALTY,
        }
    }
}

impl CompletionSettings {
    /// 缺失或为 `null` 的字段使用默认值；无法解析的值变成 `NaN`，原样发送。
    pub fn from_node_data(data: &CompletionNodeData) -> Self {
        let defaults = Self::default();
        Self {
            temperature: field_or(&data.temperature, defaults.temperature),
            max_tokens: field_or(&data.max_tokens, defaults.max_tokens),
            top_p: field_or(&data.top_p, defaults.top_p),
            frequency_penalty: field_or(&data.frequency_penalty, defaults.frequency_penalty),
            presence_penalty: field_or(&data.presence_penalty, defaults.presence_penalty),
        }
    }
}

fn field_or(value: &Option<Value>, default: f64) -> f64 {
    match value {
        None | Some(Value::Null) => default,
        Some(v) => parse_float(v),
    }
}

/// 宽松的浮点解析：
/// - 数字原样返回；
/// - 字符串取最长的十进制前缀；
/// - 数组先按逗号拼接成字符串再解析，`[1]` 得到 1；
/// - 其余类型为 `NaN`。
pub fn parse_float(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => parse_float_prefix(s),
        Value::Array(_) => parse_float_prefix(&joined_string(value)),
        _ => f64::NAN,
    }
}

/// 数组的字符串形式：元素以 "," 连接，`null` 为空串
fn joined_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(joined_string).collect::<Vec<_>>().join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn parse_float_prefix(input: &str) -> f64 {
    let s = input.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    if s[end..].starts_with("Infinity") {
        return if s.starts_with('-') { f64::NEG_INFINITY } else { f64::INFINITY };
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        end = frac_end;
    }
    if digits == 0 {
        return f64::NAN;
    }

    // 指数部分后面至少要有一位数字才算数
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().unwrap_or(f64::NAN)
}

/// `POST /completions` 的请求体。`prompt` 为 `None` 时不出现在 JSON 中。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(flatten)]
    pub settings: CompletionSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Value>,
}

impl CompletionRequest {
    pub fn from_node_data(data: &CompletionNodeData, prompt: Option<Value>) -> Self {
        Self {
            model: data.model.clone(),
            settings: CompletionSettings::from_node_data(data),
            stop: data.stop.clone().filter(|v| !v.is_null()),
            prompt,
        }
    }
}
