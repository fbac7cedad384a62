//! The native chat API: what callers send to `/api/chat` and what they get back.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default)]
    pub options: ChatOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub think: Option<Think>,
    /// `"json"` or a JSON schema the answer must follow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<serde_json::Value>,
}

impl ChatRequest {
    pub fn is_streaming(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    #[default]
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Raw image bytes; base64 on the JSON wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData(pub Vec<u8>);

impl Serialize for ImageData {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use base64::Engine;
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for ImageData {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use base64::Engine;
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map(ImageData)
            .map_err(serde::de::Error::custom)
    }
}

/// Structured tool-call arguments.
pub type ToolCallArguments = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: ToolCallArguments,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: ToolCallArguments) -> Self {
        Self {
            id: id.into(),
            function: ToolCallFunction {
                name: name.into(),
                arguments,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type", default = "default_tool_type")]
    pub tool_type: String,
    pub function: ToolFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFunction {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

fn default_tool_type() -> String {
    "function".to_string()
}

/// `think: true` or `think: "high"`. Only the effort form reaches the remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Think {
    Enabled(bool),
    Effort(String),
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Option keys the bridge forwards to the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKey {
    Temperature,
    TopP,
    NumPredict,
    Seed,
    FrequencyPenalty,
    PresencePenalty,
}

impl OptionKey {
    pub const ALL: [OptionKey; 6] = [
        OptionKey::Temperature,
        OptionKey::TopP,
        OptionKey::NumPredict,
        OptionKey::Seed,
        OptionKey::FrequencyPenalty,
        OptionKey::PresencePenalty,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::TopP => "top_p",
            Self::NumPredict => "num_predict",
            Self::Seed => "seed",
            Self::FrequencyPenalty => "frequency_penalty",
            Self::PresencePenalty => "presence_penalty",
        }
    }
}

/// Sampling options. A recognized key with a value of the wrong type fails
/// deserialization; any other key lands in `ignored` and is never forwarded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, alias = "max_tokens", skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(flatten)]
    pub ignored: BTreeMap<String, serde_json::Value>,
}

impl ChatOptions {
    pub fn is_set(&self, key: OptionKey) -> bool {
        match key {
            OptionKey::Temperature => self.temperature.is_some(),
            OptionKey::TopP => self.top_p.is_some(),
            OptionKey::NumPredict => self.num_predict.is_some(),
            OptionKey::Seed => self.seed.is_some(),
            OptionKey::FrequencyPenalty => self.frequency_penalty.is_some(),
            OptionKey::PresencePenalty => self.presence_penalty.is_some(),
        }
    }

    /// Recognized keys the caller actually set, in declaration order.
    pub fn set_keys(&self) -> Vec<OptionKey> {
        OptionKey::ALL.into_iter().filter(|k| self.is_set(*k)).collect()
    }

    pub fn ignored_keys(&self) -> impl Iterator<Item = &str> {
        self.ignored.keys().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub message: Message,
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub prompt_eval_count: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub eval_count: u64,
}

impl ChatResponse {
    /// An in-progress fragment carrying one increment of assistant output.
    pub fn partial(model: &str, message: Message) -> Self {
        Self {
            model: model.to_string(),
            created_at: Utc::now(),
            message,
            done: false,
            done_reason: None,
            prompt_eval_count: 0,
            eval_count: 0,
        }
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(n: &u64) -> bool {
    *n == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_request_parses() {
        let req: ChatRequest = serde_json::from_value(serde_json::json!({
            "model": "llama3",
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "what is this?", "images": ["aGVsbG8="]},
                {"role": "tool", "content": "18C", "tool_call_id": "call_1", "tool_name": "weather"}
            ],
            "stream": false,
            "options": {"temperature": 0.5, "max_tokens": 64, "mirostat": 2},
            "think": "high"
        }))
        .unwrap();

        assert_eq!(req.messages.len(), 3);
        assert_eq!(req.messages[1].images, vec![ImageData(b"hello".to_vec())]);
        assert_eq!(req.messages[2].role, Role::Tool);
        assert_eq!(req.options.temperature, Some(0.5));
        assert_eq!(req.options.num_predict, Some(64));
        assert_eq!(req.options.ignored_keys().collect::<Vec<_>>(), vec!["mirostat"]);
        assert_eq!(req.think, Some(Think::Effort("high".to_string())));
        assert!(!req.is_streaming());
    }

    #[test]
    fn test_wrongly_typed_option_is_rejected() {
        let result = serde_json::from_value::<ChatOptions>(serde_json::json!({
            "temperature": "warm"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_set_keys_in_declaration_order() {
        let opts: ChatOptions =
            serde_json::from_str(r#"{"seed": 7, "max_tokens": 64, "top_k": 40}"#).unwrap();
        assert_eq!(opts.set_keys(), vec![OptionKey::NumPredict, OptionKey::Seed]);
        assert_eq!(opts.ignored_keys().collect::<Vec<_>>(), vec!["top_k"]);
        assert!(ChatOptions::default().set_keys().is_empty());
    }

    #[test]
    fn test_think_bool_form() {
        let think: Think = serde_json::from_str("true").unwrap();
        assert_eq!(think, Think::Enabled(true));
    }

    #[test]
    fn test_response_omits_zero_counters() {
        let resp = ChatResponse::partial("m", Message::assistant("hi"));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["done"], false);
        assert!(json.get("eval_count").is_none());
        assert!(json.get("done_reason").is_none());
        assert_eq!(json["message"]["role"], "assistant");
    }
}
