use chrono::{DateTime, Utc};

use super::chat_types::{ChatResponse, Message, Role, ToolCall, ToolCallArguments};
use super::openai_types::{ChatCompletionResponse, ChatToolCall};
use crate::error::{BridgeError, Result};

/// Translate a complete `OpenAI` Chat Completion into the terminal native response.
/// `model` is the model name the caller originally asked for.
///
/// # Errors
/// Returns `BridgeError::EmptyChoice` when the remote sent no choices.
pub fn openai_to_chat(resp: &ChatCompletionResponse, model: &str) -> Result<ChatResponse> {
    let choice = resp.choices.first().ok_or(BridgeError::EmptyChoice)?;

    let tool_calls = choice
        .message
        .tool_calls
        .iter()
        .flatten()
        .filter_map(|tc| match parse_tool_call(tc) {
            Ok(call) => Some(call),
            Err(e) => {
                tracing::warn!(
                    tool = %tc.function.name,
                    error = %e,
                    "dropping tool call with unparseable arguments"
                );
                None
            }
        })
        .collect();

    let message = Message {
        role: parse_role(&choice.message.role),
        content: choice
            .message
            .content
            .as_ref()
            .map(|c| c.text())
            .unwrap_or_default(),
        thinking: choice.message.reasoning_text().map(str::to_string),
        tool_calls,
        ..Message::default()
    };

    let usage = resp.usage.clone().unwrap_or_default();

    Ok(ChatResponse {
        model: model.to_string(),
        created_at: timestamp(resp.created),
        message,
        done: true,
        done_reason: Some(
            choice
                .finish_reason
                .clone()
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| "stop".to_string()),
        ),
        prompt_eval_count: usage.prompt_tokens,
        eval_count: usage.completion_tokens,
    })
}

fn parse_tool_call(tc: &ChatToolCall) -> std::result::Result<ToolCall, serde_json::Error> {
    let arguments = parse_arguments(&tc.function.arguments)?;
    Ok(ToolCall::new(tc.id.clone(), tc.function.name.clone(), arguments))
}

/// Parse a JSON argument string; blank means no arguments.
pub(crate) fn parse_arguments(raw: &str) -> std::result::Result<ToolCallArguments, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(ToolCallArguments::new());
    }
    serde_json::from_str(raw)
}

fn parse_role(role: &str) -> Role {
    match role {
        "system" => Role::System,
        "user" => Role::User,
        "tool" => Role::Tool,
        _ => Role::Assistant,
    }
}

fn timestamp(created: i64) -> DateTime<Utc> {
    if created <= 0 {
        return Utc::now();
    }
    DateTime::<Utc>::from_timestamp(created, 0).unwrap_or_else(Utc::now)
}
