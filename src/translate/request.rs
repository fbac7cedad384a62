//! Translate native chat requests into `OpenAI` Chat Completions requests.
//!
//! Messages map one-to-one. Images become inline data-URI parts, tool calls get
//! their structured arguments serialized back to JSON strings, and the options
//! map only contributes the sampling fields it actually sets.

use base64::Engine;

use super::chat_types::{ChatOptions, ChatRequest, ImageData, Message, Role, Think, Tool};
use super::openai_types::{
    ChatCompletionRequest, ChatContent, ChatFunction, ChatMessage, ChatTool, ChatToolCall,
    ChatToolCallFunction, ContentPart, ImageUrlDetail, JsonSchemaFormat, Reasoning,
    ResponseFormat,
};
use crate::error::{BridgeError, Result};

/// Translate a native chat request into an `OpenAI` Chat Completions request
/// addressed to `remote_model`.
///
/// # Errors
/// Returns `BridgeError::Conversion` if tool-call arguments cannot be
/// serialized or the `format` directive has an unsupported shape.
pub fn chat_to_openai(req: &ChatRequest, remote_model: &str) -> Result<ChatCompletionRequest> {
    let messages = req
        .messages
        .iter()
        .map(translate_message)
        .collect::<Result<Vec<_>>>()?;

    let ChatOptions {
        temperature,
        top_p,
        num_predict,
        seed,
        frequency_penalty,
        presence_penalty,
        ..
    } = req.options;

    let forwarded = req.options.set_keys();
    if !forwarded.is_empty() {
        tracing::debug!(
            keys = ?forwarded.iter().map(|k| k.as_str()).collect::<Vec<_>>(),
            "forwarding options"
        );
    }
    if !req.options.ignored.is_empty() {
        tracing::debug!(
            keys = ?req.options.ignored_keys().collect::<Vec<_>>(),
            "ignoring options the remote does not understand"
        );
    }

    Ok(ChatCompletionRequest {
        model: remote_model.to_string(),
        messages,
        stream: req.is_streaming(),
        // negative num_predict means "no limit" natively; leave the remote default
        max_tokens: num_predict.filter(|n| *n >= 0),
        seed,
        temperature,
        top_p,
        frequency_penalty,
        presence_penalty,
        tools: req.tools.as_ref().map(|tools| tools.iter().map(translate_tool).collect()),
        reasoning: translate_think(req.think.as_ref()),
        response_format: req.format.as_ref().map(translate_format).transpose()?,
    })
}

fn translate_message(msg: &Message) -> Result<ChatMessage> {
    let tool_calls = if msg.tool_calls.is_empty() {
        None
    } else {
        let calls = msg
            .tool_calls
            .iter()
            .map(|tc| {
                let arguments = serde_json::to_string(&tc.function.arguments).map_err(|e| {
                    BridgeError::conversion(format!(
                        "failed to serialize arguments of tool call '{}': {e}",
                        tc.function.name
                    ))
                })?;
                Ok(ChatToolCall {
                    id: tc.id.clone(),
                    call_type: "function".to_string(),
                    function: ChatToolCallFunction {
                        name: tc.function.name.clone(),
                        arguments,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Some(calls)
    };

    let content = if !msg.images.is_empty() {
        let mut parts = Vec::with_capacity(msg.images.len() + 1);
        if !msg.content.is_empty() {
            parts.push(ContentPart::Text {
                text: msg.content.clone(),
            });
        }
        parts.extend(msg.images.iter().map(|img| ContentPart::ImageUrl {
            image_url: ImageUrlDetail {
                url: image_data_uri(img),
            },
        }));
        Some(ChatContent::Parts(parts))
    } else if msg.content.is_empty() && tool_calls.is_some() {
        None
    } else {
        Some(ChatContent::Text(msg.content.clone()))
    };

    let (tool_call_id, name) = if msg.role == Role::Tool {
        (msg.tool_call_id.clone(), msg.tool_name.clone().filter(|n| !n.is_empty()))
    } else {
        (None, None)
    };

    Ok(ChatMessage {
        role: msg.role.as_str().to_string(),
        content,
        reasoning: msg.thinking.clone().filter(|t| !t.is_empty()),
        tool_calls,
        tool_call_id,
        name,
    })
}

fn translate_tool(tool: &Tool) -> ChatTool {
    ChatTool {
        tool_type: tool.tool_type.clone(),
        function: ChatFunction {
            name: tool.function.name.clone(),
            description: tool.function.description.clone(),
            parameters: tool.function.parameters.clone(),
        },
    }
}

fn translate_think(think: Option<&Think>) -> Option<Reasoning> {
    match think? {
        Think::Effort(effort) => Some(Reasoning {
            effort: effort.clone(),
        }),
        Think::Enabled(flag) => {
            tracing::debug!(think = flag, "boolean think directive is not forwarded");
            None
        }
    }
}

fn translate_format(format: &serde_json::Value) -> Result<ResponseFormat> {
    match format {
        serde_json::Value::String(s) if s == "json" => Ok(ResponseFormat::JsonObject),
        serde_json::Value::Object(_) => Ok(ResponseFormat::JsonSchema {
            json_schema: JsonSchemaFormat {
                name: "response".to_string(),
                schema: format.clone(),
            },
        }),
        other => Err(BridgeError::conversion(format!(
            "unsupported format directive: {other}"
        ))),
    }
}

fn image_data_uri(img: &ImageData) -> String {
    format!(
        "data:{};base64,{}",
        sniff_mime(&img.0),
        base64::engine::general_purpose::STANDARD.encode(&img.0)
    )
}

fn sniff_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/jpeg"
    }
}
