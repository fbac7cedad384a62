//! Built-in presets for common OpenAI-compatible providers.
//!
//! Each preset names the host root of the provider's API (the transport adds
//! `/v1/chat/completions` itself), the protocol it speaks, and the environment
//! variable its API key usually lives in.

use crate::config::RemoteProtocol;

#[derive(Debug, Clone)]
pub struct ProviderPreset {
    pub name: &'static str,
    pub base_url: &'static str,
    pub protocol: RemoteProtocol,
    /// `None` for providers that run without authentication.
    pub default_api_key_env: Option<&'static str>,
}

const PRESETS: &[ProviderPreset] = &[
    ProviderPreset {
        name: "openai",
        base_url: "https://api.openai.com",
        protocol: RemoteProtocol::OpenAi,
        default_api_key_env: Some("OPENAI_API_KEY"),
    },
    ProviderPreset {
        name: "openrouter",
        base_url: "https://openrouter.ai/api",
        protocol: RemoteProtocol::OpenAi,
        default_api_key_env: Some("OPENROUTER_API_KEY"),
    },
    ProviderPreset {
        name: "fireworks",
        base_url: "https://api.fireworks.ai/inference",
        protocol: RemoteProtocol::OpenAi,
        default_api_key_env: Some("FIREWORKS_API_KEY"),
    },
    ProviderPreset {
        name: "grok",
        base_url: "https://api.x.ai",
        protocol: RemoteProtocol::OpenAi,
        default_api_key_env: Some("XAI_API_KEY"),
    },
    ProviderPreset {
        name: "together",
        base_url: "https://api.together.xyz",
        protocol: RemoteProtocol::OpenAi,
        default_api_key_env: Some("TOGETHER_API_KEY"),
    },
    ProviderPreset {
        name: "groq",
        base_url: "https://api.groq.com/openai",
        protocol: RemoteProtocol::OpenAi,
        default_api_key_env: Some("GROQ_API_KEY"),
    },
    ProviderPreset {
        name: "deepseek",
        base_url: "https://api.deepseek.com",
        protocol: RemoteProtocol::OpenAi,
        default_api_key_env: Some("DEEPSEEK_API_KEY"),
    },
    ProviderPreset {
        name: "dashscope",
        base_url: "https://dashscope.aliyuncs.com/compatible-mode",
        protocol: RemoteProtocol::OpenAi,
        default_api_key_env: Some("DASHSCOPE_API_KEY"),
    },
    ProviderPreset {
        name: "vllm",
        base_url: "http://localhost:8000",
        protocol: RemoteProtocol::OpenAi,
        default_api_key_env: None,
    },
    ProviderPreset {
        name: "ollama",
        base_url: "http://localhost:11434",
        protocol: RemoteProtocol::Native,
        default_api_key_env: None,
    },
];

impl ProviderPreset {
    #[must_use]
    pub fn from_name(name: &str) -> Option<&'static ProviderPreset> {
        PRESETS.iter().find(|p| p.name == name.to_lowercase())
    }

    #[must_use]
    pub fn all() -> &'static [ProviderPreset] {
        PRESETS
    }
}
