use crate::error::{BridgeError, Result};
use crate::providers::ProviderPreset;
use crate::remote::RemoteTarget;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    pub remote: RemoteConfig,
    /// Local model name → remote model id.
    #[serde(default)]
    pub models: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_name")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<RemoteProtocol>,
}

/// Which API the remote speaks. Always stated, never guessed from the URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteProtocol {
    /// OpenAI chat completions; requests are translated.
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    /// The native chat API; requests are forwarded untouched.
    Native,
}

impl std::fmt::Display for RemoteProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi => f.write_str("openai (translate)"),
            Self::Native => f.write_str("native (passthrough)"),
        }
    }
}

fn default_port() -> u16 {
    11435
}

fn default_remote_name() -> String {
    "custom".to_string()
}

impl BridgeConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > home dir
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        let candidates = config_search_paths();
        for candidate in &candidates {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(candidate);
            }
        }

        Err(BridgeError::config(format!(
            "No config file found. Searched: {}",
            candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }

    /// Resolve the effective base URL (config override or provider preset default)
    pub fn effective_base_url(&self) -> Result<String> {
        if let Some(ref url) = self.remote.base_url {
            return Ok(url.clone());
        }

        let preset = ProviderPreset::from_name(&self.remote.name).ok_or_else(|| {
            BridgeError::config(format!(
                "Unknown provider '{}' and no base_url configured. Known providers: {}",
                self.remote.name,
                ProviderPreset::all()
                    .iter()
                    .map(|p| p.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;

        Ok(preset.base_url.to_string())
    }

    /// The environment variable holding the API key, if any.
    pub fn api_key_env(&self) -> Option<String> {
        self.remote.api_key_env.clone().or_else(|| {
            ProviderPreset::from_name(&self.remote.name)
                .and_then(|p| p.default_api_key_env)
                .map(str::to_string)
        })
    }

    /// Resolve the API key. No configured variable means an unauthenticated
    /// remote and an empty key.
    pub fn resolve_api_key(&self) -> Result<String> {
        let Some(var) = self.api_key_env() else {
            return Ok(String::new());
        };
        std::env::var(&var).map_err(|_| {
            BridgeError::config(format!(
                "Environment variable '{var}' not set. Set it with your provider API key."
            ))
        })
    }

    pub fn protocol(&self) -> RemoteProtocol {
        self.remote
            .protocol
            .or_else(|| ProviderPreset::from_name(&self.remote.name).map(|p| p.protocol))
            .unwrap_or_default()
    }

    /// Map a local model name to the remote model id; unmapped names pass through.
    pub fn remote_model(&self, local: &str) -> String {
        self.models
            .get(local)
            .cloned()
            .unwrap_or_else(|| local.to_string())
    }

    /// Everything the transport needs to call the remote for `local_model`.
    pub fn remote_target(&self, local_model: &str) -> Result<RemoteTarget> {
        Ok(RemoteTarget::new(self.effective_base_url()?, self.resolve_api_key()?)
            .with_model(self.remote_model(local_model)))
    }
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // CWD
    paths.push(PathBuf::from("chat-bridge.toml"));

    // XDG / platform config dir
    if cfg!(target_os = "macos") {
        if let Some(home) = home_dir() {
            paths.push(
                home.join("Library")
                    .join("Application Support")
                    .join("chat-bridge")
                    .join("config.toml"),
            );
        }
    } else {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg).join("chat-bridge").join("config.toml"));
        }
        if let Some(home) = home_dir() {
            paths.push(home.join(".config").join("chat-bridge").join("config.toml"));
        }
    }

    // Home directory fallback
    if let Some(home) = home_dir() {
        paths.push(home.join(".chat-bridge.toml"));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
