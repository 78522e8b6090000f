//! Process settings and conversation configuration.
//!
//! [`Settings`] holds the endpoint, credential and model values read from the
//! environment once at startup. [`LoupeConfig`] is the optional `loupe.toml`
//! file carrying round limits, execution settings and prompt overrides.
//! Neither is mutated after loading.

use loupe_abstraction::Model;
use loupe_models::{ModelConfig, ModelFactory, ModelType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::agents::{DescriberConfig, ProducerConfig};
use crate::conversation::ConversationConfig;
use crate::error::ConfigError;
use crate::execution::CodeExecutionConfig;

/// Config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "loupe.toml";

/// Model name used by the offline provider.
pub const OFFLINE_MODEL: &str = "offline-scripted";

const PROVIDER_VAR: &str = "LOUPE_PROVIDER";
const API_KEY_VARS: [&str; 3] = ["AZURE_OPENAI_API_KEY", "AZURE_OPENAI_KEY", "OPENAI_API_KEY"];
const ENDPOINT_VAR: &str = "AZURE_OPENAI_ENDPOINT";
const DEPLOYMENT_VARS: [&str; 2] = ["AZURE_OPENAI_DEPLOYMENT", "DEPLOYMENT_NAME"];
const API_VERSION_VAR: &str = "OPENAI_API_VERSION";
const BASE_URL_VAR: &str = "OPENAI_BASE_URL";
const MODEL_VAR: &str = "COMPLETIONS_MODEL";

/// Which backend serves the agents' models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI or an OpenAI-compatible server.
    OpenAI,
    /// Azure OpenAI.
    Azure,
    /// Canned replies, no network.
    Mock,
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "azure" | "azure-openai" => Ok(Self::Azure),
            "mock" | "offline" => Ok(Self::Mock),
            other => Err(ConfigError::InvalidValue {
                name: PROVIDER_VAR.to_string(),
                reason: format!("unknown provider '{}' (expected openai, azure or mock)", other),
            }),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAI => write!(f, "openai"),
            Self::Azure => write!(f, "azure"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

/// Process settings read from the environment.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    /// Model backend.
    pub provider: Provider,
    /// Credential. Never displayed.
    pub api_key: Option<String>,
    /// Azure resource endpoint.
    pub endpoint: Option<String>,
    /// Azure deployment.
    pub deployment: Option<String>,
    /// Azure API version.
    pub api_version: Option<String>,
    /// OpenAI-compatible base URL.
    pub base_url: Option<String>,
    /// Model name.
    pub model: String,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "provider:    {}", self.provider)?;
        writeln!(f, "model:       {}", self.model)?;
        writeln!(f, "api key:     {}", if self.api_key.is_some() { "<redacted>" } else { "(none)" })?;
        if let Some(endpoint) = &self.endpoint {
            writeln!(f, "endpoint:    {}", endpoint)?;
        }
        if let Some(deployment) = &self.deployment {
            writeln!(f, "deployment:  {}", deployment)?;
        }
        if let Some(api_version) = &self.api_version {
            writeln!(f, "api version: {}", api_version)?;
        }
        if let Some(base_url) = &self.base_url {
            writeln!(f, "base url:    {}", base_url)?;
        }
        Ok(())
    }
}

impl Settings {
    /// Reads settings through `lookup`. Empty values count as missing.
    ///
    /// # Errors
    /// [`ConfigError::MissingVariable`] when a value the provider needs is
    /// absent, [`ConfigError::InvalidValue`] for an unknown provider.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let first = |names: &[&str]| names.iter().find_map(|&name| get(name));

        let endpoint = get(ENDPOINT_VAR);
        let provider = match get(PROVIDER_VAR) {
            Some(value) => value.parse()?,
            None if endpoint.is_some() => Provider::Azure,
            None => Provider::OpenAI,
        };

        let api_key = first(&API_KEY_VARS);
        let deployment = first(&DEPLOYMENT_VARS);
        let model = get(MODEL_VAR);

        let settings = match provider {
            Provider::Mock => Self {
                provider,
                api_key: None,
                endpoint: None,
                deployment: None,
                api_version: None,
                base_url: None,
                model: model.unwrap_or_else(|| OFFLINE_MODEL.to_string()),
            },
            Provider::OpenAI => Self {
                provider,
                api_key: Some(api_key.ok_or_else(|| missing(&API_KEY_VARS))?),
                endpoint: None,
                deployment: None,
                api_version: None,
                base_url: get(BASE_URL_VAR),
                model: model.ok_or_else(|| missing(&[MODEL_VAR]))?,
            },
            Provider::Azure => {
                let endpoint = endpoint.ok_or_else(|| missing(&[ENDPOINT_VAR]))?;
                let model = model
                    .or_else(|| deployment.clone())
                    .ok_or_else(|| missing(&[MODEL_VAR, DEPLOYMENT_VARS[0]]))?;
                Self {
                    provider,
                    api_key: Some(api_key.ok_or_else(|| missing(&API_KEY_VARS))?),
                    endpoint: Some(endpoint),
                    deployment,
                    api_version: get(API_VERSION_VAR),
                    base_url: None,
                    model,
                }
            }
        };

        debug!(provider = %settings.provider, model = %settings.model, "Settings loaded");
        Ok(settings)
    }

    /// Reads settings from the process environment.
    ///
    /// # Errors
    /// See [`Settings::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads an optional `.env` file, then reads the environment.
    ///
    /// # Errors
    /// See [`Settings::from_lookup`].
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_env()
    }

    /// Model configuration for the network providers, `None` for `mock`.
    pub fn model_config(&self, timeout: Duration) -> Option<ModelConfig> {
        let model_type = match self.provider {
            Provider::OpenAI => ModelType::OpenAI,
            Provider::Azure => ModelType::Azure,
            Provider::Mock => return None,
        };

        let mut config = ModelConfig::new(model_type, self.model.clone()).with_timeout(timeout);
        if let Some(api_key) = &self.api_key {
            config = config.with_api_key(api_key.clone());
        }
        if let Some(url) = self.endpoint.as_ref().or(self.base_url.as_ref()) {
            config = config.with_base_url(url.clone());
        }
        if let Some(deployment) = &self.deployment {
            config = config.with_deployment(deployment.clone(), self.api_version.clone());
        } else if let Some(api_version) = &self.api_version {
            config = config.with_deployment(self.model.clone(), Some(api_version.clone()));
        }
        Some(config)
    }

    /// Builds the shared model client for a network provider.
    ///
    /// # Errors
    /// [`ConfigError::InvalidValue`] for the `mock` provider or when the
    /// client cannot be created.
    pub fn build_model(&self, timeout: Duration) -> Result<Arc<dyn Model + Send + Sync>, ConfigError> {
        let config = self.model_config(timeout).ok_or_else(|| ConfigError::InvalidValue {
            name: PROVIDER_VAR.to_string(),
            reason: "the mock provider has no remote model".to_string(),
        })?;
        ModelFactory::create(config).map_err(|e| ConfigError::InvalidValue {
            name: PROVIDER_VAR.to_string(),
            reason: e.to_string(),
        })
    }
}

fn missing(names: &[&str]) -> ConfigError {
    ConfigError::MissingVariable(names.join(" or "))
}

/// `[conversation]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationSection {
    /// Maximum produce/review rounds.
    pub max_rounds: u32,
    /// Extra attempts for a failing agent turn.
    pub max_retries: u32,
    /// Budget for one model call.
    pub turn_timeout_seconds: u64,
}

impl Default for ConversationSection {
    fn default() -> Self {
        let defaults = ConversationConfig::default();
        Self {
            max_rounds: defaults.max_rounds,
            max_retries: defaults.max_retries,
            turn_timeout_seconds: 120,
        }
    }
}

/// `[producer]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerSection {
    /// Coder model temperature.
    pub temperature: f32,
    /// Replacement system prompt.
    pub system_prompt: Option<String>,
}

impl Default for ProducerSection {
    fn default() -> Self {
        Self { temperature: ProducerConfig::default().temperature, system_prompt: None }
    }
}

/// `[reviewer]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewerSection {
    /// Vision model temperature.
    pub temperature: f32,
    /// Replacement instruction sent with the image.
    pub instruction: Option<String>,
    /// Replacement system prompt.
    pub system_prompt: Option<String>,
}

impl Default for ReviewerSection {
    fn default() -> Self {
        Self { temperature: DescriberConfig::default().temperature, instruction: None, system_prompt: None }
    }
}

/// Contents of `loupe.toml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoupeConfig {
    /// Round limits and timeouts.
    pub conversation: ConversationSection,
    /// Script execution.
    pub execution: CodeExecutionConfig,
    /// Producer overrides.
    pub producer: ProducerSection,
    /// Reviewer overrides.
    pub reviewer: ReviewerSection,
}

impl LoupeConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Loads `explicit` if given, else `./loupe.toml` if it exists, else defaults.
    ///
    /// # Errors
    /// Read or parse failures. A missing explicit path is an error; a missing
    /// default file is not.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Self::load_from_file(path)?, Some(path.to_path_buf())));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        if default.is_file() {
            let config = Self::load_from_file(&default)?;
            return Ok((config, Some(default)));
        }
        Ok((Self::default(), None))
    }

    /// Budget for one model call.
    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.conversation.turn_timeout_seconds)
    }

    /// Conversation limits.
    pub fn conversation_config(&self) -> ConversationConfig {
        ConversationConfig {
            max_rounds: self.conversation.max_rounds,
            max_retries: self.conversation.max_retries,
            feedback_window: self.execution.max_turns_considered,
        }
    }

    /// Producer settings.
    pub fn producer_config(&self) -> ProducerConfig {
        let defaults = ProducerConfig::default();
        ProducerConfig {
            temperature: self.producer.temperature,
            system_prompt: self.producer.system_prompt.clone().unwrap_or(defaults.system_prompt),
            model_timeout: self.turn_timeout(),
        }
    }

    /// Describer settings.
    pub fn describer_config(&self) -> DescriberConfig {
        let defaults = DescriberConfig::default();
        DescriberConfig {
            temperature: self.reviewer.temperature,
            system_prompt: self.reviewer.system_prompt.clone().unwrap_or(defaults.system_prompt),
            instruction: self.reviewer.instruction.clone().unwrap_or(defaults.instruction),
            model_timeout: self.turn_timeout(),
        }
    }
}
