//! Model factory for creating model instances from configuration.
//!
//! This module provides functionality to create model instances based on configuration,
//! handling API key loading from environment variables.

use crate::OpenAIModel;
use loupe_abstraction::{Model, ModelError};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

const DEFAULT_AZURE_API_VERSION: &str = "2024-02-01";

/// Model type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// OpenAI or an OpenAI-compatible server.
    OpenAI,
    /// Azure OpenAI deployment.
    Azure,
}

impl FromStr for ModelType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "openai-compatible" => Ok(Self::OpenAI),
            "azure" | "azure-openai" => Ok(Self::Azure),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAI => write!(f, "openai"),
            Self::Azure => write!(f, "azure"),
        }
    }
}

/// Model configuration.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// The type of model to create.
    pub model_type: ModelType,
    /// The model ID (e.g., "gpt-4o").
    pub model_id: String,
    /// Optional API key (if not provided, will be loaded from environment for OpenAI).
    pub api_key: Option<String>,
    /// Base URL for OpenAI-compatible servers, or the resource endpoint for Azure.
    pub base_url: Option<String>,
    /// Azure deployment name.
    pub deployment: Option<String>,
    /// Azure API version.
    pub api_version: Option<String>,
    /// Per-request HTTP timeout.
    pub timeout: Option<Duration>,
}

impl ModelConfig {
    /// Creates a new `ModelConfig` with the given type and model ID.
    #[must_use]
    pub fn new(model_type: ModelType, model_id: String) -> Self {
        Self {
            model_type,
            model_id,
            api_key: None,
            base_url: None,
            deployment: None,
            api_version: None,
            timeout: None,
        }
    }

    /// Sets the API key for this configuration.
    #[must_use]
    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.api_key = Some(api_key);
        self
    }

    /// Sets the base URL (OpenAI) or resource endpoint (Azure).
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Sets the Azure deployment and API version.
    #[must_use]
    pub fn with_deployment(mut self, deployment: String, api_version: Option<String>) -> Self {
        self.deployment = Some(deployment);
        self.api_version = api_version;
        self
    }

    /// Sets the per-request HTTP timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Factory for creating model instances.
pub struct ModelFactory;

impl ModelFactory {
    /// Creates a model instance from the given configuration.
    ///
    /// # Errors
    /// Returns a `ModelError` if model creation fails (e.g., missing API key or Azure endpoint).
    pub fn create(config: ModelConfig) -> Result<Arc<dyn Model + Send + Sync>, ModelError> {
        debug!(
            model_type = %config.model_type,
            model_id = %config.model_id,
            "Creating model instance"
        );

        let model = match config.model_type {
            ModelType::OpenAI => {
                let model = if let Some(api_key) = config.api_key {
                    OpenAIModel::with_api_key(config.model_id, api_key)
                } else {
                    OpenAIModel::new(config.model_id)?
                };
                match config.base_url {
                    Some(base_url) => model.with_base_url(base_url),
                    None => model,
                }
            }
            ModelType::Azure => {
                let api_key = config.api_key.ok_or_else(|| {
                    error!("Azure model requested without an API key");
                    ModelError::UnsupportedModelProvider("Azure OpenAI requires an API key".to_string())
                })?;
                let endpoint = config.base_url.ok_or_else(|| {
                    ModelError::UnsupportedModelProvider(
                        "Azure OpenAI requires an endpoint. Use ModelConfig::with_base_url() to set it."
                            .to_string(),
                    )
                })?;
                let deployment = config.deployment.unwrap_or_else(|| config.model_id.clone());
                let api_version =
                    config.api_version.unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string());
                OpenAIModel::azure(config.model_id, api_key, endpoint, deployment, api_version)
            }
        };

        let model = match config.timeout {
            Some(timeout) => model.with_timeout(timeout),
            None => model,
        };
        Ok(Arc::new(model))
    }

    /// Creates a model instance from a model type string, model ID and API key.
    ///
    /// # Errors
    /// Returns a `ModelError` if the model type is unrecognized or creation fails.
    pub fn create_with_api_key(
        model_type_str: &str,
        model_id: String,
        api_key: String,
    ) -> Result<Arc<dyn Model + Send + Sync>, ModelError> {
        let model_type = ModelType::from_str(model_type_str).map_err(|()| {
            error!(model_type = %model_type_str, "Unrecognized model type");
            ModelError::UnsupportedModelProvider(format!(
                "Unrecognized model type: {}",
                model_type_str
            ))
        })?;

        Self::create(ModelConfig::new(model_type, model_id).with_api_key(api_key))
    }
}
