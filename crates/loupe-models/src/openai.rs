//! OpenAI model implementation.
//!
//! This module provides an implementation of the `Model` trait for the OpenAI
//! Chat Completions API, both on api.openai.com (or any compatible base URL)
//! and on Azure OpenAI deployments. Image blocks are sent as `image_url` parts
//! carrying a `data:` URL, which is what vision-capable deployments expect.

use async_trait::async_trait;
use loupe_abstraction::{
    ChatMessage, ContentBlock, MessageContent, Model, ModelError, ModelParameters, ModelResponse,
    ModelUsage,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{debug, error, warn};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Where chat completion requests are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// OpenAI or an OpenAI-compatible server, bearer-token auth.
    OpenAI {
        /// Base URL, e.g. "https://api.openai.com/v1".
        base_url: String,
    },
    /// Azure OpenAI deployment, `api-key` header auth.
    Azure {
        /// Resource endpoint, e.g. "https://my-resource.openai.azure.com".
        endpoint: String,
        /// Deployment name.
        deployment: String,
        /// API version query parameter.
        api_version: String,
    },
}

/// OpenAI model implementation.
#[derive(Debug, Clone)]
pub struct OpenAIModel {
    /// The model ID (e.g., "gpt-4o").
    model_id: String,
    /// The API key for authentication.
    api_key: String,
    /// Where requests go.
    endpoint: Endpoint,
    /// HTTP client for making requests.
    client: Client,
}

impl OpenAIModel {
    /// Creates a new `OpenAIModel`, reading the key from `OPENAI_API_KEY`.
    ///
    /// # Errors
    /// Returns a `ModelError` if the API key is not found in environment variables.
    #[allow(clippy::disallowed_methods)] // env::var is needed for API key loading
    pub fn new(model_id: String) -> Result<Self, ModelError> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| {
            ModelError::UnsupportedModelProvider(
                "OPENAI_API_KEY environment variable not set".to_string(),
            )
        })?;

        Ok(Self::with_api_key(model_id, api_key))
    }

    /// Creates a new `OpenAIModel` with a custom API key.
    #[must_use]
    pub fn with_api_key(model_id: String, api_key: String) -> Self {
        Self {
            model_id,
            api_key,
            endpoint: Endpoint::OpenAI { base_url: DEFAULT_BASE_URL.to_string() },
            client: Client::new(),
        }
    }

    /// Creates a model bound to an Azure OpenAI deployment.
    #[must_use]
    pub fn azure(
        model_id: String,
        api_key: String,
        endpoint: String,
        deployment: String,
        api_version: String,
    ) -> Self {
        Self {
            model_id,
            api_key,
            endpoint: Endpoint::Azure { endpoint, deployment, api_version },
            client: Client::new(),
        }
    }

    /// Points an OpenAI-flavoured model at a different base URL.
    ///
    /// Has no effect on Azure models, whose URL is derived from the deployment.
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        if let Endpoint::OpenAI { .. } = self.endpoint {
            self.endpoint = Endpoint::OpenAI { base_url };
        }
        self
    }

    /// Applies a request timeout to the underlying HTTP client.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        match Client::builder().timeout(timeout).build() {
            Ok(client) => self.client = client,
            Err(e) => {
                warn!(
                    model_id = %self.model_id,
                    timeout_secs = timeout.as_secs(),
                    error = %e,
                    "Failed to build HTTP client with timeout, keeping the default client"
                );
            }
        }
        self
    }

    /// Returns the configured endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn provider_name(&self) -> &'static str {
        match self.endpoint {
            Endpoint::OpenAI { .. } => "openai",
            Endpoint::Azure { .. } => "azure",
        }
    }

    /// Full URL of the chat completions call.
    pub(crate) fn completions_url(&self) -> String {
        match &self.endpoint {
            Endpoint::OpenAI { base_url } => {
                format!("{}/chat/completions", base_url.trim_end_matches('/'))
            }
            Endpoint::Azure { endpoint, deployment, api_version } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                deployment,
                api_version
            ),
        }
    }

    /// Converts our ChatMessage role to OpenAI API role format.
    fn role_to_openai(role: &str) -> String {
        match role {
            "assistant" => "assistant".to_string(),
            "system" => "system".to_string(),
            "user" => "user".to_string(),
            _ => role.to_string(),
        }
    }

    fn content_to_openai(content: &MessageContent) -> OpenAIContent {
        match content {
            MessageContent::Text(text) => OpenAIContent::Text(text.clone()),
            MessageContent::Blocks(blocks) => OpenAIContent::Parts(
                blocks
                    .iter()
                    .map(|block| match block {
                        ContentBlock::Text { text } => OpenAIContentPart::Text { text: text.clone() },
                        ContentBlock::Image { media_type, data } => OpenAIContentPart::ImageUrl {
                            image_url: OpenAIImageUrl {
                                url: format!("data:{media_type};base64,{data}"),
                            },
                        },
                    })
                    .collect(),
            ),
        }
    }

    pub(crate) fn build_request(
        &self,
        messages: &[ChatMessage],
        parameters: Option<ModelParameters>,
    ) -> OpenAIRequest {
        let openai_messages: Vec<OpenAIMessage> = messages
            .iter()
            .map(|msg| OpenAIMessage {
                role: Self::role_to_openai(&msg.role),
                content: Self::content_to_openai(&msg.content),
            })
            .collect();

        let mut request_body = OpenAIRequest {
            model: self.model_id.clone(),
            messages: openai_messages,
            temperature: None,
            top_p: None,
            max_tokens: None,
            stop: None,
        };

        if let Some(params) = parameters {
            request_body.temperature = params.temperature;
            request_body.top_p = params.top_p;
            request_body.max_tokens = params.max_tokens;
            request_body.stop = params.stop_sequences;
        }

        request_body
    }
}

#[async_trait]
impl Model for OpenAIModel {
    async fn generate_chat_completion(
        &self,
        messages: &[ChatMessage],
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        debug!(
            model_id = %self.model_id,
            provider = self.provider_name(),
            message_count = messages.len(),
            has_image = messages.iter().any(|m| m.content.has_image()),
            parameters = ?parameters,
            "OpenAIModel generating chat completion"
        );

        let url = self.completions_url();
        let request_body = self.build_request(messages, parameters);

        let request = self.client.post(&url).json(&request_body);
        let request = match self.endpoint {
            Endpoint::OpenAI { .. } => request.bearer_auth(&self.api_key),
            Endpoint::Azure { .. } => request.header("api-key", &self.api_key),
        };

        let response = request.send().await.map_err(|e| {
            error!(error = %e, "Failed to send request to chat completions API");
            ModelError::RequestError(format!("Network error: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                status = %status,
                error = %error_text,
                "Chat completions API returned error status"
            );

            // Quota and rate limit responses are hard stops for the caller
            if status == 402 || status == 429 {
                return Err(ModelError::QuotaExceeded {
                    provider: self.provider_name().to_string(),
                    message: Some(error_text),
                });
            }

            return Err(ModelError::ModelResponseError(format!(
                "API error ({}): {}",
                status, error_text
            )));
        }

        let openai_response: OpenAIResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse chat completions response");
            ModelError::SerializationError(format!("Failed to parse response: {}", e))
        })?;

        let content = openai_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                error!("No content in chat completions response");
                ModelError::ModelResponseError("No content in API response".to_string())
            })?;

        let usage = openai_response.usage.map(|u| ModelUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ModelResponse { content, model_id: Some(self.model_id.clone()), usage })
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// OpenAI API request/response structures

#[derive(Debug, Serialize)]
pub(crate) struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: OpenAIContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum OpenAIContent {
    Text(String),
    Parts(Vec<OpenAIContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAIContentPart {
    Text { text: String },
    ImageUrl { image_url: OpenAIImageUrl },
}

#[derive(Debug, Serialize)]
struct OpenAIImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(clippy::struct_field_names)] // Matches API naming
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    const COMPLETION_BODY: &str = r#"{
        "choices": [{
            "message": {
                "role": "assistant",
                "content": "Verdict: APPROVE"
            }
        }],
        "usage": {
            "prompt_tokens": 10,
            "completion_tokens": 3,
            "total_tokens": 13
        }
    }"#;

    #[test]
    fn test_role_conversion() {
        assert_eq!(OpenAIModel::role_to_openai("user"), "user");
        assert_eq!(OpenAIModel::role_to_openai("assistant"), "assistant");
        assert_eq!(OpenAIModel::role_to_openai("system"), "system");
        assert_eq!(OpenAIModel::role_to_openai("tool"), "tool");
    }

    #[test]
    fn test_openai_model_creation_with_api_key() {
        let model = OpenAIModel::with_api_key("gpt-4o".to_string(), "test-key".to_string());
        assert_eq!(model.model_id(), "gpt-4o");
        assert_eq!(model.completions_url(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_azure_completions_url() {
        let model = OpenAIModel::azure(
            "gpt-4o".to_string(),
            "key".to_string(),
            "https://example.openai.azure.com/".to_string(),
            "vision".to_string(),
            "2024-02-01".to_string(),
        );
        assert_eq!(
            model.completions_url(),
            "https://example.openai.azure.com/openai/deployments/vision/chat/completions?api-version=2024-02-01"
        );
    }

    #[test]
    fn test_with_base_url_ignored_for_azure() {
        let model = OpenAIModel::azure(
            "gpt-4o".to_string(),
            "key".to_string(),
            "https://example.openai.azure.com".to_string(),
            "vision".to_string(),
            "2024-02-01".to_string(),
        )
        .with_base_url("http://localhost:1".to_string());
        assert!(matches!(model.endpoint(), Endpoint::Azure { .. }));
    }

    #[test]
    fn test_image_blocks_serialize_as_image_url_parts() {
        let model = OpenAIModel::with_api_key("gpt-4o".to_string(), "k".to_string());
        let messages = vec![ChatMessage::user(MessageContent::Blocks(vec![
            ContentBlock::text("Describe this image in detail."),
            ContentBlock::image("image/png", "iVBORw0KGgo="),
        ]))];

        let body = serde_json::to_value(model.build_request(&messages, None)).unwrap();
        let parts = &body["messages"][0]["content"];
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,iVBORw0KGgo=");
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_text_message_serializes_as_string() {
        let model = OpenAIModel::with_api_key("gpt-4o".to_string(), "k".to_string());
        let body = serde_json::to_value(
            model.build_request(&[ChatMessage::system("be brief")], Some(ModelParameters::with_temperature(0.4))),
        )
        .unwrap();
        assert_eq!(body["messages"][0]["content"], "be brief");
        assert!((body["temperature"].as_f64().unwrap() - 0.4).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_generate_chat_completion_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(json!({"model": "gpt-4o"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(COMPLETION_BODY)
            .create_async()
            .await;

        let model = OpenAIModel::with_api_key("gpt-4o".to_string(), "test-key".to_string())
            .with_base_url(format!("{}/v1", server.url()));

        let response = model.generate_text("Say hello", None).await.unwrap();
        assert_eq!(response.content, "Verdict: APPROVE");
        assert_eq!(response.model_id.as_deref(), Some("gpt-4o"));
        assert_eq!(response.usage.unwrap().total_tokens, 13);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_with_timeout_keeps_endpoint_and_serves_requests() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(COMPLETION_BODY)
            .create_async()
            .await;

        let model = OpenAIModel::with_api_key("gpt-4o".to_string(), "test-key".to_string())
            .with_base_url(format!("{}/v1", server.url()))
            .with_timeout(Duration::from_secs(5));
        assert_eq!(model.model_id(), "gpt-4o");
        assert_eq!(model.completions_url(), format!("{}/v1/chat/completions", server.url()));

        let response = model.generate_text("Say hello", None).await.unwrap();
        assert_eq!(response.content, "Verdict: APPROVE");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_azure_request_uses_api_key_header_and_version() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/openai/deployments/vision/chat/completions")
            .match_query(Matcher::UrlEncoded("api-version".into(), "2024-02-01".into()))
            .match_header("api-key", "azure-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(COMPLETION_BODY)
            .create_async()
            .await;

        let model = OpenAIModel::azure(
            "gpt-4o".to_string(),
            "azure-key".to_string(),
            server.url(),
            "vision".to_string(),
            "2024-02-01".to_string(),
        );

        let response = model.generate_chat_completion(&[ChatMessage::user("hi")], None).await;
        assert!(response.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_quota_exceeded() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_body("rate limit reached")
            .create_async()
            .await;

        let model = OpenAIModel::with_api_key("gpt-4o".to_string(), "k".to_string())
            .with_base_url(format!("{}/v1", server.url()));

        let err = model.generate_text("hi", None).await.unwrap_err();
        assert!(matches!(err, ModelError::QuotaExceeded { ref provider, .. } if provider == "openai"));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_model_response_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let model = OpenAIModel::with_api_key("gpt-4o".to_string(), "k".to_string())
            .with_base_url(format!("{}/v1", server.url()));

        let err = model.generate_text("hi", None).await.unwrap_err();
        assert!(matches!(err, ModelError::ModelResponseError(ref msg) if msg.contains("boom")));
    }

    #[tokio::test]
    async fn test_null_content_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#)
            .create_async()
            .await;

        let model = OpenAIModel::with_api_key("gpt-4o".to_string(), "k".to_string())
            .with_base_url(format!("{}/v1", server.url()));

        let err = model.generate_text("hi", None).await.unwrap_err();
        assert!(matches!(err, ModelError::ModelResponseError(_)));
    }

    #[tokio::test]
    async fn test_malformed_body_is_serialization_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("not json")
            .create_async()
            .await;

        let model = OpenAIModel::with_api_key("gpt-4o".to_string(), "k".to_string())
            .with_base_url(format!("{}/v1", server.url()));

        let err = model.generate_text("hi", None).await.unwrap_err();
        assert!(matches!(err, ModelError::SerializationError(_)));
    }
}
