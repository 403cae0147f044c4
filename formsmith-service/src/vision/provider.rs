//! Interchangeable generative-model backends.
//!
//! Both backends expose one capability: prompt plus optional page image in,
//! text out. Errors are uniform `VisionError`s so the primary/fallback
//! chain in the caller never cares which protocol failed.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{BackendKind, ModelBackendConfig};
use crate::error::VisionError;

/// A configured model backend
#[derive(Debug, Clone)]
pub enum ModelBackend {
    Ollama(OllamaBackend),
    OpenaiCompatible(OpenAiBackend),
}

impl ModelBackend {
    pub fn from_config(config: &ModelBackendConfig, timeout: Duration) -> Result<Self, VisionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| VisionError::Connection {
                url: config.base_url.clone(),
                source,
            })?;

        Ok(match config.kind {
            BackendKind::Ollama => ModelBackend::Ollama(OllamaBackend {
                client,
                base_url: config.base_url.clone(),
                model: config.model.clone(),
            }),
            BackendKind::OpenaiCompatible => ModelBackend::OpenaiCompatible(OpenAiBackend {
                client,
                base_url: config.base_url.clone(),
                model: config.model.clone(),
                api_key: config.api_key.clone(),
            }),
        })
    }

    /// The same backend pointed at a different model (used by the text
    /// mapping pass, which shares the provider's base URL).
    pub fn with_model(&self, model: &str) -> Self {
        match self {
            ModelBackend::Ollama(b) => ModelBackend::Ollama(OllamaBackend {
                client: b.client.clone(),
                base_url: b.base_url.clone(),
                model: model.to_string(),
            }),
            ModelBackend::OpenaiCompatible(b) => ModelBackend::OpenaiCompatible(OpenAiBackend {
                client: b.client.clone(),
                base_url: b.base_url.clone(),
                model: model.to_string(),
                api_key: b.api_key.clone(),
            }),
        }
    }

    /// Short identifier for logs
    pub fn describe(&self) -> String {
        match self {
            ModelBackend::Ollama(b) => format!("ollama:{}", b.model),
            ModelBackend::OpenaiCompatible(b) => format!("openai:{}", b.model),
        }
    }

    /// Send a prompt (optionally with a base64 PNG page image) and return
    /// the model's text.
    pub async fn analyze(
        &self,
        prompt: &str,
        image_base64: Option<&str>,
    ) -> Result<String, VisionError> {
        match self {
            ModelBackend::Ollama(backend) => backend.generate(prompt, image_base64).await,
            ModelBackend::OpenaiCompatible(backend) => backend.generate(prompt, image_base64).await,
        }
    }

    /// Best-effort availability probe for the health endpoint.
    pub async fn health_check(&self) -> bool {
        let (client, url) = match self {
            ModelBackend::Ollama(b) => (&b.client, format!("{}/api/tags", b.base_url)),
            ModelBackend::OpenaiCompatible(b) => (&b.client, format!("{}/v1/models", b.base_url)),
        };

        match client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, url = %url, "Model backend health check failed");
                false
            }
        }
    }
}

// ── Ollama ───────────────────────────────────────────────────────────

/// Ollama `/api/chat` client
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    async fn generate(
        &self,
        prompt: &str,
        image_base64: Option<&str>,
    ) -> Result<String, VisionError> {
        let url = format!("{}/api/chat", self.base_url);

        let message = ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
            images: image_base64.map(|img| vec![img.to_string()]),
        };

        let request = OllamaChatRequest {
            model: self.model.clone(),
            messages: vec![message],
            stream: false,
            options: Some(OllamaOptions {
                // low temperature for consistent structured output
                temperature: Some(0.2),
            }),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|source| VisionError::Connection {
                url: url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();

            if message.contains("model") && message.contains("not found") {
                return Err(VisionError::ModelNotFound {
                    model: self.model.clone(),
                });
            }

            return Err(VisionError::Generation { status, message });
        }

        let chat_response: OllamaChatResponse =
            response
                .json()
                .await
                .map_err(|e| VisionError::InvalidResponse {
                    source: serde_json::Error::io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        e.to_string(),
                    )),
                })?;

        Ok(chat_response.message.content)
    }
}

/// Chat message in the Ollama wire shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// Base64-encoded images for vision models
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

// ── OpenAI-compatible ────────────────────────────────────────────────

/// OpenAI-style `/v1/chat/completions` client
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiBackend {
    async fn generate(
        &self,
        prompt: &str,
        image_base64: Option<&str>,
    ) -> Result<String, VisionError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let content = match image_base64 {
            Some(image) => serde_json::json!([
                { "type": "text", "text": prompt },
                {
                    "type": "image_url",
                    "image_url": { "url": format!("data:image/png;base64,{}", image) }
                }
            ]),
            None => serde_json::json!(prompt),
        };

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": content }],
            "temperature": 0.2,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|source| VisionError::Connection {
                url: url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(VisionError::Generation { status, message });
        }

        let completion: OpenAiCompletionResponse =
            response
                .json()
                .await
                .map_err(|e| VisionError::InvalidResponse {
                    source: serde_json::Error::io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        e.to_string(),
                    )),
                })?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| VisionError::Generation {
                status: 200,
                message: "Completion carried no choices".to_string(),
            })
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiCompletionResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: String,
}
