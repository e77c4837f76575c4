use super::{read_json, send_error};
use crate::config::EndpointConfig;
use crate::error::GenerationError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: "user",
            content: MessageContent::Parts(parts),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Optional sampling knobs; unset ones are left to the provider default.
#[skip_serializing_none]
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Sampling {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub n: Option<u32>,
}

/// OpenAI-compatible `chat/completions` client. Used for both copy writing and
/// image captioning; only the endpoint, model and messages differ.
pub struct ChatClient {
    http: Client,
    endpoint: EndpointConfig,
}

impl ChatClient {
    pub fn new(http: Client, endpoint: EndpointConfig) -> Self {
        Self { http, endpoint }
    }

    /// Returns the first choice's message content.
    pub async fn complete(
        &self,
        stage: &'static str,
        api_key: &str,
        messages: &[ChatMessage],
        sampling: Sampling,
    ) -> Result<String, GenerationError> {
        let body = ChatRequest {
            model: &self.endpoint.model,
            messages,
            stream: false,
            sampling,
        };
        debug!(
            target = "vibe.llm",
            stage = stage,
            model = %self.endpoint.model,
            messages = messages.len(),
            "chat completion request"
        );

        let started = Instant::now();
        let result = self.send(stage, api_key, &body).await;
        crate::metrics::remote_call_elapsed(stage, started.elapsed().as_millis(), result.is_ok());
        result
    }

    async fn send(
        &self,
        stage: &'static str,
        api_key: &str,
        body: &ChatRequest<'_>,
    ) -> Result<String, GenerationError> {
        let response = self
            .http
            .post(&self.endpoint.url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| send_error(stage, err))?;

        let value = read_json(stage, response).await?;
        let payload: ChatResponse = serde_json::from_value(value)
            .map_err(|err| GenerationError::malformed(stage, err.to_string()))?;

        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                GenerationError::malformed(stage, "response has no choices[0].message.content")
            })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(flatten)]
    sampling: Sampling,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
