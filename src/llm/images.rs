use super::{InlineImage, read_json, send_error};
use crate::config::EndpointConfig;
use crate::error::GenerationError;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tracing::debug;

/// Image-to-image scene rendering. One source image in, one hosted image URL out.
pub struct ImageClient {
    http: Client,
    endpoint: EndpointConfig,
}

pub struct SceneRequest<'a> {
    pub prompt: &'a str,
    pub source: &'a InlineImage,
}

#[derive(Debug, Serialize)]
struct GenerationBody<'a> {
    model: &'a str,
    prompt: &'a str,
    image: String,
    sequential_image_generation: &'static str,
    response_format: &'static str,
    size: &'static str,
    stream: bool,
    watermark: bool,
}

impl ImageClient {
    pub fn new(http: Client, endpoint: EndpointConfig) -> Self {
        Self { http, endpoint }
    }

    pub async fn generate(
        &self,
        stage: &'static str,
        api_key: &str,
        request: SceneRequest<'_>,
    ) -> Result<String, GenerationError> {
        let body = GenerationBody {
            model: &self.endpoint.model,
            prompt: request.prompt,
            image: request.source.data_uri(),
            sequential_image_generation: "disabled",
            response_format: "url",
            size: "2K",
            stream: false,
            watermark: true,
        };
        debug!(
            target = "vibe.llm",
            stage = stage,
            model = %self.endpoint.model,
            image_bytes = request.source.data.len(),
            "image generation request"
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
        body: &GenerationBody<'_>,
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
        value
            .pointer("/data/0/url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .ok_or_else(|| GenerationError::malformed(stage, "response has no data[0].url"))
    }
}
