use super::send_error;
use crate::error::GenerationError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, header::CONTENT_TYPE};
use std::fmt;

const DEFAULT_MIME: &str = "image/jpeg";

/// An image ready to be inlined into a provider request.
#[derive(Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl fmt::Debug for InlineImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineImage")
            .field("mime_type", &self.mime_type)
            .field("data_len", &self.data.len())
            .finish()
    }
}

impl InlineImage {
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Resolves a preview URI into base64. `data:` URIs are split in place,
/// `http(s)` URLs are downloaded.
pub async fn inline_image(
    http: &Client,
    stage: &'static str,
    source: &str,
) -> Result<InlineImage, GenerationError> {
    let source = source.trim();
    if let Some(rest) = source.strip_prefix("data:") {
        return parse_data_uri(stage, rest);
    }
    if source.starts_with("http://") || source.starts_with("https://") {
        return fetch(http, stage, source).await;
    }
    Err(GenerationError::validation(
        stage,
        "image source must be a data URI or an http(s) URL",
    ))
}

fn parse_data_uri(stage: &'static str, rest: &str) -> Result<InlineImage, GenerationError> {
    let Some((meta, payload)) = rest.split_once(',') else {
        return Err(GenerationError::validation(stage, "data URI has no payload"));
    };
    let Some(mime) = meta.strip_suffix(";base64") else {
        return Err(GenerationError::validation(stage, "data URI is not base64 encoded"));
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(GenerationError::validation(stage, "data URI payload is empty"));
    }
    let mime = if mime.trim().is_empty() {
        DEFAULT_MIME
    } else {
        mime.trim()
    };
    Ok(InlineImage {
        mime_type: mime.to_string(),
        data: payload.to_string(),
    })
}

async fn fetch(
    http: &Client,
    stage: &'static str,
    url: &str,
) -> Result<InlineImage, GenerationError> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|err| send_error(stage, err))?;
    let status = response.status();
    if !status.is_success() {
        return Err(GenerationError::remote(
            stage,
            status.as_u16(),
            format!("image download failed: HTTP {}", status.as_u16()),
        ));
    }
    let mime = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .filter(|value| value.starts_with("image/"))
        .unwrap_or(DEFAULT_MIME)
        .to_string();
    let bytes = response
        .bytes()
        .await
        .map_err(|err| send_error(stage, err))?;
    if bytes.is_empty() {
        return Err(GenerationError::malformed(stage, "downloaded image is empty"));
    }
    Ok(InlineImage {
        mime_type: mime,
        data: STANDARD.encode(&bytes),
    })
}
