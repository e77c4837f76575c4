pub mod chat;
pub mod images;
pub mod media;

pub use chat::{ChatClient, ChatMessage, ContentPart, Sampling};
pub use images::{ImageClient, SceneRequest};
pub use media::{InlineImage, inline_image};

use crate::error::GenerationError;
use serde_json::Value;

/// Turns a provider response into JSON, classifying non-2xx answers as remote
/// errors carrying the server's own message when it sent one.
pub(crate) async fn read_json(
    stage: &'static str,
    response: reqwest::Response,
) -> Result<Value, GenerationError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| send_error(stage, err))?;

    if !status.is_success() {
        let message =
            server_message(&body).unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        return Err(GenerationError::remote(stage, status.as_u16(), message));
    }

    serde_json::from_str(&body)
        .map_err(|err| GenerationError::malformed(stage, format!("invalid json body: {err}")))
}

pub(crate) fn send_error(stage: &'static str, err: reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        GenerationError::transport(stage, format!("request timed out: {err}"))
    } else {
        GenerationError::transport(stage, err.to_string())
    }
}

fn server_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .and_then(Value::as_str)
        .or_else(|| value.get("message").and_then(Value::as_str))
        .or_else(|| value.get("error").and_then(Value::as_str))
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::server_message;

    #[test]
    fn server_message_reads_openai_and_flat_shapes() {
        assert_eq!(
            server_message(r#"{"error":{"message":"Authentication Fails","type":"auth"}}"#)
                .as_deref(),
            Some("Authentication Fails")
        );
        assert_eq!(
            server_message(r#"{"message":"quota exceeded"}"#).as_deref(),
            Some("quota exceeded")
        );
        assert_eq!(
            server_message(r#"{"error":"bad image"}"#).as_deref(),
            Some("bad image")
        );
        assert_eq!(server_message("<html>502</html>"), None);
        assert_eq!(server_message(r#"{"error":{"message":"  "}}"#), None);
    }
}
