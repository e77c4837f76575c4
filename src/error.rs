use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct GenerationError {
    stage: &'static str,
    message: String,
    status: Option<u16>,
    kind: GenerationErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationErrorKind {
    /// The request never produced a response (connect, timeout, body read).
    Transport,
    /// Non-2xx answer from the provider.
    Remote,
    /// 2xx answer without the field we need.
    MalformedResponse,
    /// Rejected locally before any remote call.
    Validation,
}

impl fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GenerationErrorKind::Transport => "transport_error",
            GenerationErrorKind::Remote => "remote_error",
            GenerationErrorKind::MalformedResponse => "malformed_response",
            GenerationErrorKind::Validation => "validation_error",
        };
        f.write_str(label)
    }
}

impl GenerationError {
    pub fn transport(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            status: None,
            kind: GenerationErrorKind::Transport,
        }
    }

    pub fn remote(stage: &'static str, status: u16, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            status: Some(status),
            kind: GenerationErrorKind::Remote,
        }
    }

    pub fn malformed(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            status: None,
            kind: GenerationErrorKind::MalformedResponse,
        }
    }

    pub fn validation(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            status: None,
            kind: GenerationErrorKind::Validation,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> GenerationErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }
}
