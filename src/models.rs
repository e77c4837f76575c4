use crate::error::GenerationError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt;

/// Product context for one generation request.
///
/// `image` is the raw upload (base64 in transit); `image_preview` is whatever
/// URI the front-end shows for it, either a `data:` URI or a remote URL.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    pub name: String,
    pub brand: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub selling_points: Option<String>,
    #[serde(default)]
    pub image: Option<ImageUpload>,
    #[serde(default)]
    pub image_preview: Option<String>,
}

impl ProductInput {
    /// Checks the single-product form before anything is sent upstream.
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.name.trim().is_empty() {
            return Err(GenerationError::validation("input", "product name is required"));
        }
        if self.brand.trim().is_empty() {
            return Err(GenerationError::validation("input", "brand is required"));
        }
        if let Some(upload) = &self.image {
            upload.validate()?;
        }
        Ok(())
    }

    /// Preview URI if present, else a data URI built from the binary upload.
    pub fn image_source(&self) -> Option<String> {
        if let Some(preview) = self
            .image_preview
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            return Some(preview.to_string());
        }
        self.image.as_ref().map(ImageUpload::to_data_uri)
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUpload {
    pub mime_type: String,
    /// Base64 payload, no `data:` prefix.
    pub data: String,
}

impl fmt::Debug for ImageUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageUpload")
            .field("mime_type", &self.mime_type)
            .field("data_len", &self.data.len())
            .finish()
    }
}

impl ImageUpload {
    pub fn validate(&self) -> Result<(), GenerationError> {
        let mime = self.mime_type.trim().to_ascii_lowercase();
        if !mime.starts_with("image/") {
            return Err(GenerationError::validation(
                "upload",
                format!("unsupported file type `{}`; only images are accepted", self.mime_type),
            ));
        }
        let payload = self.data.trim();
        if payload.is_empty() {
            return Err(GenerationError::validation("upload", "image payload is empty"));
        }
        STANDARD
            .decode(payload)
            .map_err(|err| GenerationError::validation("upload", format!("invalid base64: {err}")))?;
        Ok(())
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type.trim(), self.data.trim())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopywritingVersion {
    pub id: String,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub id: String,
    pub url: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenerationResult {
    pub copywritings: Vec<CopywritingVersion>,
    pub images: Vec<GeneratedImage>,
}

/// The three provider keys. Stored under the legacy `llmKey`/`vlmKey`/`imageGenKey`
/// names; blank values count as absent.
#[skip_serializing_none]
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(rename = "llmKey", alias = "textKey", default)]
    pub text_key: Option<String>,
    #[serde(rename = "vlmKey", alias = "captionKey", default)]
    pub caption_key: Option<String>,
    #[serde(rename = "imageGenKey", alias = "imageKey", default)]
    pub image_key: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("text_key", &self.text_key().map(|_| "***"))
            .field("caption_key", &self.caption_key().map(|_| "***"))
            .field("image_key", &self.image_key().map(|_| "***"))
            .finish()
    }
}

impl Credentials {
    pub fn text_key(&self) -> Option<&str> {
        non_blank(&self.text_key)
    }

    pub fn caption_key(&self) -> Option<&str> {
        non_blank(&self.caption_key)
    }

    pub fn image_key(&self) -> Option<&str> {
        non_blank(&self.image_key)
    }

    pub fn status(&self) -> CredentialStatus {
        CredentialStatus {
            text_key: self.text_key().is_some(),
            caption_key: self.caption_key().is_some(),
            image_key: self.image_key().is_some(),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStatus {
    pub text_key: bool,
    pub caption_key: bool,
    pub image_key: bool,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
