use crate::config::ProviderConfig;
use crate::error::GenerationError;
use crate::fanout::{self, Branch, settle_all};
use crate::llm::{
    ChatClient, ChatMessage, ContentPart, ImageClient, Sampling, SceneRequest, inline_image,
};
use crate::models::{
    CopywritingVersion, Credentials, GeneratedImage, GenerationResult, ProductInput,
};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    time::Instant,
};
use tracing::{info, warn};

pub const CAPTION_STAGE: &str = "caption";
pub const COPY_STAGE: &str = "copy";
pub const SCENE_STAGE: &str = "scene";

const SYSTEM_PROMPT: &str = "你是一个资深的电商营销专家，擅长撰写高转化率的商品种草文案。";
const CAPTION_INSTRUCTION: &str =
    "请详细描述这张电商商品图片中的内容，包括商品外观、颜色、材质、使用场景等关键信息。";
const CLOSING_INSTRUCTION: &str = "请输出包含吸睛标题、核心卖点和行动号召的完整文案。";
const DEFAULT_TITLE: &str = "种草推荐";

const CAPTION_SAMPLING: Sampling = Sampling {
    max_tokens: Some(512),
    temperature: Some(0.7),
    top_p: Some(0.7),
    frequency_penalty: Some(0.5),
    n: Some(1),
};

/// Anything that can turn a product into copy and images. The bulk pipeline
/// only talks to this seam.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate_with(
        &self,
        input: ProductInput,
        credentials: &Credentials,
    ) -> Result<GenerationResult, GenerationError>;
}

/// Chains caption → copy + scene for one product.
pub struct Orchestrator {
    http: Client,
    copy: ChatClient,
    captioner: ChatClient,
    images: ImageClient,
}

impl Orchestrator {
    pub fn new(http: Client, providers: ProviderConfig) -> Self {
        Self {
            copy: ChatClient::new(http.clone(), providers.text),
            captioner: ChatClient::new(http.clone(), providers.caption),
            images: ImageClient::new(http.clone(), providers.image),
            http,
        }
    }

    /// Produces one copywriting version plus one generated scene image, or two
    /// placeholder images when the scene could not be rendered. Only a copy
    /// failure fails the call.
    pub async fn generate(
        &self,
        input: &ProductInput,
        text_key: &str,
        caption_key: Option<&str>,
        image_key: Option<&str>,
    ) -> Result<GenerationResult, GenerationError> {
        let text_key = text_key.trim();
        if text_key.is_empty() {
            return Err(GenerationError::validation(
                "generate",
                "text-generation API key is not configured",
            ));
        }
        let caption_key = caption_key.map(str::trim).filter(|key| !key.is_empty());
        let image_key = image_key.map(str::trim).filter(|key| !key.is_empty());
        let source = input.image_source();

        info!(
            target = "vibe.orchestrator",
            product = %input.name,
            has_image = source.is_some(),
            caption = caption_key.is_some(),
            scene = image_key.is_some(),
            "generation started"
        );
        let started = Instant::now();

        let caption = match (caption_key, source.as_deref()) {
            (Some(key), Some(source)) => self.caption(key, source).await,
            _ => String::new(),
        };

        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(copy_prompt(input, &caption)),
        ];
        let mut branches = vec![Branch::critical(
            COPY_STAGE,
            self.copy
                .complete(COPY_STAGE, text_key, &messages, Sampling::default()),
        )];
        if let (Some(key), Some(source)) = (image_key, source.as_deref()) {
            branches.push(Branch::best_effort(
                SCENE_STAGE,
                self.scene(key, source, input),
            ));
        }

        let mut settled = settle_all(branches).await.map_err(|failure| {
            warn!(
                target = "vibe.orchestrator",
                stage = failure.label,
                kind = %failure.error.kind(),
                error = %failure.error,
                "copy generation failed"
            );
            failure.error
        })?;

        let content = fanout::take(&mut settled, COPY_STAGE).unwrap_or_else(|| {
            Err(GenerationError::malformed(COPY_STAGE, "copy branch did not settle"))
        })?;

        let scene_url = match fanout::take(&mut settled, SCENE_STAGE) {
            Some(Ok(url)) => Some(url),
            Some(Err(err)) => {
                warn!(
                    target = "vibe.orchestrator",
                    kind = %err.kind(),
                    error = %err,
                    "scene generation failed; using placeholders"
                );
                None
            }
            None => None,
        };

        let result = assemble(input, content, scene_url);
        info!(
            target = "vibe.orchestrator",
            product = %input.name,
            images = result.images.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generation finished"
        );
        Ok(result)
    }

    async fn caption(&self, key: &str, source: &str) -> String {
        match self.describe(key, source).await {
            Ok(caption) => caption.trim().to_string(),
            Err(err) => {
                warn!(
                    target = "vibe.orchestrator",
                    kind = %err.kind(),
                    error = %err,
                    "caption failed; continuing with text only"
                );
                String::new()
            }
        }
    }

    async fn describe(&self, key: &str, source: &str) -> Result<String, GenerationError> {
        let image = inline_image(&self.http, CAPTION_STAGE, source).await?;
        let message = ChatMessage::user_parts(vec![
            ContentPart::text(CAPTION_INSTRUCTION),
            ContentPart::image(image.data_uri()),
        ]);
        self.captioner
            .complete(CAPTION_STAGE, key, &[message], CAPTION_SAMPLING)
            .await
    }

    async fn scene(
        &self,
        key: &str,
        source: &str,
        input: &ProductInput,
    ) -> Result<String, GenerationError> {
        let image = inline_image(&self.http, SCENE_STAGE, source).await?;
        let prompt = scene_prompt(&input.name, &input.target_audience);
        self.images
            .generate(
                SCENE_STAGE,
                key,
                SceneRequest {
                    prompt: &prompt,
                    source: &image,
                },
            )
            .await
    }
}

#[async_trait]
impl ContentGenerator for Orchestrator {
    async fn generate_with(
        &self,
        input: ProductInput,
        credentials: &Credentials,
    ) -> Result<GenerationResult, GenerationError> {
        let text_key = credentials.text_key().ok_or_else(|| {
            GenerationError::validation("generate", "text-generation API key is not configured")
        })?;
        self.generate(
            &input,
            text_key,
            credentials.caption_key(),
            credentials.image_key(),
        )
        .await
    }
}

pub fn copy_prompt(input: &ProductInput, caption: &str) -> String {
    let mut prompt = format!(
        "请为商品『{}』撰写文案。品牌：{}，类目：{}，目标受众：{}。",
        input.name.trim(),
        input.brand.trim(),
        input.category.trim(),
        input.target_audience.trim(),
    );
    if let Some(points) = input
        .selling_points
        .as_deref()
        .map(str::trim)
        .filter(|points| !points.is_empty())
    {
        prompt.push_str(&format!("卖点：{points}。"));
    }
    let caption = caption.trim();
    if !caption.is_empty() {
        prompt.push_str("\n\n商品图片分析：");
        prompt.push_str(caption);
    }
    prompt.push_str("\n\n");
    prompt.push_str(CLOSING_INSTRUCTION);
    prompt
}

fn scene_prompt(name: &str, audience: &str) -> String {
    format!(
        "电商产品高级摄影，完美保留图中商品主体。商品是：{}。放置在：符合{}喜好的场景中。电影级光影，8k分辨率，极其逼真。",
        name.trim(),
        audience.trim()
    )
}

fn assemble(input: &ProductInput, content: String, scene_url: Option<String>) -> GenerationResult {
    let stamp = Utc::now().timestamp_millis();
    let title = content
        .lines()
        .next()
        .map(|line| line.trim().trim_start_matches('#').trim())
        .filter(|line| !line.is_empty())
        .unwrap_or(DEFAULT_TITLE)
        .to_string();

    let images = match scene_url {
        Some(url) => vec![GeneratedImage {
            id: format!("img-{stamp}-1"),
            url,
            description: "商品场景展示图 1".to_string(),
        }],
        None => placeholder_images(input, stamp),
    };

    GenerationResult {
        copywritings: vec![CopywritingVersion {
            id: format!("cw-{stamp}"),
            title,
            content,
        }],
        images,
    }
}

/// Two stand-in images whose URLs depend only on the product, never on time.
pub fn placeholder_images(input: &ProductInput, stamp: i64) -> Vec<GeneratedImage> {
    let seed = placeholder_seed(input);
    vec![
        GeneratedImage {
            id: format!("img-{stamp}-1"),
            url: format!("https://picsum.photos/400/400?random={seed}"),
            description: "商品场景展示图".to_string(),
        },
        GeneratedImage {
            id: format!("img-{stamp}-2"),
            url: format!("https://picsum.photos/400/401?random={}", seed + 1),
            description: "商品细节展示图".to_string(),
        },
    ]
}

fn placeholder_seed(input: &ProductInput) -> u64 {
    let mut hasher = DefaultHasher::new();
    input.name.trim().hash(&mut hasher);
    input.brand.trim().hash(&mut hasher);
    input.target_audience.trim().hash(&mut hasher);
    hasher.finish() % 1_000_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use crate::error::GenerationErrorKind;
    use crate::testing::Upstream;
    use axum::http::StatusCode;
    use serde_json::json;

    fn providers(upstream: &Upstream) -> ProviderConfig {
        ProviderConfig {
            text: EndpointConfig {
                url: upstream.url("/text"),
                model: "deepseek-chat".into(),
            },
            caption: EndpointConfig {
                url: upstream.url("/caption"),
                model: "Qwen/Qwen3-VL-8B-Instruct".into(),
            },
            image: EndpointConfig {
                url: upstream.url("/image"),
                model: "doubao-seedream-4-0-250828".into(),
            },
        }
    }

    fn headphones(preview: Option<String>) -> ProductInput {
        ProductInput {
            name: "降噪头戴式蓝牙耳机 Pro Max".into(),
            brand: "索尼 (Sony)".into(),
            category: "数码家电 / 影音配件".into(),
            target_audience: "年轻白领".into(),
            image_preview: preview,
            ..ProductInput::default()
        }
    }

    fn text_ok() -> serde_json::Value {
        json!({"choices":[{"message":{"content":"降噪新体验\n通勤路上的安静角落。\n立即下单！"}}]})
    }

    fn data_preview() -> Option<String> {
        Some("data:image/png;base64,iVBORw0KGgo=".into())
    }

    #[tokio::test]
    async fn full_chain_uses_caption_and_generated_scene() {
        let upstream = Upstream::start()
            .respond_bytes("/photo.jpg", "image/jpeg", b"\xff\xd8\xff")
            .respond(
                "/caption",
                StatusCode::OK,
                json!({"choices":[{"message":{"content":"黑色头戴耳机，哑光材质"}}]}),
            )
            .respond("/text", StatusCode::OK, text_ok())
            .respond(
                "/image",
                StatusCode::OK,
                json!({"data":[{"url":"https://cdn.example.com/scene.jpeg"}]}),
            )
            .spawn()
            .await;
        let orchestrator = Orchestrator::new(Client::new(), providers(&upstream));
        let input = headphones(Some(upstream.url("/photo.jpg")));

        let result = orchestrator
            .generate(&input, "sk-text", Some("sk-vlm"), Some("ark-img"))
            .await
            .expect("generation");

        assert_eq!(result.copywritings.len(), 1);
        let copy = &result.copywritings[0];
        assert_eq!(copy.title, "降噪新体验");
        assert!(copy.content.ends_with("立即下单！"));
        assert!(copy.id.starts_with("cw-"));
        assert_eq!(result.images.len(), 1);
        assert_eq!(result.images[0].url, "https://cdn.example.com/scene.jpeg");

        let text = upstream.last_request("/text").unwrap();
        let user = text.body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("商品图片分析：黑色头戴耳机，哑光材质"));
        assert_eq!(text.body["messages"][0]["role"], json!("system"));

        let caption = upstream.last_request("/caption").unwrap();
        assert_eq!(caption.body["max_tokens"], json!(512));
        assert_eq!(caption.body["n"], json!(1));
        assert!(
            caption.body["messages"][0]["content"][1]["image_url"]["url"]
                .as_str()
                .unwrap()
                .starts_with("data:image/jpeg;base64,")
        );

        let scene = upstream.last_request("/image").unwrap();
        let prompt = scene.body["prompt"].as_str().unwrap();
        assert!(prompt.contains("降噪头戴式蓝牙耳机 Pro Max"));
        assert!(prompt.contains("年轻白领"));
    }

    #[tokio::test]
    async fn text_401_is_remote_error_even_when_scene_succeeds() {
        let upstream = Upstream::start()
            .respond(
                "/text",
                StatusCode::UNAUTHORIZED,
                json!({"error":{"message":"Authentication Fails, Your api key is invalid"}}),
            )
            .respond(
                "/image",
                StatusCode::OK,
                json!({"data":[{"url":"https://cdn.example.com/scene.jpeg"}]}),
            )
            .spawn()
            .await;
        let orchestrator = Orchestrator::new(Client::new(), providers(&upstream));

        let err = orchestrator
            .generate(&headphones(data_preview()), "bad", None, Some("ark-img"))
            .await
            .expect_err("401 is fatal");
        assert_eq!(err.kind(), GenerationErrorKind::Remote);
        assert_eq!(err.stage(), COPY_STAGE);
        assert_eq!(err.status(), Some(401));
        assert!(err.detail().contains("Authentication Fails"));
        assert_eq!(upstream.hits("/image"), 1);
    }

    #[tokio::test]
    async fn scene_failure_falls_back_to_the_same_two_placeholders() {
        let upstream = Upstream::start()
            .respond("/text", StatusCode::OK, text_ok())
            .respond(
                "/image",
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"message":"render queue full"}),
            )
            .spawn()
            .await;
        let orchestrator = Orchestrator::new(Client::new(), providers(&upstream));
        let input = headphones(data_preview());

        let first = orchestrator
            .generate(&input, "sk-text", None, Some("ark-img"))
            .await
            .expect("fallback");
        let second = orchestrator
            .generate(&input, "sk-text", None, Some("ark-img"))
            .await
            .expect("fallback");

        assert_eq!(first.images.len(), 2);
        let urls = |r: &GenerationResult| r.images.iter().map(|i| i.url.clone()).collect::<Vec<_>>();
        assert_eq!(urls(&first), urls(&second));
        assert!(first.images[0].url.starts_with("https://picsum.photos/400/400?random="));
        assert!(first.images[1].url.starts_with("https://picsum.photos/400/401?random="));
    }

    #[tokio::test]
    async fn missing_image_key_never_calls_the_image_endpoint() {
        let upstream = Upstream::start()
            .respond("/text", StatusCode::OK, text_ok())
            .spawn()
            .await;
        let orchestrator = Orchestrator::new(Client::new(), providers(&upstream));

        let result = orchestrator
            .generate(&headphones(data_preview()), "sk-text", None, Some("  "))
            .await
            .expect("copy only");
        assert_eq!(result.images.len(), 2);
        assert_eq!(upstream.hits("/image"), 0);
    }

    #[tokio::test]
    async fn caption_failure_is_swallowed() {
        let upstream = Upstream::start()
            .respond(
                "/caption",
                StatusCode::TOO_MANY_REQUESTS,
                json!({"error":{"message":"rate limited"}}),
            )
            .respond("/text", StatusCode::OK, text_ok())
            .spawn()
            .await;
        let orchestrator = Orchestrator::new(Client::new(), providers(&upstream));

        let result = orchestrator
            .generate(&headphones(data_preview()), "sk-text", Some("sk-vlm"), None)
            .await
            .expect("caption failure is not fatal");
        assert_eq!(result.copywritings.len(), 1);

        assert_eq!(upstream.hits("/caption"), 1);
        let text = upstream.last_request("/text").unwrap();
        let user = text.body["messages"][1]["content"].as_str().unwrap();
        assert!(!user.contains("商品图片分析"));
    }

    #[tokio::test]
    async fn image_without_caption_key_skips_caption_stage() {
        let upstream = Upstream::start()
            .respond("/text", StatusCode::OK, text_ok())
            .spawn()
            .await;
        let orchestrator = Orchestrator::new(Client::new(), providers(&upstream));

        orchestrator
            .generate(&headphones(data_preview()), "sk-text", None, None)
            .await
            .expect("generation");
        assert_eq!(upstream.hits("/caption"), 0);
        assert_eq!(upstream.hits("/text"), 1);
    }

    #[tokio::test]
    async fn malformed_copy_response_fails_the_call() {
        let upstream = Upstream::start()
            .respond("/text", StatusCode::OK, json!({"choices":[{"message":{}}]}))
            .spawn()
            .await;
        let orchestrator = Orchestrator::new(Client::new(), providers(&upstream));

        let err = orchestrator
            .generate(&headphones(None), "sk-text", None, None)
            .await
            .expect_err("no content");
        assert_eq!(err.kind(), GenerationErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn blank_text_key_is_rejected_before_any_call() {
        let upstream = Upstream::start().spawn().await;
        let orchestrator = Orchestrator::new(Client::new(), providers(&upstream));

        let err = orchestrator
            .generate(&headphones(data_preview()), "   ", Some("v"), Some("i"))
            .await
            .expect_err("no key");
        assert_eq!(err.kind(), GenerationErrorKind::Validation);
        assert_eq!(upstream.hits("/caption"), 0);
        assert_eq!(upstream.hits("/text"), 0);
        assert_eq!(upstream.hits("/image"), 0);
    }

    #[tokio::test]
    async fn content_generator_reads_keys_from_credentials() {
        let upstream = Upstream::start()
            .respond("/text", StatusCode::OK, text_ok())
            .spawn()
            .await;
        let orchestrator = Orchestrator::new(Client::new(), providers(&upstream));

        let err = orchestrator
            .generate_with(headphones(None), &Credentials::default())
            .await
            .expect_err("no text key");
        assert_eq!(err.kind(), GenerationErrorKind::Validation);

        let credentials = Credentials {
            text_key: Some("sk-text".into()),
            ..Credentials::default()
        };
        let result = orchestrator
            .generate_with(headphones(None), &credentials)
            .await
            .expect("generation");
        assert_eq!(result.images.len(), 2);
        assert_eq!(
            upstream.last_request("/text").unwrap().authorization.as_deref(),
            Some("Bearer sk-text")
        );
    }

    #[test]
    fn copy_prompt_carries_selling_points_and_closing() {
        let input = ProductInput {
            selling_points: Some("40 小时续航".into()),
            ..headphones(None)
        };
        let prompt = copy_prompt(&input, "");
        assert!(prompt.starts_with("请为商品『降噪头戴式蓝牙耳机 Pro Max』撰写文案。品牌：索尼 (Sony)"));
        assert!(prompt.contains("目标受众：年轻白领。卖点：40 小时续航。"));
        assert!(!prompt.contains("核心卖点："));
        assert!(prompt.ends_with(CLOSING_INSTRUCTION));
        assert!(!prompt.contains("商品图片分析"));
    }

    #[test]
    fn title_falls_back_when_first_line_is_blank() {
        let result = assemble(&headphones(None), "\n正文".into(), None);
        assert_eq!(result.copywritings[0].title, DEFAULT_TITLE);

        let result = assemble(&headphones(None), "## 夏日清凉\n正文".into(), None);
        assert_eq!(result.copywritings[0].title, "夏日清凉");
    }
}
