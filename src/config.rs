use std::{
    env,
    net::{IpAddr, Ipv4Addr},
    path::PathBuf,
    time::Duration,
};

pub const CREDENTIALS_NAMESPACE: &str = "easy_vibe_api_keys";
pub const LIBRARY_NAMESPACE: &str = "easy_vibe_library_data";

const DEFAULT_TEXT_URL: &str = "https://api.deepseek.com/chat/completions";
const DEFAULT_TEXT_MODEL: &str = "deepseek-chat";
const DEFAULT_CAPTION_URL: &str = "https://api.siliconflow.cn/v1/chat/completions";
const DEFAULT_CAPTION_MODEL: &str = "Qwen/Qwen3-VL-8B-Instruct";
const DEFAULT_IMAGE_URL: &str = "https://ark.cn-beijing.volces.com/api/v3/images/generations";
const DEFAULT_IMAGE_MODEL: &str = "doubao-seedream-4-0-250828";

#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub url: String,
    pub model: String,
}

impl EndpointConfig {
    fn from_env(url_var: &str, model_var: &str, url: &str, model: &str) -> Self {
        Self {
            url: env_or(url_var, url),
            model: env_or(model_var, model),
        }
    }
}

/// Endpoints and model ids of the three providers.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub text: EndpointConfig,
    pub caption: EndpointConfig,
    pub image: EndpointConfig,
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        Self {
            text: EndpointConfig::from_env(
                "TEXT_API_URL",
                "TEXT_MODEL",
                DEFAULT_TEXT_URL,
                DEFAULT_TEXT_MODEL,
            ),
            caption: EndpointConfig::from_env(
                "CAPTION_API_URL",
                "CAPTION_MODEL",
                DEFAULT_CAPTION_URL,
                DEFAULT_CAPTION_MODEL,
            ),
            image: EndpointConfig::from_env(
                "IMAGE_API_URL",
                "IMAGE_MODEL",
                DEFAULT_IMAGE_URL,
                DEFAULT_IMAGE_MODEL,
            ),
        }
    }
}

/// Timeouts applied to every provider call.
#[derive(Debug, Clone, Copy)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl HttpConfig {
    pub fn from_env() -> Self {
        Self {
            timeout: Duration::from_secs(secs_or("HTTP_TIMEOUT_SECS", 90)),
            connect_timeout: Duration::from_secs(secs_or("HTTP_CONNECT_TIMEOUT_SECS", 10)),
        }
    }
}

fn secs_or(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    pub body_limit: usize,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let bind_addr = env::var("BIND_ADDR")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        let port = env::var("PORT")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(8787);
        let body_limit = env::var("REQUEST_MAX_BYTES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(16 * 1024 * 1024);
        Self {
            bind_addr,
            port,
            body_limit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub redis_url: Option<String>,
}

impl StorageConfig {
    pub fn from_env() -> Self {
        Self {
            data_dir: PathBuf::from(env_or("VIBE_DATA_DIR", "./.vibe-data")),
            redis_url: env::var("REDIS_URL")
                .ok()
                .filter(|value| !value.trim().is_empty()),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}
