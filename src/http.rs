use crate::config::HttpConfig;
use reqwest::Client;

const USER_AGENT: &str = concat!("vibe-workbench/", env!("CARGO_PKG_VERSION"));

/// One client for all providers. Hitting `timeout` surfaces as a transport
/// failure of the stage that made the call.
pub fn build_client(config: &HttpConfig) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .build()
}
