use crate::config::HttpConfig;
use reqwest::Client;

pub fn build_client(config: &HttpConfig) -> Client {
    Client::builder()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .user_agent(concat!("stocksync/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| Client::new())
}
