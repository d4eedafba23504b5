//! REST client for one backend's v9 REST API.
//!
//! Split over extension traits the way a larger client would be, even
//! though this bridge only needs the message and reaction surface.

mod message;
mod reaction;

pub use message::*;
pub use reaction::*;

use std::time::Duration;

use reqwest::{Method, RequestBuilder};

use crate::error::Result;

const GATEWAY_VERSION: u8 = 9;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for one endpoint's REST API. Stateless besides its configuration;
/// each call opens and closes its own HTTPS request, no connection pooling.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    api_host: String,
    token: String,
}

impl RestClient {
    pub fn new(api_host: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(RestClient { http, api_host: api_host.into(), token: token.into() })
    }

    fn url(&self, path: &str) -> String {
        format!("https://{}/api/v{}{}", self.api_host, GATEWAY_VERSION, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header("Authorization", format!("Bot {}", self.token))
            .header("Content-Type", "application/json")
    }
}

/// The current Discord snowflake approximation used as a message `nonce`.
pub fn generate_nonce() -> u64 {
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    (now_ms - 1_420_070_400_000) << 22
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_is_monotonic_across_calls() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert!(b >= a);
    }
}
