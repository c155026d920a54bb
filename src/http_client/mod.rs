//! HTTP client for the source site and media origins.

mod pause;
mod response;
mod user_agent;

pub use pause::{PauseGate, DEFAULT_PAUSE};
pub use user_agent::{resolve_user_agent, USER_AGENT};

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::RANGE;
use reqwest::{Client, RequestBuilder, Response};
use tracing::debug;

use crate::fetch::{FetchError, Fetcher};
use response::{check_status, collect_headers};

/// HTTP client with a politeness delay and a site-wide pause gate.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    request_delay: Duration,
    pause: PauseGate,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new(timeout: Duration, request_delay: Duration) -> Result<Self, FetchError> {
        Self::with_user_agent(timeout, request_delay, None)
    }

    /// Create a new HTTP client with custom user agent configuration.
    pub fn with_user_agent(
        timeout: Duration,
        request_delay: Duration,
        user_agent_config: Option<&str>,
    ) -> Result<Self, FetchError> {
        let user_agent = resolve_user_agent(user_agent_config);
        let client = Client::builder()
            .user_agent(&user_agent)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            request_delay,
            pause: PauseGate::default(),
        })
    }

    #[cfg(test)]
    fn with_pause_gate(mut self, pause: PauseGate) -> Self {
        self.pause = pause;
        self
    }

    /// Send a request once no pause is in effect; a rate-limit answer starts one.
    async fn send(
        &self,
        method: &str,
        url: &str,
        request: RequestBuilder,
    ) -> Result<Response, FetchError> {
        self.pause.wait().await;

        let start = Instant::now();
        let response = request.send().await?;
        let status = response.status();
        debug!(
            "{} {} -> {} in {}ms",
            method,
            url,
            status.as_u16(),
            start.elapsed().as_millis()
        );

        if PauseGate::is_rate_limit(status.as_u16()) {
            self.pause.pause(status.as_u16()).await;
        }
        Ok(response)
    }

    async fn get(&self, url: &str) -> Result<Response, FetchError> {
        let response = self.send("GET", url, self.client.get(url)).await?;
        check_status(url, response.status())?;
        Ok(response)
    }
}

#[async_trait]
impl Fetcher for HttpClient {
    async fn get_page(&self, url: &str) -> Result<String, FetchError> {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
        Ok(self.get(url).await?.text().await?)
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        Ok(self.get(url).await?.bytes().await?.to_vec())
    }

    async fn head(&self, url: &str) -> Result<HashMap<String, String>, FetchError> {
        let head = self.send("HEAD", url, self.client.head(url)).await?;
        if head.status().is_success() {
            return Ok(collect_headers(head.headers()));
        }
        // Some origins refuse HEAD; a one-byte ranged GET carries the same validators.
        let ranged = self.client.get(url).header(RANGE, "bytes=0-0");
        let response = self.send("GET", url, ranged).await?;
        check_status(url, response.status())?;
        Ok(collect_headers(response.headers()))
    }
}
