use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use tracing::{debug, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Browser-like HTTP client. Bodies are always decoded as UTF-8.
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new() -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"));
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Fetcher { client })
    }

    /// GET `url`; non-2xx statuses are errors.
    pub async fn fetch_html(&self, url: &str, timeout: Duration) -> Result<String> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("bad status from {}", url))?;
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed to read body of {}", url))?;
        debug!("Fetched {} ({} bytes)", url, bytes.len());
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Like `fetch_html`, but a failure is logged and becomes `None`.
    pub async fn try_fetch_html(&self, url: &str, timeout: Duration) -> Option<String> {
        match self.fetch_html(url, timeout).await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!("Fetch failed for {}: {:#}", url, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn fetches_utf8_body_with_browser_headers() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/ct/1.html")
                .header("accept-language", "zh-CN,zh;q=0.9,en;q=0.8");
            then.status(200)
                .header("content-type", "text/html")
                .body("<p>定价：4500日元</p>");
        });

        let fetcher = Fetcher::new().unwrap();
        let body = fetcher
            .fetch_html(&server.url("/ct/1.html"), Duration::from_secs(5))
            .await
            .unwrap();
        mock.assert();
        assert!(body.contains("4500日元"));
    }

    #[tokio::test]
    async fn non_2xx_is_an_error() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404).body("not found");
        });

        let fetcher = Fetcher::new().unwrap();
        let url = server.url("/missing");
        assert!(fetcher.fetch_html(&url, Duration::from_secs(5)).await.is_err());
        assert_eq!(fetcher.try_fetch_html(&url, Duration::from_secs(5)).await, None);
        mock.assert_hits(2);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/bad");
            then.status(200).body(vec![b'o', b'k', 0xff]);
        });

        let fetcher = Fetcher::new().unwrap();
        let body = fetcher
            .fetch_html(&server.url("/bad"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(body, "ok\u{fffd}");
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_millis(800)).body("late");
        });

        let fetcher = Fetcher::new().unwrap();
        let body = fetcher
            .try_fetch_html(&server.url("/slow"), Duration::from_millis(100))
            .await;
        assert_eq!(body, None);
    }
}
