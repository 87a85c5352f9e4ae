//! Website fetching.
//!
//! This module owns the shared HTTP session used for a whole pipeline run
//! and the [`PageFetcher`] seam that turns a lead's URL into a
//! [`SignalSet`]. Fetch failures are classified into signal sets rather
//! than surfaced as errors.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use tracing::debug;
use url::Url;

use crate::lead::SignalSet;
use crate::signals::extract_signals;
use crate::site::{is_weak_site, with_scheme};
use crate::{LeadgenError, Result};

/// HTTP client configuration for fetching business websites.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Request timeout in seconds.
    pub timeout: u64,
    /// Browser-like User-Agent string; many small-business hosts block bots.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: 12,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
        }
    }
}

/// Builds the HTTP session shared by every adapter in a run.
///
/// Certificate validation is disabled: signals are judged on page content,
/// and whether a site serves HTTPS at all is recorded separately. Redirects
/// are followed with reqwest's default policy.
pub fn build_client(config: &FetchConfig) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-IN,en;q=0.9"));

    Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .danger_accept_invalid_certs(true)
        .pool_max_idle_per_host(10)
        .build()
        .map_err(LeadgenError::HttpError)
}

/// Anything that can turn a URL into website signals.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Never fails: unreachable sites come back as a "scrape failed" set.
    async fn fetch_signals(&self, url: &str) -> SignalSet;
}

/// A successfully fetched page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: String,
    pub status: u16,
    pub body: String,
}

/// [`PageFetcher`] backed by a real HTTP GET.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    pub fn new(client: Client, config: FetchConfig) -> Self {
        Self { client, config }
    }

    /// Fetches a page, following redirects. Statuses of 400 and above are errors.
    pub async fn fetch_page(&self, url: &str) -> Result<FetchedPage> {
        let parsed_url = Url::parse(url).map_err(|e| LeadgenError::InvalidUrl(e.to_string()))?;

        let response = self
            .client
            .get(parsed_url)
            .timeout(Duration::from_secs(self.config.timeout))
            .send()
            .await
            .map_err(|e| classify(e, self.config.timeout))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        if status >= 400 {
            return Err(LeadgenError::Api { status, message: format!("HTTP {} from {}", status, final_url) });
        }

        let body = response.text().await.map_err(|e| classify(e, self.config.timeout))?;

        Ok(FetchedPage { final_url, status, body })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_signals(&self, url: &str) -> SignalSet {
        if url.trim().is_empty() {
            return SignalSet::no_website();
        }

        let url = with_scheme(url);
        if is_weak_site(&url) {
            debug!(%url, "placeholder host, skipping fetch");
            return SignalSet::placeholder();
        }

        match self.fetch_page(&url).await {
            Ok(page) => {
                debug!(%url, status = page.status, final_url = %page.final_url, "fetched");
                extract_signals(&page.body, &page.final_url)
            }
            Err(LeadgenError::Timeout { .. }) => {
                debug!(%url, "fetch timed out");
                SignalSet::failed("timeout")
            }
            Err(e) => {
                debug!(%url, error = %e, "fetch failed");
                SignalSet::failed(&e.to_string())
            }
        }
    }
}

fn classify(err: reqwest::Error, timeout: u64) -> LeadgenError {
    if err.is_timeout() { LeadgenError::Timeout { timeout } } else { LeadgenError::HttpError(err) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CannedResponse, serve};

    fn fetcher() -> HttpFetcher {
        let config = FetchConfig::default();
        HttpFetcher::new(build_client(&config).unwrap(), config)
    }

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.timeout, 12);
        assert!(config.user_agent.contains("Mozilla"));
    }

    #[tokio::test]
    async fn test_empty_url_is_no_website() {
        let signals = fetcher().fetch_signals("  ").await;
        assert!(signals.no_website);
        assert!(!signals.scrape_failed);
    }

    #[tokio::test]
    async fn test_weak_host_short_circuits() {
        let signals = fetcher().fetch_signals("instagram.com/glowskin").await;
        assert!(!signals.no_website);
        assert!(!signals.scrape_failed);
        assert!(signals.final_url.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_extracts_signals() {
        let server = serve(vec![CannedResponse::html(
            200,
            r#"<html><head><title>Sharma CA</title><meta name="viewport" content="width=device-width"></head><body>Contact us</body></html>"#,
        )])
        .await;

        let signals = fetcher().fetch_signals(&server.base_url).await;
        assert_eq!(signals.page_title, "Sharma CA");
        assert!(signals.has_mobile_viewport);
        assert!(signals.has_contact_form);
        assert!(!signals.has_ssl);
        assert!(signals.final_url.starts_with(&server.base_url));
    }

    #[tokio::test]
    async fn test_fetch_page_keeps_status_and_body() {
        let server = serve(vec![CannedResponse::html(203, "<p>cached copy</p>")]).await;

        let page = fetcher().fetch_page(&server.base_url).await.unwrap();
        assert_eq!(page.status, 203);
        assert_eq!(page.body, "<p>cached copy</p>");
        assert!(page.final_url.starts_with(&server.base_url));
    }

    #[tokio::test]
    async fn test_fetch_follows_redirects() {
        let server = serve(vec![
            CannedResponse::redirect("/home"),
            CannedResponse::html(200, "<html><head><title>Home</title></head></html>"),
        ])
        .await;

        let signals = fetcher().fetch_signals(&server.base_url).await;
        assert_eq!(signals.page_title, "Home");
        assert!(signals.final_url.ends_with("/home"));
    }

    #[tokio::test]
    async fn test_error_status_is_scrape_failed() {
        let server = serve(vec![CannedResponse::html(404, "not here")]).await;

        let signals = fetcher().fetch_signals(&server.base_url).await;
        assert!(signals.scrape_failed);
        assert!(!signals.no_website);
        assert!(signals.scrape_error.contains("404"));
    }

    #[tokio::test]
    async fn test_invalid_url_is_scrape_failed() {
        let signals = fetcher().fetch_signals("http://exa mple.com").await;
        assert!(signals.scrape_failed);
    }

    #[test]
    fn test_error_timeout_message() {
        let err = LeadgenError::Timeout { timeout: 12 };
        assert!(err.to_string().contains("12"));
    }
}
