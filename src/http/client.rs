// src/http/client.rs
use crate::config::HttpSettings;
use crate::utils::error::FetchError;
use rand::Rng;
use reqwest::header;
use std::time::{Duration, Instant};

const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const PDF_ACCEPT: &str = "application/pdf,application/octet-stream;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9,sv;q=0.8";

/// A successfully fetched text page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

impl FetchedPage {
    pub fn is_html(&self) -> bool {
        self.content_type.contains("text/html") || self.content_type.contains("xhtml")
    }

    pub fn is_pdf(&self) -> bool {
        self.content_type.contains("application/pdf")
    }
}

/// A successfully fetched binary payload.
#[derive(Debug, Clone)]
pub struct FetchedBytes {
    pub url: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Outcome of a single diagnostic request.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub status: u16,
    pub final_url: String,
    pub elapsed: Duration,
}

/// Shared HTTP client: one connection pool, rotating browser user agents and
/// a fixed pause before each request.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    user_agents: Vec<String>,
    request_delay: Duration,
}

impl HttpClient {
    pub fn new(settings: &HttpSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self {
            client,
            user_agents: settings.user_agents.clone(),
            request_delay: settings.request_delay(),
        })
    }

    /// User agent for the given attempt; attempts cycle through the list.
    pub fn user_agent(&self, attempt: u32) -> &str {
        if self.user_agents.is_empty() {
            return "Mozilla/5.0";
        }
        &self.user_agents[attempt as usize % self.user_agents.len()]
    }

    /// Random user agent for first attempts.
    pub fn random_user_agent(&self) -> &str {
        if self.user_agents.is_empty() {
            return "Mozilla/5.0";
        }
        let idx = rand::rng().random_range(0..self.user_agents.len());
        &self.user_agents[idx]
    }

    pub fn agent_count(&self) -> usize {
        self.user_agents.len()
    }

    async fn pause(&self) {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
    }

    async fn send_get(
        &self,
        url: &str,
        user_agent: &str,
        accept: &str,
    ) -> Result<reqwest::Response, FetchError> {
        let parsed = url::Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;

        self.pause().await;

        let response = self
            .client
            .get(parsed)
            .header(header::USER_AGENT, user_agent)
            .header(header::ACCEPT, accept)
            .header(header::ACCEPT_LANGUAGE, ACCEPT_LANGUAGE)
            .send()
            .await?; // Propagates reqwest::Error as FetchError::Network

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("HTTP error status: {} for URL: {}", status, url);
            if status == reqwest::StatusCode::FORBIDDEN {
                tracing::debug!("Received 403 Forbidden - site may be blocking automated requests");
            }
            return Err(FetchError::Http {
                status,
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    /// Fetches a page as text with a random user agent.
    pub async fn get_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let agent = self.random_user_agent().to_string();
        self.get_page_as(url, &agent).await
    }

    /// Fetches a page as text with a specific user agent.
    pub async fn get_page_as(&self, url: &str, user_agent: &str) -> Result<FetchedPage, FetchError> {
        let response = self.send_get(url, user_agent, HTML_ACCEPT).await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = content_type_of(&response);
        let body = response.text().await?;
        tracing::debug!("Fetched {} bytes from {}", body.len(), final_url);

        Ok(FetchedPage {
            url: final_url,
            status,
            content_type,
            body,
        })
    }

    /// Fetches a binary payload (PDF downloads).
    pub async fn get_bytes(&self, url: &str, user_agent: &str) -> Result<FetchedBytes, FetchError> {
        let response = self.send_get(url, user_agent, PDF_ACCEPT).await?;
        let final_url = response.url().to_string();
        let content_type = content_type_of(&response);
        let bytes = response.bytes().await?.to_vec();
        tracing::debug!("Downloaded {} bytes from {}", bytes.len(), final_url);

        Ok(FetchedBytes {
            url: final_url,
            content_type,
            bytes,
        })
    }

    /// HEAD request; true only for a final 200 response.
    pub async fn probe(&self, url: &str) -> bool {
        let Ok(parsed) = url::Url::parse(url) else {
            return false;
        };
        self.pause().await;

        match self
            .client
            .head(parsed)
            .header(header::USER_AGENT, self.random_user_agent())
            .send()
            .await
        {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(e) => {
                tracing::debug!("HEAD {} failed: {}", url, e);
                false
            }
        }
    }

    /// GET that reports status and timing instead of failing on non-2xx.
    pub async fn diagnose(&self, url: &str, user_agent: &str) -> Result<ProbeOutcome, FetchError> {
        let parsed = url::Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        let started = Instant::now();
        let response = self
            .client
            .get(parsed)
            .header(header::USER_AGENT, user_agent)
            .header(header::ACCEPT, HTML_ACCEPT)
            .send()
            .await?;

        Ok(ProbeOutcome {
            status: response.status().as_u16(),
            final_url: response.url().to_string(),
            elapsed: started.elapsed(),
        })
    }
}

fn content_type_of(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client() -> HttpClient {
        let settings = HttpSettings {
            user_agents: vec!["agent-one".to_string(), "agent-two".to_string()],
            request_timeout_secs: 5,
            request_delay_ms: 0,
        };
        HttpClient::new(&settings).expect("failed to build test client")
    }

    #[tokio::test]
    async fn test_get_page_returns_body_and_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/investors"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html><title>Investors</title></html>", "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let client = test_client();
        let page = client
            .get_page(&format!("{}/investors", server.uri()))
            .await
            .expect("page should load");
        assert_eq!(page.status, 200);
        assert!(page.is_html());
        assert!(page.body.contains("Investors"));
    }

    #[tokio::test]
    async fn test_get_page_maps_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = test_client()
            .get_page(&format!("{}/blocked", server.uri()))
            .await
            .unwrap_err();
        assert!(
            matches!(err, FetchError::Http { status, .. } if status == reqwest::StatusCode::FORBIDDEN),
            "unexpected error: {:?}",
            err
        );
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_before_sending() {
        let err = test_client().get_page("not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_user_agent_header_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header_eq("user-agent", "agent-two"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client();
        let agent = client.user_agent(1).to_string();
        assert_eq!(agent, "agent-two");
        let page = client.get_page_as(&server.uri(), &agent).await.unwrap();
        assert_eq!(page.body, "ok");
    }

    #[tokio::test]
    async fn test_probe_only_accepts_200() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/report.pdf"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/missing.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = test_client();
        assert!(client.probe(&format!("{}/report.pdf", server.uri())).await);
        assert!(!client.probe(&format!("{}/missing.pdf", server.uri())).await);
    }

    #[test]
    fn test_user_agents_cycle() {
        let client = test_client();
        assert_eq!(client.user_agent(0), "agent-one");
        assert_eq!(client.user_agent(1), "agent-two");
        assert_eq!(client.user_agent(2), "agent-one");
    }
}
