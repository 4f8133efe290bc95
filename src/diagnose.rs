// src/diagnose.rs
//! Connection diagnostics for company IR URLs.
use crate::company::Company;
use crate::http::HttpClient;
use crate::utils::error::ErrorCategory;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

const SECOND_ATTEMPT_PAUSE: Duration = Duration::from_millis(500);

/// Result of probing one IR URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnosis {
    pub cid: String,
    pub company: String,
    pub url: Option<String>,
    /// "success", "error" or "no_url".
    pub status: String,
    pub http_status: Option<u16>,
    pub final_url: Option<String>,
    pub response_time_ms: Option<u128>,
    pub error_type: Option<String>,
    pub error: Option<String>,
    pub attempts: u32,
    pub recommendation: String,
}

/// What to do next about a failure category.
pub fn recommendation(category: Option<ErrorCategory>) -> String {
    match category {
        None => "✓ Working - no action needed".to_string(),
        Some(ErrorCategory::Dns) => "Domain may be blocked - check network/DNS".to_string(),
        Some(ErrorCategory::Timeout) => "Server slow - increase the request timeout".to_string(),
        Some(ErrorCategory::Forbidden) | Some(ErrorCategory::ConnectionRefused) => {
            "Server blocking requests - try the browser fallback".to_string()
        }
        Some(ErrorCategory::NotFound) => "Page not found - may need updated IR URL".to_string(),
        Some(other) => format!("{} - needs investigation", other.label()),
    }
}

/// Probes the company's IR URL, retrying once with a different user agent.
pub async fn diagnose_url(client: &HttpClient, company: &Company) -> Diagnosis {
    let mut diagnosis = Diagnosis {
        cid: company.cid.clone(),
        company: company.name.clone(),
        url: company.ir_url.clone(),
        status: "no_url".to_string(),
        http_status: None,
        final_url: None,
        response_time_ms: None,
        error_type: None,
        error: None,
        attempts: 0,
        recommendation: "Find an IR URL first (find-ir)".to_string(),
    };
    let Some(url) = company.ir_url.as_deref() else {
        return diagnosis;
    };

    let mut last_category = None;
    for attempt in 0..2u32 {
        if attempt > 0 {
            tokio::time::sleep(SECOND_ATTEMPT_PAUSE).await;
        }
        diagnosis.attempts = attempt + 1;
        let agent = client.user_agent(attempt).to_string();

        match client.diagnose(url, &agent).await {
            Ok(outcome) => {
                diagnosis.http_status = Some(outcome.status);
                diagnosis.final_url = Some(outcome.final_url);
                diagnosis.response_time_ms = Some(outcome.elapsed.as_millis());
                if outcome.status == 200 {
                    diagnosis.status = "success".to_string();
                    diagnosis.error_type = None;
                    diagnosis.error = None;
                    diagnosis.recommendation = recommendation(None);
                    return diagnosis;
                }
                let category = ErrorCategory::from_status(outcome.status);
                diagnosis.error_type = Some(category.label().to_string());
                diagnosis.error = Some(category.describe());
                last_category = Some(category);
            }
            Err(e) => {
                let category = e.category();
                tracing::debug!("Diagnose attempt {} for {} failed: {}", attempt + 1, url, e);
                diagnosis.error_type = Some(category.label().to_string());
                diagnosis.error = Some(format!("{}: {}", category.describe(), e));
                last_category = Some(category);
            }
        }
    }

    diagnosis.status = "error".to_string();
    diagnosis.recommendation = recommendation(last_category);
    diagnosis
}

/// Diagnoses every company in turn, logging each result.
pub async fn diagnose_companies(client: &HttpClient, companies: &[Company]) -> Vec<Diagnosis> {
    let mut results = Vec::with_capacity(companies.len());
    for (i, company) in companies.iter().enumerate() {
        tracing::info!("[{}/{}] Diagnosing {} ({})", i + 1, companies.len(), company.name, company.cid);
        let diagnosis = diagnose_url(client, company).await;
        match diagnosis.status.as_str() {
            "success" => tracing::info!(
                "  ✓ HTTP {} in {} ms",
                diagnosis.http_status.unwrap_or_default(),
                diagnosis.response_time_ms.unwrap_or_default()
            ),
            "no_url" => tracing::warn!("  No IR URL on record"),
            _ => tracing::warn!(
                "  ✗ {} -> {}",
                diagnosis.error.as_deref().unwrap_or("unknown error"),
                diagnosis.recommendation
            ),
        }
        results.push(diagnosis);
    }
    results
}

/// Count of diagnoses per error type ("success" and "no_url" included).
pub fn summarize(results: &[Diagnosis]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for result in results {
        let key = match result.status.as_str() {
            "error" => result.error_type.clone().unwrap_or_else(|| "unknown_error".to_string()),
            other => other.to_string(),
        };
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpSettings;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpClient {
        HttpClient::new(&HttpSettings {
            user_agents: vec!["agent-one".to_string(), "agent-two".to_string()],
            request_timeout_secs: 5,
            request_delay_ms: 0,
        })
        .unwrap()
    }

    fn company(url: Option<String>) -> Company {
        Company {
            cid: "C1".to_string(),
            name: "Example AB".to_string(),
            ir_url: url,
            validated: true,
        }
    }

    #[test]
    fn test_recommendations() {
        assert!(recommendation(None).starts_with("✓ Working"));
        assert!(recommendation(Some(ErrorCategory::Dns)).contains("blocked"));
        assert!(recommendation(Some(ErrorCategory::Forbidden)).contains("browser"));
        assert!(recommendation(Some(ErrorCategory::NotFound)).contains("updated IR URL"));
        assert_eq!(
            recommendation(Some(ErrorCategory::Tls)),
            "ssl_error - needs investigation"
        );
    }

    #[tokio::test]
    async fn test_no_url() {
        let diagnosis = diagnose_url(&client(), &company(None)).await;
        assert_eq!(diagnosis.status, "no_url");
        assert_eq!(diagnosis.attempts, 0);
    }

    #[tokio::test]
    async fn test_second_agent_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/investors"))
            .and(header("user-agent", "agent-one"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/investors"))
            .and(header("user-agent", "agent-two"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/investors", server.uri());
        let diagnosis = diagnose_url(&client(), &company(Some(url))).await;
        assert_eq!(diagnosis.status, "success");
        assert_eq!(diagnosis.attempts, 2);
        assert_eq!(diagnosis.http_status, Some(200));
        assert_eq!(diagnosis.error_type, None);
    }

    #[tokio::test]
    async fn test_persistent_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&server)
            .await;

        let url = format!("{}/old-ir", server.uri());
        let results = diagnose_companies(&client(), &[company(Some(url)), company(None)]).await;
        assert_eq!(results[0].status, "error");
        assert_eq!(results[0].error_type.as_deref(), Some("http_404_not_found"));
        assert!(results[0].recommendation.contains("updated IR URL"));

        let counts = summarize(&results);
        assert_eq!(counts.get("http_404_not_found"), Some(&1));
        assert_eq!(counts.get("no_url"), Some(&1));
    }
}
