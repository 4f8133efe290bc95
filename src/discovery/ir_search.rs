// src/discovery/ir_search.rs
//! Finds a company's investor-relations page through web search.
use super::scorer::{score_url, UrlScore};
use crate::http::retry::{retry_with_backoff, Backoff};
use crate::http::HttpClient;
use crate::names::SearchName;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::time::Duration;
use url::Url;

const RESULTS_PER_QUERY: usize = 5;
const MAX_SEARCH_CANDIDATES: usize = 15;
/// A candidate at or above this score ends the search.
const CONFIDENT_SCORE: i32 = 100;
const MIN_SCORE: i32 = 0;

const IR_ROOTS: &[&str] = &[
    "/investor-relations",
    "/investors",
    "/investerare",
    "/ir",
    "/shareholders",
    "/investor",
];

const IR_EXPANSION_PATHS: &[&str] = &[
    "/investors",
    "/investor-relations",
    "/investerare",
    "/shareholders",
    "/ir",
    "/investors-media",
    "/investor",
];

static RESULT_LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a.result__a").expect("Failed to compile RESULT_LINK_SELECTOR")
});

/// The chosen IR page and how it scored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrMatch {
    pub url: String,
    pub score: i32,
    pub details: Vec<String>,
}

/// Search phrases for a company, most specific first.
pub fn search_queries(company_name: &str) -> Vec<String> {
    let name = SearchName::new(company_name);
    vec![
        format!("{} investor relations", name.display),
        format!("{} investors", name.matching),
        format!("{} investor relations site", name.matching),
        format!("{} financial reports", name.matching),
        format!("{} investerare", name.matching),
        format!("{} investors official site", name.display),
        format!("\"{}\" investor relations", name.matching),
        format!("{} årsredovisning", name.matching),
    ]
}

/// Result URLs on a DuckDuckGo HTML result page. Result links go through a
/// redirect whose `uddg` parameter holds the target.
pub fn parse_search_results(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let redirect_base = Url::parse("https://duckduckgo.com/").ok();
    let mut urls: Vec<String> = Vec::new();

    for anchor in document.select(&RESULT_LINK_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let target = if href.contains("uddg=") {
            redirect_base
                .as_ref()
                .and_then(|base| base.join(href).ok())
                .and_then(|redirect| {
                    redirect
                        .query_pairs()
                        .find(|(key, _)| key == "uddg")
                        .map(|(_, value)| value.into_owned())
                })
        } else if href.starts_with("http") {
            Some(href.to_string())
        } else {
            None
        };
        if let Some(target) = target {
            if !urls.contains(&target) {
                urls.push(target);
            }
        }
    }
    urls
}

/// Cuts a deep IR URL back to its IR root
/// (`/en/investors/reports/2023` becomes `/en/investors/`). Returns `None`
/// when there is no IR root or the URL already ends at it.
pub fn simplify_ir_url(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    let path = parsed.path().to_string();
    let lower = path.to_lowercase();

    let mut best: Option<(usize, usize)> = None;
    for root in IR_ROOTS {
        for (idx, _) in lower.match_indices(root) {
            let mut end = idx + root.len();
            // Segment must end here: "/ir" must not match "/iron"
            match lower.as_bytes().get(end) {
                None => {}
                Some(b'/') => end += 1,
                Some(b'.') => {}
                Some(_) => continue,
            }
            let better = match best {
                None => true,
                Some((best_idx, best_end)) => idx < best_idx || (idx == best_idx && end > best_end),
            };
            if better {
                best = Some((idx, end));
            }
            break;
        }
    }

    let (_, end) = best?;
    if end >= path.len() && parsed.query().is_none() {
        return None;
    }
    parsed.set_path(&path[..end]);
    parsed.set_query(None);
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

/// Adds IR-root versions of deep results and common IR paths on bare
/// company domains.
pub fn expand_candidates(candidates: &[String], company_compact: &str) -> Vec<String> {
    let mut expanded: Vec<String> = candidates.to_vec();
    let mut push = |url: String| {
        if !expanded.contains(&url) {
            expanded.push(url);
        }
    };

    for candidate in candidates {
        if let Some(simplified) = simplify_ir_url(candidate) {
            push(simplified);
        }

        let Ok(parsed) = Url::parse(candidate) else {
            continue;
        };
        let segments = parsed.path().split('/').filter(|s| !s.is_empty()).count();
        if segments > 1 || parsed.query().is_some() || company_compact.is_empty() {
            continue;
        }
        let host = parsed.host_str().unwrap_or_default().to_lowercase();
        if !host.replace("www.", "").replace('.', "").contains(company_compact) {
            continue;
        }
        let origin = parsed.origin().ascii_serialization();
        for path in IR_EXPANSION_PATHS {
            push(format!("{}{}", origin, path));
            push(format!("{}{}/", origin, path));
            push(format!("{}/en{}", origin, path));
            push(format!("{}/en{}/", origin, path));
        }
    }
    expanded
}

/// Web search plus scoring.
#[derive(Debug, Clone)]
pub struct IrSearch {
    client: HttpClient,
    search_url: String,
    max_retries: u32,
}

impl IrSearch {
    pub const DEFAULT_SEARCH_URL: &'static str = "https://html.duckduckgo.com/html/";

    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            search_url: Self::DEFAULT_SEARCH_URL.to_string(),
            max_retries: 2,
        }
    }

    pub fn with_search_url(mut self, search_url: &str) -> Self {
        self.search_url = search_url.to_string();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Top result URLs for one query. Errors are logged and yield nothing.
    pub async fn search(&self, query: &str, region: Option<&str>) -> Vec<String> {
        let mut url = match Url::parse(&self.search_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("Invalid search URL {}: {}", self.search_url, e);
                return Vec::new();
            }
        };
        url.query_pairs_mut().append_pair("q", query);
        if let Some(region) = region {
            url.query_pairs_mut().append_pair("kl", region);
        }

        let result = retry_with_backoff(
            self.max_retries,
            Backoff::Exponential(Duration::from_millis(1000)),
            |attempt| {
                let agent = self.client.user_agent(attempt).to_string();
                let url = url.clone();
                async move { self.client.get_page_as(url.as_str(), &agent).await }
            },
        )
        .await;

        match result {
            Ok(page) => {
                let mut urls = parse_search_results(&page.body);
                urls.truncate(RESULTS_PER_QUERY);
                urls
            }
            Err(e) => {
                tracing::warn!("Search error for query '{}': {}", query, e);
                Vec::new()
            }
        }
    }

    async fn collect_candidates(&self, queries: &[String]) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::new();
        for query in queries {
            for url in self.search(query, None).await {
                if !candidates.contains(&url) {
                    candidates.push(url);
                }
            }
        }

        if candidates.len() < RESULTS_PER_QUERY {
            tracing::info!("Few results, retrying with Swedish region...");
            for query in queries.iter().take(3) {
                for url in self.search(query, Some("se-sv")).await {
                    if !candidates.contains(&url) {
                        candidates.push(url);
                    }
                }
            }
        }

        candidates.truncate(MAX_SEARCH_CANDIDATES);
        candidates
    }

    /// Best-scoring IR page for a company, or `None` when nothing scores at
    /// least `MIN_SCORE`.
    pub async fn find_ir_url(&self, company_name: &str) -> Option<IrMatch> {
        let name = SearchName::new(company_name);
        let queries = search_queries(company_name);
        tracing::info!("Searching for IR URL with {} queries", queries.len());

        let found = self.collect_candidates(&queries).await;
        let candidates = expand_candidates(&found, &name.compact);
        tracing::info!("Scoring {} candidate URLs", candidates.len());

        let mut scored: Vec<(String, UrlScore)> = Vec::new();
        for url in &candidates {
            let score = score_url(&self.client, url, &name).await;
            tracing::info!("Scored {}: {} ({})", url, score.score, score.details.join(", "));
            let confident = score.score >= CONFIDENT_SCORE;
            scored.push((url.clone(), score));
            if confident {
                tracing::info!("Found high-confidence match, stopping search");
                break;
            }
        }

        // First of the highest scores wins
        let best = scored
            .iter()
            .fold(None::<&(String, UrlScore)>, |best, entry| match best {
                Some(b) if b.1.score >= entry.1.score => Some(b),
                _ => Some(entry),
            });
        if let Some((url, score)) = best {
            if score.score >= MIN_SCORE {
                tracing::info!("Best IR URL: {} (score {})", url, score.score);
                return Some(IrMatch {
                    url: url.clone(),
                    score: score.score,
                    details: score.details.clone(),
                });
            }
            tracing::info!("Best URL {} rejected - score {} below {}", url, score.score, MIN_SCORE);
        }

        tracing::warn!("No valid IR URL found for {}", company_name);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpSettings;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_search_queries_use_name_forms() {
        let queries = search_queries("Volvo AB B");
        assert_eq!(queries[0], "Volvo AB investor relations");
        assert_eq!(queries[1], "Volvo investors");
        assert!(queries.contains(&"\"Volvo\" investor relations".to_string()));
        assert!(queries.contains(&"Volvo årsredovisning".to_string()));
    }

    #[test]
    fn test_parse_search_results_decodes_redirects() {
        let html = r#"<div class="result">
            <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.volvogroup.com%2Fen%2Finvestors.html&amp;rut=abc">Volvo Group investors</a>
            <a class="result__a" href="https://www.example.com/direct">Direct</a>
            <a class="result__snippet" href="https://ignored.example.com/">Snippet</a>
            <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.volvogroup.com%2Fen%2Finvestors.html&amp;rut=def">Duplicate</a>
        </div>"#;
        assert_eq!(
            parse_search_results(html),
            vec!["https://www.volvogroup.com/en/investors.html", "https://www.example.com/direct"]
        );
    }

    #[test]
    fn test_simplify_ir_url() {
        assert_eq!(
            simplify_ir_url("https://www.example.com/en/investors/reports/2023?tab=1").as_deref(),
            Some("https://www.example.com/en/investors/")
        );
        assert_eq!(
            simplify_ir_url("https://www.example.com/investor-relations/agm").as_deref(),
            Some("https://www.example.com/investor-relations/")
        );
        assert_eq!(simplify_ir_url("https://www.example.com/investors/"), None, "already at the root");
        assert_eq!(simplify_ir_url("https://www.example.com/iron-ore/mines"), None);
        assert_eq!(simplify_ir_url("https://www.example.com/about"), None);
    }

    #[test]
    fn test_expand_candidates() {
        let found = vec![
            "https://www.volvogroup.com/en/investors/reports/annual.html".to_string(),
            "https://www.volvogroup.com/".to_string(),
            "https://www.othersite.com/".to_string(),
        ];
        let expanded = expand_candidates(&found, "volvo");
        assert_eq!(&expanded[..3], &found[..]);
        assert!(expanded.contains(&"https://www.volvogroup.com/en/investors/".to_string()));
        assert!(expanded.contains(&"https://www.volvogroup.com/investerare".to_string()));
        assert!(expanded.contains(&"https://www.volvogroup.com/en/investor-relations/".to_string()));
        assert!(!expanded.iter().any(|u| u.starts_with("https://www.othersite.com/investors")));
        assert_eq!(expanded.len(), 3 + 1 + IR_EXPANSION_PATHS.len() * 4);
    }

    #[tokio::test]
    async fn test_find_ir_url_picks_confident_candidate() {
        let server = MockServer::start().await;
        let ir_page = format!("{}/investors", server.uri());
        let news_page = format!("{}/news/article-1", server.uri());
        let results = format!(
            r#"<a class="result__a" href="{}">News</a><a class="result__a" href="{}">Investors</a>"#,
            news_page, ir_page
        );
        Mock::given(method("GET"))
            .and(path("/html/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(results, "text/html"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/investors"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"<html><head><title>Example Investors</title></head>
                   <body>Annual report, dividend, share price, corporate governance, financial calendar</body></html>"#,
                "text/html",
            ))
            .mount(&server)
            .await;

        let client = HttpClient::new(&HttpSettings::default()).unwrap();
        let search = IrSearch::new(client)
            .with_search_url(&format!("{}/html/", server.uri()))
            .with_max_retries(0);
        let found = search.find_ir_url("Example AB").await.expect("an IR page");

        assert_eq!(found.url, ir_page);
        assert!(found.score >= CONFIDENT_SCORE, "score {} details {:?}", found.score, found.details);
    }

    #[tokio::test]
    async fn test_find_ir_url_without_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/html/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
            .mount(&server)
            .await;

        let client = HttpClient::new(&HttpSettings::default()).unwrap();
        let search = IrSearch::new(client)
            .with_search_url(&format!("{}/html/", server.uri()))
            .with_max_retries(0);
        assert_eq!(search.find_ir_url("Example AB").await, None);
    }
}
