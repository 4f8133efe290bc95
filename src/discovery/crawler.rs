// src/discovery/crawler.rs
//! Depth-bounded crawl of a company website for annual-report PDF links.
use super::links::{self, LinkClass, LinkSource};
use super::year::detect_year;
use super::{DiscoveryMethod, ReportCandidate};
use crate::company::Company;
use crate::config::DownloadSettings;
use crate::http::HttpClient;
use crate::utils::error::{DiscoveryError, FetchError};
use crate::utils::html_debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

static IR_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)investor|investerare|shareholder|financial|annual report|\bir\b")
        .expect("Failed to compile IR_LINK_RE")
});

static PRESS_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)press|news|media|blog|article").expect("Failed to compile PRESS_LINK_RE")
});

/// Bounds for a single crawl.
#[derive(Debug, Clone, Copy)]
pub struct CrawlLimits {
    pub max_depth: u32,
    pub max_child_pages: usize,
    pub max_consecutive_failures: u32,
    /// Pause before fetching each child page.
    pub pause: Duration,
}

impl From<&DownloadSettings> for CrawlLimits {
    fn from(settings: &DownloadSettings) -> Self {
        Self {
            max_depth: settings.max_depth,
            max_child_pages: settings.max_child_pages,
            max_consecutive_failures: settings.max_consecutive_failures.max(1),
            pause: Duration::from_millis(settings.crawl_pause_ms),
        }
    }
}

/// A report link found on a crawled page.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FoundLink {
    url: String,
    year: i32,
    title: String,
}

/// What one page yielded: report links and pages worth visiting next.
#[derive(Debug, Default)]
struct PageScan {
    reports: Vec<FoundLink>,
    children: Vec<Url>,
    pdf_links: usize,
    excluded: usize,
}

/// Crawls company pages for one company. The visited set and the failure
/// counter persist across calls so successive stages share them.
pub struct Crawler<'a> {
    client: &'a HttpClient,
    limits: CrawlLimits,
    visited: HashSet<String>,
    consecutive_failures: u32,
    debug_dir: Option<PathBuf>,
}

impl<'a> Crawler<'a> {
    pub fn new(client: &'a HttpClient, limits: CrawlLimits) -> Self {
        Self {
            client,
            limits,
            visited: HashSet::new(),
            consecutive_failures: 0,
            debug_dir: None,
        }
    }

    /// Saves an annotated copy of every crawled page into `dir`.
    pub fn with_debug_dir(mut self, dir: PathBuf) -> Self {
        self.debug_dir = Some(dir);
        self
    }

    pub fn reset_failures(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn has_visited(&self, url: &str) -> bool {
        let key = Url::parse(url)
            .map(|mut u| {
                u.set_fragment(None);
                u.to_string()
            })
            .unwrap_or_else(|_| url.to_string());
        self.visited.contains(&key)
    }

    /// Crawls from `start`, following navigation links on the same
    /// registrable domain. Returns report links for `years`.
    ///
    /// Fails with [`DiscoveryError::CircuitOpen`] once
    /// `max_consecutive_failures` fetches fail in a row.
    pub async fn crawl(
        &mut self,
        company: &Company,
        start: &str,
        years: &[i32],
        method: DiscoveryMethod,
    ) -> Result<Vec<ReportCandidate>, DiscoveryError> {
        let start_url = Url::parse(start).map_err(|_| FetchError::InvalidUrl(start.to_string()))?;
        let base_domain = base_domain(&start_url);
        let mut found: Vec<ReportCandidate> = Vec::new();

        // Depth-first: children are pushed in reverse so the first link is visited next.
        let mut stack: Vec<(Url, u32)> = vec![(start_url, 0)];
        while let Some((mut url, depth)) = stack.pop() {
            url.set_fragment(None);
            if depth > self.limits.max_depth || !self.visited.insert(url.to_string()) {
                continue;
            }
            if depth > 0 && !self.limits.pause.is_zero() {
                tokio::time::sleep(self.limits.pause).await;
            }

            let indent = "  ".repeat(depth as usize);
            tracing::info!("{}Searching: {}", indent, url);

            let page = match self.client.get_page(url.as_str()).await {
                Ok(page) => {
                    self.consecutive_failures = 0;
                    page
                }
                Err(e) => {
                    self.record_failure(&e, &indent)?;
                    continue;
                }
            };
            if !page.is_html() {
                tracing::debug!("{}Skipping non-HTML page ({})", indent, page.content_type);
                continue;
            }
            self.save_snapshot(&url, &page.body);

            let follow = depth < self.limits.max_depth;
            let scan = scan_page(&page.body, &url, years, &base_domain, follow);
            if scan.pdf_links > 0 {
                tracing::info!(
                    "{}  Analyzed {} PDF links, excluded {} quarterly/SEC filings",
                    indent,
                    scan.pdf_links,
                    scan.excluded
                );
            }

            for report in scan.reports {
                if found.iter().any(|c| c.url == report.url) {
                    continue;
                }
                tracing::info!("{}  Found report: {} - {}", indent, report.year, report.title);
                found.push(ReportCandidate::new(
                    company,
                    report.year,
                    &report.url,
                    &report.title,
                    url.as_str(),
                    method,
                ));
            }

            for child in scan.children.into_iter().take(self.limits.max_child_pages).rev() {
                stack.push((child, depth + 1));
            }
        }

        Ok(found)
    }

    fn record_failure(&mut self, err: &FetchError, indent: &str) -> Result<(), DiscoveryError> {
        self.consecutive_failures += 1;
        let category = err.category();
        tracing::warn!(
            "{}{} (failure {}/{})",
            indent,
            category,
            self.consecutive_failures,
            self.limits.max_consecutive_failures
        );
        if self.consecutive_failures >= self.limits.max_consecutive_failures {
            return Err(DiscoveryError::CircuitOpen {
                limit: self.limits.max_consecutive_failures,
                reason: category.describe(),
            });
        }
        Ok(())
    }

    fn save_snapshot(&self, url: &Url, html: &str) {
        let Some(dir) = &self.debug_dir else {
            return;
        };
        let path = dir.join(html_debug::snapshot_file_name(url.as_str()));
        if let Err(e) = html_debug::save_link_snapshot(html, &path) {
            tracing::warn!("Failed to save debug snapshot for {}: {}", url, e);
        }
    }
}

/// Last two labels of the host. Links are followed when their host is this
/// domain or one of its subdomains (library.example.com).
fn base_domain(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_lowercase();
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() >= 2 {
        labels[labels.len() - 2..].join(".")
    } else {
        host
    }
}

fn in_domain(host: &str, base_domain: &str) -> bool {
    host == base_domain || host.ends_with(&format!(".{}", base_domain))
}

fn scan_page(html: &str, page_url: &Url, years: &[i32], base_domain: &str, follow: bool) -> PageScan {
    let mut scan = PageScan::default();
    let mut priority_children = Vec::new();
    let mut other_children = Vec::new();

    for link in links::extract_links(html) {
        if link.looks_like_pdf() {
            scan.pdf_links += 1;
        }
        match link.classify() {
            LinkClass::Report => {
                let Some(resolved) = links::resolve_link(page_url, &link.href) else {
                    continue;
                };
                match detect_year(&link.href, &link.combined()) {
                    Some(year) if years.contains(&year) => {
                        let url = resolved.to_string();
                        if !scan.reports.iter().any(|r| r.url == url) {
                            scan.reports.push(FoundLink {
                                url,
                                year,
                                title: link.label().to_string(),
                            });
                        }
                    }
                    Some(year) => tracing::debug!("Skipped {} ({} not a target year)", link.href, year),
                    None => tracing::debug!("No year found for {}", link.href),
                }
            }
            LinkClass::Excluded(reason) => {
                scan.excluded += 1;
                tracing::debug!("Excluded: {} ({})", link.label(), reason.describe());
            }
            LinkClass::Navigation if follow => {
                let Some(resolved) = links::resolve_link(page_url, &link.href) else {
                    continue;
                };
                let in_scope = resolved
                    .host_str()
                    .map(|host| in_domain(&host.to_lowercase(), base_domain))
                    .unwrap_or(false);
                if !in_scope
                    || priority_children.contains(&resolved)
                    || other_children.contains(&resolved)
                {
                    continue;
                }
                if link.is_priority() {
                    priority_children.push(resolved);
                } else {
                    other_children.push(resolved);
                }
            }
            LinkClass::Navigation | LinkClass::Irrelevant => {}
        }
    }

    priority_children.extend(other_children);
    scan.children = priority_children;
    scan
}

/// Picks the investor-relations link on a site's front page. Footer links
/// are preferred over menus, menus over body links; press pages never count.
pub fn main_site_ir_link(html: &str, root: &Url) -> Option<String> {
    let links = links::extract_links(html);
    [LinkSource::Footer, LinkSource::Navigation, LinkSource::Html]
        .iter()
        .find_map(|source| {
            links
                .iter()
                .filter(|link| link.source == *source)
                .find(|link| {
                    let combined = link.combined();
                    IR_LINK_RE.is_match(&combined) && !PRESS_LINK_RE.is_match(&combined)
                })
                .and_then(|link| links::resolve_link(root, &link.href))
        })
        .map(|url| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpSettings;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn limits(max_depth: u32, max_failures: u32) -> CrawlLimits {
        CrawlLimits {
            max_depth,
            max_child_pages: 5,
            max_consecutive_failures: max_failures,
            pause: Duration::ZERO,
        }
    }

    fn company() -> Company {
        Company {
            cid: "C1".to_string(),
            name: "Example AB".to_string(),
            ir_url: None,
            validated: true,
        }
    }

    fn client() -> HttpClient {
        let settings = HttpSettings {
            request_timeout_secs: 5,
            ..HttpSettings::default()
        };
        HttpClient::new(&settings).unwrap()
    }

    async fn mount_html(server: &MockServer, route: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html"))
            .mount(server)
            .await;
    }

    #[test]
    fn test_base_domain() {
        let url = Url::parse("https://global.abb.com/investors").unwrap();
        assert_eq!(base_domain(&url), "abb.com");
        let url = Url::parse("http://localhost:8080/").unwrap();
        assert_eq!(base_domain(&url), "localhost");
    }

    #[test]
    fn test_scan_page_orders_priority_children_first() {
        let html = r#"<html><body>
            <a href="/investors/reports-and-presentations">Reports and presentations</a>
            <nav><a href="/investors/overview">Overview</a></nav>
            <a href="https://other.org/annual-reports">Annual reports elsewhere</a>
            <a href="/files/annual-report-2023.pdf">Annual report 2023</a>
            <a href="/files/annual-report-2015.pdf">Annual report 2015</a>
            <a href="/files/interim-report-q3-2023.pdf">Interim annual report Q3 2023</a>
        </body></html>"#;
        let page = Url::parse("https://www.example.com/investors").unwrap();
        let scan = scan_page(html, &page, &[2023], "example.com", true);

        assert_eq!(scan.reports.len(), 1);
        assert_eq!(scan.reports[0].url, "https://www.example.com/files/annual-report-2023.pdf");
        assert_eq!(scan.reports[0].year, 2023);
        assert_eq!(scan.excluded, 1);

        let children: Vec<&str> = scan.children.iter().map(Url::as_str).collect();
        assert_eq!(
            children,
            vec![
                "https://www.example.com/investors/overview",
                "https://www.example.com/investors/reports-and-presentations",
            ],
            "menu links first, off-site links dropped"
        );
    }

    #[test]
    fn test_in_domain_requires_label_boundary() {
        assert!(in_domain("example.com", "example.com"));
        assert!(in_domain("ir.example.com", "example.com"));
        assert!(!in_domain("notexample.com", "example.com"));
        assert!(!in_domain("example.com.evil.io", "example.com"));
    }

    #[test]
    fn test_scan_page_skips_lookalike_hosts() {
        let html = r#"<nav>
            <a href="https://notexample.com/investors">Investors</a>
            <a href="https://example.com.evil.io/investors">Investors</a>
            <a href="https://ir.example.com/investors">Investors</a>
        </nav>"#;
        let page = Url::parse("https://www.example.com/").unwrap();
        let scan = scan_page(html, &page, &[2023], "example.com", true);
        let children: Vec<&str> = scan.children.iter().map(Url::as_str).collect();
        assert_eq!(children, vec!["https://ir.example.com/investors"]);
    }

    #[test]
    fn test_scan_page_without_follow_has_no_children() {
        let html = r#"<nav><a href="/investors/overview">Overview</a></nav>"#;
        let page = Url::parse("https://www.example.com/").unwrap();
        let scan = scan_page(html, &page, &[2023], "example.com", false);
        assert!(scan.children.is_empty());
    }

    #[test]
    fn test_main_site_ir_link_prefers_footer() {
        let html = r#"<html><body>
            <nav><a href="/investors">Investors</a><a href="/media">Media</a></nav>
            <a href="/about">About</a>
            <footer><a href="/en/investor-relations">Investor relations</a></footer>
        </body></html>"#;
        let root = Url::parse("https://www.example.com/").unwrap();
        assert_eq!(
            main_site_ir_link(html, &root).as_deref(),
            Some("https://www.example.com/en/investor-relations")
        );
    }

    #[test]
    fn test_main_site_ir_link_skips_press_pages() {
        let html = r#"<nav><a href="/investor-news">Investor news</a></nav><a href="/careers">Careers</a>"#;
        let root = Url::parse("https://www.example.com/").unwrap();
        assert_eq!(main_site_ir_link(html, &root), None);
    }

    #[tokio::test]
    async fn test_crawl_follows_navigation_and_collects_reports() {
        let server = MockServer::start().await;
        mount_html(
            &server,
            "/investors",
            r#"<html><body>
                <a href="/investors/annual-reports">Annual reports</a>
                <a href="/files/annual-report-2023.pdf">Annual report 2023</a>
                <a href="/files/annual-report-2023.pdf#page=3">Annual report 2023</a>
            </body></html>"#,
        )
        .await;
        mount_html(
            &server,
            "/investors/annual-reports",
            r#"<html><body>
                <a href="/files/annual-report-2022.pdf">Annual report 2022</a>
                <a href="/files/annual-report-2019.pdf">Annual report 2019</a>
                <a href="/investors">Back</a>
            </body></html>"#,
        )
        .await;

        let client = client();
        let mut crawler = Crawler::new(&client, limits(2, 3));
        let start = format!("{}/investors", server.uri());
        let found = crawler
            .crawl(&company(), &start, &[2022, 2023], DiscoveryMethod::IrPage)
            .await
            .expect("crawl should succeed");

        let mut years: Vec<i32> = found.iter().map(|c| c.year).collect();
        years.sort();
        assert_eq!(years, vec![2022, 2023]);
        assert!(found.iter().all(|c| c.method == DiscoveryMethod::IrPage));
        let nested = found.iter().find(|c| c.year == 2022).unwrap();
        assert!(nested.source_page.ends_with("/investors/annual-reports"));
        assert!(crawler.has_visited(&start));
    }

    #[tokio::test]
    async fn test_crawl_respects_depth_limit() {
        let server = MockServer::start().await;
        mount_html(
            &server,
            "/investors",
            r#"<a href="/investors/annual-reports">Annual reports</a>"#,
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/investors/annual-reports"))
            .respond_with(ResponseTemplate::new(200).set_body_string("unused"))
            .expect(0)
            .mount(&server)
            .await;

        let client = client();
        let mut crawler = Crawler::new(&client, limits(0, 3));
        let found = crawler
            .crawl(&company(), &format!("{}/investors", server.uri()), &[2023], DiscoveryMethod::IrPage)
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_circuit_breaker_trips_after_consecutive_failures() {
        let server = MockServer::start().await;
        mount_html(
            &server,
            "/investors",
            r#"<a href="/investors/annual-reports">Annual reports</a>
               <a href="/investors/financial-reports">Financial reports</a>
               <a href="/investors/publications">Publications</a>"#,
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/investors/annual-reports"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/investors/financial-reports"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/investors/publications"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = client();
        let mut crawler = Crawler::new(&client, limits(2, 3));
        let err = crawler
            .crawl(&company(), &format!("{}/investors", server.uri()), &[2023], DiscoveryMethod::IrPage)
            .await
            .unwrap_err();
        match err {
            DiscoveryError::CircuitOpen { limit, reason } => {
                assert_eq!(limit, 3);
                assert!(reason.contains("403"), "last failure names the cause: {}", reason);
            }
            other => panic!("expected circuit breaker, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_success_resets_failure_counter() {
        let server = MockServer::start().await;
        mount_html(
            &server,
            "/investors",
            r#"<a href="/investors/missing-reports">Annual reports</a>
               <a href="/investors/financial-reports">Financial reports</a>
               <a href="/investors/gone-publications">Publications</a>"#,
        )
        .await;
        mount_html(&server, "/investors/financial-reports", "<p>No reports here</p>").await;

        let client = client();
        let mut crawler = Crawler::new(&client, limits(1, 2));
        let result = crawler
            .crawl(&company(), &format!("{}/investors", server.uri()), &[2023], DiscoveryMethod::IrPage)
            .await;
        assert!(result.is_ok(), "fail, ok, fail never reaches two in a row: {:?}", result);
    }
}
