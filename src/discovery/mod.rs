// src/discovery/mod.rs
//! Report discovery: a cascade of strategies that each get a chance at the
//! years the previous ones missed.
pub mod aggregators;
pub mod browser;
pub mod candidates;
pub mod crawler;
pub mod ir_search;
pub mod links;
pub mod scorer;
pub mod year;

use crate::company::Company;
use crate::config::DownloadSettings;
use crate::http::HttpClient;
use crate::utils::error::DiscoveryError;
use aggregators::{CisionSource, MfnSource};
use browser::PageRenderer;
use crawler::{CrawlLimits, Crawler};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

/// Which stage produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    DirectPattern,
    IrPage,
    CommonPath,
    MainSiteFailsafe,
    Cision,
    Mfn,
    Browser,
}

impl DiscoveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryMethod::DirectPattern => "direct_pattern",
            DiscoveryMethod::IrPage => "ir_page",
            DiscoveryMethod::CommonPath => "common_path",
            DiscoveryMethod::MainSiteFailsafe => "main_site_failsafe",
            DiscoveryMethod::Cision => "cision",
            DiscoveryMethod::Mfn => "mfn",
            DiscoveryMethod::Browser => "browser",
        }
    }
}

impl fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A URL believed to hold (or link to) the annual report for one year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportCandidate {
    pub cid: String,
    pub company: String,
    pub year: i32,
    pub url: String,
    pub title: String,
    pub source_page: String,
    pub method: DiscoveryMethod,
    /// Likelihood in percent that this is a full annual report.
    pub score: i32,
}

impl ReportCandidate {
    pub fn new(
        company: &Company,
        year: i32,
        url: &str,
        title: &str,
        source_page: &str,
        method: DiscoveryMethod,
    ) -> Self {
        let score = scorer::classify_report_type(title, url, None).percent();
        Self {
            cid: company.cid.clone(),
            company: company.name.clone(),
            year,
            url: url.to_string(),
            title: title.to_string(),
            source_page: source_page.to_string(),
            method,
            score,
        }
    }
}

/// Target years with no candidate yet.
pub fn missing_years(years: &[i32], found: &[ReportCandidate]) -> Vec<i32> {
    years
        .iter()
        .copied()
        .filter(|year| !found.iter().any(|c| c.year == *year))
        .collect()
}

/// Appends candidates with unseen URLs. Returns how many were added.
fn merge(found: &mut Vec<ReportCandidate>, new: Vec<ReportCandidate>) -> usize {
    let mut added = 0;
    for candidate in new {
        if !found.iter().any(|c| c.url == candidate.url) {
            found.push(candidate);
            added += 1;
        }
    }
    added
}

/// Runs the discovery cascade for one company.
pub struct ReportFinder {
    client: HttpClient,
    settings: DownloadSettings,
    cision: CisionSource,
    mfn: MfnSource,
    renderer: Option<Arc<dyn PageRenderer>>,
    debug_dir: Option<PathBuf>,
}

impl ReportFinder {
    pub fn new(client: HttpClient, settings: &DownloadSettings) -> Self {
        Self {
            cision: CisionSource::new(client.clone()),
            mfn: MfnSource::new(client.clone()),
            client,
            settings: settings.clone(),
            renderer: None,
            debug_dir: None,
        }
    }

    pub fn with_cision(mut self, cision: CisionSource) -> Self {
        self.cision = cision;
        self
    }

    pub fn with_mfn(mut self, mfn: MfnSource) -> Self {
        self.mfn = mfn;
        self
    }

    /// Enables the rendered-page stage.
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_debug_dir(mut self, dir: PathBuf) -> Self {
        self.debug_dir = Some(dir);
        self
    }

    /// Candidates for `years`, possibly several per year, in discovery order.
    ///
    /// Each stage only looks for years still missing. A stage that fails or
    /// finds nothing is noted and the next one runs; the call fails with
    /// [`DiscoveryError::Exhausted`] only if no stage found anything.
    pub async fn find_reports(
        &self,
        company: &Company,
        years: &[i32],
    ) -> Result<Vec<ReportCandidate>, DiscoveryError> {
        let mut found: Vec<ReportCandidate> = Vec::new();
        let mut failures: Vec<String> = Vec::new();

        // 1. Known direct PDF addresses and the company website
        match company.ir_url.as_deref() {
            Some(ir_url) => {
                let direct = self.direct_patterns(company, ir_url, years).await;
                if direct.is_empty() {
                    failures.push("direct patterns: nothing found".to_string());
                } else {
                    tracing::info!("  Direct patterns matched {} report(s)", direct.len());
                    merge(&mut found, direct);
                }

                let missing = missing_years(years, &found);
                if !missing.is_empty() {
                    self.search_website(company, ir_url, &missing, &mut found, &mut failures)
                        .await;
                }
            }
            None => {
                tracing::warn!("  No IR URL for {}, skipping website stages", company.name);
                failures.push("website: no IR URL".to_string());
            }
        }

        // 2. News aggregators
        let missing = missing_years(years, &found);
        if !missing.is_empty() {
            tracing::info!("  Trying Cision for years {:?}", missing);
            let cision = self.cision.find_reports(company, &missing).await;
            if merge(&mut found, cision) == 0 {
                failures.push("cision: nothing found".to_string());
            }
        }

        let missing = missing_years(years, &found);
        if !missing.is_empty() {
            tracing::info!("  Trying MFN for years {:?}", missing);
            let mfn = self.mfn.find_reports(company, &missing).await;
            if merge(&mut found, mfn) == 0 {
                failures.push("mfn: nothing found".to_string());
            }
        }

        // 3. Rendered page
        let missing = missing_years(years, &found);
        if !missing.is_empty() {
            if let (Some(renderer), Some(ir_url)) = (&self.renderer, company.ir_url.as_deref()) {
                match browser::find_reports(Arc::clone(renderer), company, ir_url, &missing).await {
                    Ok(rendered) => {
                        if merge(&mut found, rendered) == 0 {
                            failures.push("browser: nothing found".to_string());
                        }
                    }
                    Err(e) => {
                        tracing::warn!("  Browser stage failed: {}", e);
                        failures.push(format!("browser: {}", e));
                    }
                }
            }
        }

        if found.is_empty() {
            return Err(DiscoveryError::Exhausted {
                company: company.name.clone(),
                failures,
            });
        }

        let missing = missing_years(years, &found);
        if !missing.is_empty() {
            tracing::warn!("  No candidates for {} in {:?}", company.name, missing);
        }
        Ok(found)
    }

    async fn direct_patterns(&self, company: &Company, ir_url: &str, years: &[i32]) -> Vec<ReportCandidate> {
        let mut found = Vec::new();
        for &year in years {
            for url in candidates::direct_pattern_urls(ir_url, year) {
                if self.client.probe(&url).await {
                    tracing::info!("  Direct pattern hit for {}: {}", year, url);
                    found.push(ReportCandidate::new(
                        company,
                        year,
                        &url,
                        &format!("Annual Report {}", year),
                        ir_url,
                        DiscoveryMethod::DirectPattern,
                    ));
                    break;
                }
            }
        }
        found
    }

    /// IR page crawl, common archive paths, then the main-site failsafe which
    /// repeats both from the IR link on the site's front page.
    async fn search_website(
        &self,
        company: &Company,
        ir_url: &str,
        years: &[i32],
        found: &mut Vec<ReportCandidate>,
        failures: &mut Vec<String>,
    ) {
        let mut crawler = Crawler::new(&self.client, CrawlLimits::from(&self.settings));
        if let Some(dir) = &self.debug_dir {
            crawler = crawler.with_debug_dir(dir.join(&company.cid));
        }

        let mut start = ir_url.to_string();
        let mut failsafe = self.settings.enable_failsafe;
        let mut methods = (DiscoveryMethod::IrPage, DiscoveryMethod::CommonPath);
        loop {
            let missing = missing_years(years, found);
            self.crawl_site(&mut crawler, company, &start, &missing, methods, found, failures)
                .await;

            if missing_years(years, found).is_empty() || !failsafe {
                return;
            }
            failsafe = false;

            tracing::info!("  FAILSAFE: trying main site IR page");
            match self.main_site_ir_url(&start).await {
                Some(url) if url != start => {
                    tracing::info!("  FAILSAFE: found IR page {}", url);
                    crawler.reset_failures();
                    start = url;
                    methods = (DiscoveryMethod::MainSiteFailsafe, DiscoveryMethod::MainSiteFailsafe);
                }
                _ => {
                    failures.push("main site failsafe: no IR page found".to_string());
                    return;
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn crawl_site(
        &self,
        crawler: &mut Crawler<'_>,
        company: &Company,
        start: &str,
        years: &[i32],
        (page_method, path_method): (DiscoveryMethod, DiscoveryMethod),
        found: &mut Vec<ReportCandidate>,
        failures: &mut Vec<String>,
    ) {
        tracing::info!("  Crawling {}", start);
        match crawler.crawl(company, start, years, page_method).await {
            Ok(reports) => {
                if merge(found, reports) == 0 {
                    failures.push(format!("{}: nothing found", page_method));
                }
            }
            Err(e) => {
                tracing::warn!("  Crawl of {} stopped: {}", start, e);
                failures.push(format!("{}: {}", page_method, e));
            }
        }

        let mut missing = missing_years(years, found);
        if missing.is_empty() {
            return;
        }

        tracing::info!("  Trying common report paths for years {:?}", missing);
        crawler.reset_failures();
        let mut added = 0;
        for url in candidates::common_report_urls(start) {
            if missing.is_empty() {
                break;
            }
            if crawler.has_visited(&url) {
                continue;
            }
            match crawler.crawl(company, &url, &missing, path_method).await {
                Ok(reports) => {
                    added += merge(found, reports);
                    missing = missing_years(years, found);
                }
                Err(DiscoveryError::CircuitOpen { limit, reason }) => {
                    tracing::warn!("  {} failures in a row ({}), moving to next path", limit, reason);
                    crawler.reset_failures();
                }
                Err(e) => tracing::warn!("  {}: {}", url, e),
            }
        }
        if added == 0 {
            failures.push(format!("{}: nothing found", DiscoveryMethod::CommonPath));
        }
    }

    /// The IR page linked from the site root, or the first common IR path
    /// that answers. `None` when the IR URL already is the root.
    async fn main_site_ir_url(&self, ir_url: &str) -> Option<String> {
        let parsed = Url::parse(ir_url).ok()?;
        if parsed.path().trim_matches('/').is_empty() {
            tracing::info!("  IR URL is already the site root");
            return None;
        }
        let root = parsed.join("/").ok()?;

        match self.client.get_page(root.as_str()).await {
            Ok(page) if page.is_html() => {
                if let Some(link) = crawler::main_site_ir_link(&page.body, &root) {
                    return Some(link);
                }
                tracing::info!("  No IR link on {}", root);
            }
            Ok(page) => tracing::debug!("  {} is not HTML ({})", root, page.content_type),
            Err(e) => tracing::warn!("  Could not fetch {}: {}", root, e.category()),
        }

        for url in candidates::main_site_ir_urls(root.as_str()) {
            if self.client.probe(&url).await {
                return Some(url);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpSettings;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings() -> DownloadSettings {
        DownloadSettings {
            crawl_pause_ms: 0,
            retry_pause_ms: 0,
            year_pause_ms: 0,
            ..DownloadSettings::default()
        }
    }

    fn finder(server: &MockServer, settings: &DownloadSettings) -> ReportFinder {
        let client = HttpClient::new(&HttpSettings::default()).unwrap();
        ReportFinder::new(client.clone(), settings)
            .with_cision(
                CisionSource::new(client.clone())
                    .with_base_url(&server.uri())
                    .with_pause(Duration::ZERO),
            )
            .with_mfn(MfnSource::new(client).with_base_url(&server.uri()).with_pause(Duration::ZERO))
    }

    fn company(ir_url: Option<String>) -> Company {
        Company {
            cid: "C7".to_string(),
            name: "Example AB".to_string(),
            ir_url,
            validated: true,
        }
    }

    async fn mount_html(server: &MockServer, route: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html"))
            .mount(server)
            .await;
    }

    #[test]
    fn test_missing_years() {
        let c = company(None);
        let found = vec![ReportCandidate::new(&c, 2023, "https://x/ar.pdf", "Annual report", "", DiscoveryMethod::Mfn)];
        assert_eq!(missing_years(&[2022, 2023, 2024], &found), vec![2022, 2024]);
    }

    #[test]
    fn test_candidate_score_from_title() {
        let c = company(None);
        let candidate = ReportCandidate::new(
            &c,
            2023,
            "https://www.example.com/annual-report-2023.pdf",
            "Annual Report 2023",
            "https://www.example.com/investors",
            DiscoveryMethod::IrPage,
        );
        assert_eq!(candidate.score, 100);
        assert_eq!(candidate.cid, "C7");
        assert_eq!(candidate.method.to_string(), "ir_page");
    }

    #[tokio::test]
    async fn test_ir_page_stage_stops_cascade() {
        let server = MockServer::start().await;
        mount_html(
            &server,
            "/investors",
            r#"<a href="/files/annual-report-2023.pdf">Annual report 2023</a>"#,
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/example"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let finder = finder(&server, &settings());
        let found = finder
            .find_reports(&company(Some(format!("{}/investors", server.uri()))), &[2023])
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].method, DiscoveryMethod::IrPage);
        assert_eq!(found[0].url, format!("{}/files/annual-report-2023.pdf", server.uri()));
    }

    #[tokio::test]
    async fn test_common_paths_fill_missing_year() {
        let server = MockServer::start().await;
        mount_html(
            &server,
            "/investors",
            r#"<a href="/files/annual-report-2023.pdf">Annual report 2023</a>"#,
        )
        .await;
        mount_html(
            &server,
            "/investors/annual-reports",
            r#"<a href="/files/annual-report-2022.pdf">Annual report 2022</a>"#,
        )
        .await;

        let settings = DownloadSettings {
            enable_failsafe: false,
            ..settings()
        };
        let finder = finder(&server, &settings);
        let found = finder
            .find_reports(&company(Some(format!("{}/investors", server.uri()))), &[2022, 2023])
            .await
            .unwrap();

        let older = found.iter().find(|c| c.year == 2022).expect("2022 from common path");
        assert_eq!(older.method, DiscoveryMethod::CommonPath);
        assert!(missing_years(&[2022, 2023], &found).is_empty());
    }

    #[tokio::test]
    async fn test_main_site_failsafe() {
        let server = MockServer::start().await;
        mount_html(&server, "/old/investors", "<p>Page moved</p>").await;
        mount_html(
            &server,
            "/",
            r#"<html><body><footer><a href="/en/investor-relations">Investor relations</a></footer></body></html>"#,
        )
        .await;
        mount_html(
            &server,
            "/en/investor-relations",
            r#"<a href="/files/annual-report-2023.pdf">Annual report 2023</a>"#,
        )
        .await;

        let finder = finder(&server, &settings());
        let found = finder
            .find_reports(&company(Some(format!("{}/old/investors", server.uri()))), &[2023])
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].method, DiscoveryMethod::MainSiteFailsafe);
        assert!(found[0].source_page.ends_with("/en/investor-relations"));
    }

    #[tokio::test]
    async fn test_exhausted_lists_every_stage() {
        let server = MockServer::start().await;
        let finder = finder(&server, &settings());
        let err = finder.find_reports(&company(None), &[2023]).await.unwrap_err();

        match err {
            DiscoveryError::Exhausted { company, failures } => {
                assert_eq!(company, "Example AB");
                assert_eq!(
                    failures,
                    vec![
                        "website: no IR URL".to_string(),
                        "cision: nothing found".to_string(),
                        "mfn: nothing found".to_string(),
                    ]
                );
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }
}
