// src/discovery/aggregators.rs
//! Fallback search on news aggregators that republish company releases.
//!
//! Cision News lists announcements per company; the announcement detail page
//! links the report PDF on `mb.cision.com`. MFN lists the same releases under
//! `/cis/` pages with the same attachments.
use super::candidates;
use super::year::announcement_year;
use super::{DiscoveryMethod, ReportCandidate};
use crate::company::Company;
use crate::http::HttpClient;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

const DEFAULT_PAUSE: Duration = Duration::from_millis(300);
const CISION_PDFS_PER_YEAR: usize = 2;
const MFN_PAGES_PER_YEAR: usize = 3;

const QUARTERLY_KEYWORDS: &[&str] = &[
    "q1", "q2", "q3", "q4", "quarter", "interim", "delårs", "kvartals", "halvårs",
    "january-march", "january-june", "january-september", "april-june", "july-september",
    "october-december",
];

const PUBLISH_KEYWORDS: &[&str] = &[
    "publishes the annual", "published its annual", "has published", "publicerar årsredovisning",
    "annual report for", "annual reporting for", "releases annual", "publicerar års",
    "annual and sustainability report for", "annual report,", "annual report 20",
];

const CORRECTION_KEYWORDS: &[&str] = &[
    "correction", "amendment", "revised", "update to", "korrigering", "rättelse", "esef file",
];

const MFN_QUARTERLY_KEYWORDS: &[&str] = &[
    "q1", "q2", "q3", "q4", "quarter", "interim", "delårs", "kvartals",
];

const MFN_ANNUAL_KEYWORDS: &[&str] = &[
    "annual report", "årsredovisning", "annual", "year-end", "publishes", "report",
];

static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a[href]").expect("Failed to compile ANCHOR_SELECTOR")
});

static H1_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("h1").expect("Failed to compile H1_SELECTOR")
});

static CLASS_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("[class]").expect("Failed to compile CLASS_SELECTOR")
});

static CISION_PAGE_CLASS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)company|news").expect("Failed to compile CISION_PAGE_CLASS_RE")
});

static MFN_PAGE_CLASS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)company|ticker").expect("Failed to compile MFN_PAGE_CLASS_RE")
});

/// An annual-report announcement on a Cision listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub year: i32,
    pub detail_url: String,
    pub title: String,
    /// 1 = publication, 2 = other mention, 3 = corrected publication,
    /// 4 = correction only. Lower wins.
    pub priority: u8,
}

// --- Page parsing ---

/// `(href, text)` of every anchor, text trimmed.
fn anchors(html: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim().to_string();
            let text = a.text().collect::<Vec<_>>().join(" ").trim().to_string();
            Some((href, text))
        })
        .collect()
}

/// Soft-404 guard: a real company page has a heading or a company-ish class.
fn is_company_page(html: &str, class_re: &Regex) -> bool {
    let document = Html::parse_document(html);
    if document.select(&H1_SELECTOR).next().is_some() {
        return true;
    }
    document
        .select(&CLASS_SELECTOR)
        .filter_map(|el| el.value().attr("class"))
        .any(|class| class_re.is_match(class))
}

fn contains_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| haystack.contains(kw))
}

/// Annual-report announcements for `years` on a Cision listing page.
pub fn parse_cision_listing(html: &str, base_url: &str, years: &[i32]) -> Vec<Announcement> {
    let base_url = base_url.trim_end_matches('/');
    let mut announcements = Vec::new();

    for (href, text) in anchors(html) {
        // Detail pages look like /company/r/title-slug,c1234567
        if !(href.contains("/r/") && href.contains(",c")) {
            continue;
        }
        let detail_url = if href.starts_with("http") {
            href.clone()
        } else {
            format!("{}{}", base_url, href)
        };
        let combined = format!("{} {}", href, text).to_lowercase();
        if contains_any(&combined, QUARTERLY_KEYWORDS) {
            continue;
        }
        let Some(year) = announcement_year(&text, &href).filter(|y| years.contains(y)) else {
            continue;
        };

        let is_publish = contains_any(&combined, PUBLISH_KEYWORDS);
        let is_correction = contains_any(&combined, CORRECTION_KEYWORDS);
        let priority = match (is_publish, is_correction) {
            (true, false) => 1,
            (false, false) => 2,
            (true, true) => 3,
            (false, true) => 4,
        };
        announcements.push(Announcement {
            year,
            detail_url,
            title: text.chars().take(100).collect(),
            priority,
        });
    }
    announcements
}

/// The best announcement per year, oldest year first.
pub fn best_announcements(mut announcements: Vec<Announcement>) -> Vec<Announcement> {
    // Stable sort keeps listing order among equal priorities
    announcements.sort_by_key(|a| (a.year, a.priority));
    let mut seen = HashSet::new();
    announcements.retain(|a| seen.insert(a.year));
    announcements
}

/// PDF links on an announcement page: Cision-hosted attachments first, then
/// any other link ending in `.pdf`.
pub fn pdf_attachments(html: &str, page_url: &str) -> Vec<String> {
    let base = Url::parse(page_url).ok();
    let links = anchors(html);
    let mut pdfs: Vec<String> = Vec::new();

    for (href, _) in &links {
        if !(href.contains("cision.com") && href.to_lowercase().contains(".pdf")) {
            continue;
        }
        let absolute = if href.starts_with("http") {
            href.clone()
        } else if href.starts_with("//") {
            format!("https:{}", href)
        } else {
            match base.as_ref().and_then(|b| b.join(href).ok()) {
                Some(url) => url.to_string(),
                None => continue,
            }
        };
        if !pdfs.contains(&absolute) {
            pdfs.push(absolute);
        }
    }

    for (href, _) in &links {
        if !href.to_lowercase().ends_with(".pdf") {
            continue;
        }
        let Some(absolute) = base.as_ref().and_then(|b| b.join(href).ok()) else {
            continue;
        };
        let absolute = absolute.to_string();
        if !pdfs.contains(&absolute) {
            pdfs.push(absolute);
        }
    }
    pdfs
}

/// `/cis/` report pages for `year` on an MFN search result page.
pub fn parse_mfn_results(html: &str, search_url: &str, year: i32) -> Vec<String> {
    let Ok(base) = Url::parse(search_url) else {
        return Vec::new();
    };
    let year = year.to_string();
    let mut pages: Vec<String> = Vec::new();

    for (href, text) in anchors(html) {
        if !href.contains("/cis/") {
            continue;
        }
        let combined = format!("{} {}", href, text).to_lowercase();
        let is_annual = contains_any(&combined, MFN_ANNUAL_KEYWORDS);
        let is_quarterly = contains_any(&combined, MFN_QUARTERLY_KEYWORDS);
        if !is_annual || is_quarterly || !combined.contains(&year) {
            continue;
        }
        if let Ok(url) = base.join(&href) {
            let url = url.to_string();
            if !pages.contains(&url) {
                tracing::debug!("MFN report link: {}", text);
                pages.push(url);
            }
        }
    }
    pages
}

// --- Sources ---

/// Annual-report search on Cision News.
#[derive(Debug, Clone)]
pub struct CisionSource {
    client: HttpClient,
    base_url: String,
    pause: Duration,
}

impl CisionSource {
    pub const DEFAULT_BASE_URL: &'static str = "https://news.cision.com";

    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            pause: DEFAULT_PAUSE,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    async fn pause(&self) {
        if !self.pause.is_zero() {
            tokio::time::sleep(self.pause).await;
        }
    }

    async fn company_page(&self, company_name: &str) -> Option<String> {
        for url in candidates::cision_page_urls(&self.base_url, company_name) {
            tracing::info!("  Trying Cision URL: {}", url);
            match self.client.get_page(&url).await {
                Ok(page) if is_company_page(&page.body, &CISION_PAGE_CLASS_RE) => {
                    tracing::info!("    Found Cision company page");
                    return Some(url);
                }
                Ok(_) => tracing::debug!("    {} is not a company page", url),
                Err(e) => tracing::debug!("    {}: {}", url, e),
            }
        }
        tracing::info!("    Could not find Cision page for {}", company_name);
        None
    }

    fn search_urls(page: &str, years: &[i32]) -> Vec<String> {
        let mut urls = vec![format!("{}/?m=Financial", page)];
        for query in ["annual%20report", "publishes%20annual", "årsredovisning"] {
            urls.push(format!("{}/?q={}", page, query));
        }
        for year in years {
            urls.push(format!("{}/?q=annual%20report%20{}", page, year));
            urls.push(format!("{}/?q=årsredovisning%20{}", page, year));
        }
        urls
    }

    /// Best annual-report announcement per year across the financial listing
    /// and the search queries.
    pub async fn announcements(&self, page: &str, years: &[i32]) -> Vec<Announcement> {
        let mut all: Vec<Announcement> = Vec::new();
        for search_url in Self::search_urls(page, years) {
            tracing::info!("  Searching Cision: {}", search_url);
            match self.client.get_page(&search_url).await {
                Ok(listing) => {
                    for found in parse_cision_listing(&listing.body, &self.base_url, years) {
                        if !all.iter().any(|a| a.detail_url == found.detail_url) {
                            all.push(found);
                        }
                    }
                }
                Err(e) => tracing::debug!("    {}", e),
            }
            self.pause().await;
        }

        let best = best_announcements(all);
        for a in &best {
            tracing::info!("    Found {} report (priority {}): {}", a.year, a.priority, a.title);
        }
        best
    }

    pub async fn find_reports(&self, company: &Company, years: &[i32]) -> Vec<ReportCandidate> {
        tracing::info!("  Searching Cision News for {}...", company.name);
        let Some(page) = self.company_page(&company.name).await else {
            return Vec::new();
        };

        let mut results = Vec::new();
        for announcement in self.announcements(&page, years).await {
            tracing::info!("  Extracting PDFs from: {}", announcement.detail_url);
            let pdfs = match self.client.get_page(&announcement.detail_url).await {
                Ok(detail) => pdf_attachments(&detail.body, &announcement.detail_url),
                Err(e) => {
                    tracing::warn!("    {}", e);
                    Vec::new()
                }
            };
            if pdfs.is_empty() {
                tracing::warn!("    No PDF links found on page");
            }
            for (i, pdf) in pdfs.iter().take(CISION_PDFS_PER_YEAR).enumerate() {
                let title = if i == 0 {
                    announcement.title.clone()
                } else {
                    format!("{} (attachment {})", announcement.title, i + 1)
                };
                results.push(ReportCandidate::new(
                    company,
                    announcement.year,
                    pdf,
                    &title,
                    &announcement.detail_url,
                    DiscoveryMethod::Cision,
                ));
            }
            self.pause().await;
        }

        tracing::info!("  Cision search found {} PDF candidates", results.len());
        results
    }
}

/// Annual-report search on MFN.
#[derive(Debug, Clone)]
pub struct MfnSource {
    client: HttpClient,
    base_url: String,
    pause: Duration,
}

impl MfnSource {
    pub const DEFAULT_BASE_URL: &'static str = "https://mfn.se";

    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            pause: DEFAULT_PAUSE,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    async fn company_page(&self, company_name: &str) -> Option<String> {
        for url in candidates::mfn_page_urls(&self.base_url, company_name) {
            tracing::info!("  Trying MFN URL: {}", url);
            match self.client.get_page(&url).await {
                Ok(page) if is_company_page(&page.body, &MFN_PAGE_CLASS_RE) => {
                    tracing::info!("    Found MFN company page");
                    return Some(url);
                }
                Ok(_) => tracing::debug!("    {} is not a company page", url),
                Err(e) => tracing::debug!("    {}: {}", url, e),
            }
        }
        tracing::info!("    Could not find MFN page for {}", company_name);
        None
    }

    pub async fn find_reports(&self, company: &Company, years: &[i32]) -> Vec<ReportCandidate> {
        tracing::info!("  Trying MFN search for {}...", company.name);
        let Some(page) = self.company_page(&company.name).await else {
            return Vec::new();
        };

        let mut results = Vec::new();
        for &year in years {
            let search_url = format!("{}?query={}%20annual%20report", page, year);
            tracing::info!("  Searching MFN for {} report: {}", year, search_url);
            let report_pages = match self.client.get_page(&search_url).await {
                Ok(listing) => parse_mfn_results(&listing.body, &search_url, year),
                Err(e) => {
                    tracing::warn!("    {}", e);
                    continue;
                }
            };
            if report_pages.is_empty() {
                tracing::info!("    No report links found for {}", year);
                continue;
            }

            for report_page in report_pages.iter().take(MFN_PAGES_PER_YEAR) {
                match self.client.get_page(report_page).await {
                    Ok(detail) => {
                        for pdf in pdf_attachments(&detail.body, report_page) {
                            results.push(ReportCandidate::new(
                                company,
                                year,
                                &pdf,
                                &format!("Annual Report {} (MFN/Cision)", year),
                                report_page,
                                DiscoveryMethod::Mfn,
                            ));
                        }
                    }
                    Err(e) => tracing::warn!("    {}", e),
                }
                if !self.pause.is_zero() {
                    tokio::time::sleep(self.pause).await;
                }
            }
        }

        tracing::info!("  MFN search found {} potential reports", results.len());
        results
    }
}
