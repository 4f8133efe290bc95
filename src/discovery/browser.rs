// src/discovery/browser.rs
//! Last-resort stage for IR pages that only list reports after JavaScript
//! runs. Rendering is blocking and runs on the blocking thread pool.
use super::links::is_quarterly;
use super::{DiscoveryMethod, ReportCandidate};
use crate::company::Company;
use crate::utils::error::DiscoveryError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

// Absolute PDF URL with "annual" and "report" somewhere in the path
static RENDERED_PDF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)https://[^"\s<>']+/[^"\s<>']*annual[^"\s<>']*report[^"\s<>']*\.pdf[^"\s<>']*"#)
        .expect("Failed to compile RENDERED_PDF_RE")
});

static ANY_YEAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"20[12]\d").expect("Failed to compile ANY_YEAR_RE")
});

/// Produces the DOM of a page after scripts have run.
pub trait PageRenderer: Send + Sync {
    fn render(&self, url: &str) -> Result<String, DiscoveryError>;
}

/// Headless Chrome renderer. Expands accordions and collapsed sections
/// before reading the DOM, since report archives often hide behind them.
#[cfg(feature = "browser")]
pub struct ChromeRenderer {
    settle: std::time::Duration,
}

#[cfg(feature = "browser")]
impl ChromeRenderer {
    const TOGGLE_SELECTORS: [&'static str; 4] = [
        "button[aria-expanded=\"false\"]",
        ".accordion-button",
        "[data-toggle=\"collapse\"]",
        "summary",
    ];
    const MAX_CLICKS_PER_SELECTOR: usize = 10;

    pub fn new() -> Self {
        Self {
            settle: std::time::Duration::from_millis(2000),
        }
    }
}

#[cfg(feature = "browser")]
impl Default for ChromeRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "browser")]
impl PageRenderer for ChromeRenderer {
    fn render(&self, url: &str) -> Result<String, DiscoveryError> {
        use headless_chrome::{Browser, LaunchOptions};

        let options = LaunchOptions::default_builder()
            .headless(true)
            .build()
            .map_err(|e| DiscoveryError::Browser(format!("Invalid launch options: {}", e)))?;
        let browser = Browser::new(options)
            .map_err(|e| DiscoveryError::Browser(format!("Failed to launch Chrome: {}", e)))?;
        let tab = browser
            .new_tab()
            .map_err(|e| DiscoveryError::Browser(format!("Failed to create tab: {}", e)))?;
        tab.navigate_to(url)
            .map_err(|e| DiscoveryError::Browser(format!("Navigation failed: {}", e)))?;
        tab.wait_until_navigated()
            .map_err(|e| DiscoveryError::Browser(format!("Page load failed: {}", e)))?;

        for selector in Self::TOGGLE_SELECTORS {
            let Ok(elements) = tab.find_elements(selector) else {
                continue;
            };
            for element in elements.iter().take(Self::MAX_CLICKS_PER_SELECTOR) {
                if element.click().is_ok() {
                    std::thread::sleep(std::time::Duration::from_millis(300));
                }
            }
        }
        std::thread::sleep(self.settle);

        tab.get_content()
            .map_err(|e| DiscoveryError::Browser(format!("Failed to read rendered page: {}", e)))
    }
}

/// A report PDF address found in rendered markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPdf {
    pub url: String,
    pub year: i32,
    pub file_name: String,
}

/// Annual-report PDF URLs in rendered HTML for `years`. Quarterly files are
/// recognised by their file name.
pub fn extract_rendered_pdf_links(html: &str, years: &[i32]) -> Vec<RenderedPdf> {
    let mut found: Vec<RenderedPdf> = Vec::new();
    for m in RENDERED_PDF_RE.find_iter(html) {
        let url = m.as_str().replace("&amp;", "&");
        if found.iter().any(|f| f.url == url) {
            continue;
        }
        let Some(year) = ANY_YEAR_RE
            .find(&url)
            .and_then(|y| y.as_str().parse::<i32>().ok())
            .filter(|y| years.contains(y))
        else {
            continue;
        };
        let file_name = url
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .split('?')
            .next()
            .unwrap_or_default()
            .to_string();
        if is_quarterly(&file_name) {
            continue;
        }
        found.push(RenderedPdf { url, year, file_name });
    }
    found
}

/// Renders `ir_url` and returns the report PDFs it links for `years`.
pub async fn find_reports(
    renderer: Arc<dyn PageRenderer>,
    company: &Company,
    ir_url: &str,
    years: &[i32],
) -> Result<Vec<ReportCandidate>, DiscoveryError> {
    tracing::info!("  Rendering {} in headless browser...", ir_url);
    let url = ir_url.to_string();
    let html = tokio::task::spawn_blocking(move || renderer.render(&url))
        .await
        .map_err(|e| DiscoveryError::Browser(format!("Render task failed: {}", e)))??;

    let pdfs = extract_rendered_pdf_links(&html, years);
    tracing::info!("  Found {} report PDF URLs in rendered page", pdfs.len());
    Ok(pdfs
        .into_iter()
        .map(|pdf| {
            ReportCandidate::new(
                company,
                pdf.year,
                &pdf.url,
                &pdf.file_name,
                ir_url,
                DiscoveryMethod::Browser,
            )
        })
        .collect())
}
