// src/discovery/links.rs

// --- Imports ---
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use url::Url;

// --- Pattern sources (shared with the debug annotator) ---
pub const ANNUAL_PATTERN: &str = r"(?i)annual.*report|[åa]rsredovisning|[åa]rsbericht|rapport.*annuel|financial.*report|integrated.*report";
pub const EXCLUDE_PATTERN: &str = r"(?i)form\s*20[-\s]*f|form\s*sd|proxy|10-k|8-k|q[1-4]|quarter|interim|delårs|kvartals|half[-\s]?year|h[1-2]\s*20\d{2}";
pub const NAVIGATION_PATTERN: &str = r"(?i)financials?[\s_-]+(information|reports|data)|reports?[\s_-]+((and|&)[\s_-]+)?presentations?|annual[\s_-]+reports?|annual[\s_-]+reporting|publications?|downloads?|library|archive";

// --- CSS Selectors (Lazy Static) ---
static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a[href]").expect("Failed to compile ANCHOR_SELECTOR")
});

static JSON_LD_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("script[type='application/ld+json']").expect("Failed to compile JSON_LD_SELECTOR")
});

// Navigation containers: semantic elements plus menu-like class names
static NAVIGATION_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("nav, header, [class*='nav'], [class*='menu'], [class*='header'], [class*='Nav'], [class*='Menu'], [class*='Header']")
        .expect("Failed to compile NAVIGATION_SELECTOR")
});

static FOOTER_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("footer, [class*='footer'], [class*='Footer']").expect("Failed to compile FOOTER_SELECTOR")
});

static DATA_HREF_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("[data-href]").expect("Failed to compile DATA_HREF_SELECTOR")
});

// --- Regex Patterns (Lazy Static) ---
static ANNUAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(ANNUAL_PATTERN).expect("Failed to compile ANNUAL_RE"));
static EXCLUDE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(EXCLUDE_PATTERN).expect("Failed to compile EXCLUDE_RE"));
static NAVIGATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(NAVIGATION_PATTERN).expect("Failed to compile NAVIGATION_RE"));

static SEC_FILING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)form\s*20[-\s]*f|form\s*sd|proxy|10-k|8-k").expect("Failed to compile SEC_FILING_RE")
});
static QUARTERLY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)q[1-4]|quarter|interim|delårs|kvartals").expect("Failed to compile QUARTERLY_RE")
});
static HALF_YEAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)half[-\s]?year|h[1-2]\s*20\d{2}").expect("Failed to compile HALF_YEAR_RE")
});

// Footer links are only kept when they point at investor material
static FOOTER_KEEP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)investor|investerare|financial|\bir\b").expect("Failed to compile FOOTER_KEEP_RE")
});

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("Failed to compile WHITESPACE_RE"));

// --- Data Structures ---

/// Where on the page a link was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkSource {
    Html,
    JsonLd,
    Navigation,
    Footer,
    DataAttribute,
}

impl LinkSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkSource::Html => "html",
            LinkSource::JsonLd => "json-ld",
            LinkSource::Navigation => "navigation",
            LinkSource::Footer => "footer",
            LinkSource::DataAttribute => "data-attr",
        }
    }
}

/// Why an annual-looking PDF link was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionReason {
    SecFiling,
    Quarterly,
    HalfYear,
    Other,
}

impl ExclusionReason {
    pub fn describe(&self) -> &'static str {
        match self {
            ExclusionReason::SecFiling => "SEC filing",
            ExclusionReason::Quarterly => "Quarterly report",
            ExclusionReason::HalfYear => "Half-year report",
            ExclusionReason::Other => "filtered",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkClass {
    /// Annual-report PDF candidate.
    Report,
    /// Annual-looking PDF that is really a filing, quarterly or half-year report.
    Excluded(ExclusionReason),
    /// Page that may lead to reports.
    Navigation,
    Irrelevant,
}

/// A link harvested from a page, before resolution against the page URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    pub href: String,
    pub text: String,
    pub title: String,
    pub source: LinkSource,
}

impl PageLink {
    fn new(href: &str, text: &str, title: &str, source: LinkSource) -> Self {
        Self {
            href: href.trim().to_string(),
            text: clean_text(text),
            title: clean_text(title),
            source,
        }
    }

    /// Lower-cased `href text title`, the string every pattern runs against.
    pub fn combined(&self) -> String {
        format!("{} {} {}", self.href, self.text, self.title).to_lowercase()
    }

    /// Navigation and footer links are queued ahead of body links.
    pub fn is_priority(&self) -> bool {
        matches!(self.source, LinkSource::Navigation | LinkSource::Footer)
    }

    pub fn looks_like_pdf(&self) -> bool {
        let href = self.href.to_lowercase();
        href.ends_with(".pdf")
            || href.contains("pdf")
            || href.contains("download")
            || self.text.to_lowercase().contains("(pdf)")
    }

    /// Worth following when crawling for reports.
    pub fn is_followable(&self) -> bool {
        self.is_priority() || NAVIGATION_RE.is_match(&self.combined())
    }

    pub fn classify(&self) -> LinkClass {
        let combined = self.combined();
        if self.looks_like_pdf() && ANNUAL_RE.is_match(&combined) {
            return match exclusion_reason(&combined) {
                Some(reason) => LinkClass::Excluded(reason),
                None => LinkClass::Report,
            };
        }
        if self.is_followable() {
            LinkClass::Navigation
        } else {
            LinkClass::Irrelevant
        }
    }

    /// Link text, falling back to the title attribute.
    pub fn label(&self) -> &str {
        if self.text.is_empty() {
            &self.title
        } else {
            &self.text
        }
    }
}

// --- Free functions ---

fn clean_text(text: &str) -> String {
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}

pub fn matches_annual(text: &str) -> bool {
    ANNUAL_RE.is_match(text)
}

pub fn is_quarterly(text: &str) -> bool {
    QUARTERLY_RE.is_match(text)
}

/// Reason a string matches the exclusion list, if it does.
pub fn exclusion_reason(text: &str) -> Option<ExclusionReason> {
    if !EXCLUDE_RE.is_match(text) {
        return None;
    }
    if SEC_FILING_RE.is_match(text) {
        Some(ExclusionReason::SecFiling)
    } else if QUARTERLY_RE.is_match(text) {
        Some(ExclusionReason::Quarterly)
    } else if HALF_YEAR_RE.is_match(text) {
        Some(ExclusionReason::HalfYear)
    } else {
        Some(ExclusionReason::Other)
    }
}

/// Collects links from anchors, JSON-LD blocks, navigation and footer
/// sections, and `data-href` attributes. A link found in several places is
/// reported once per source.
pub fn extract_links(html: &str) -> Vec<PageLink> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();

    // 1. Plain anchors
    for anchor in document.select(&ANCHOR_SELECTOR) {
        let href = anchor.value().attr("href").unwrap_or_default();
        let title = anchor.value().attr("title").unwrap_or_default();
        links.push(PageLink::new(href, &element_text(&anchor), title, LinkSource::Html));
    }

    // 2. JSON-LD structured data
    for script in document.select(&JSON_LD_SELECTOR) {
        let raw = script.text().collect::<String>();
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => collect_json_ld_links(&value, &mut links),
            Err(e) => tracing::debug!("Skipping unparsable JSON-LD block: {}", e),
        }
    }

    // 3. Navigation menus
    for container in document.select(&NAVIGATION_SELECTOR) {
        for anchor in container.select(&ANCHOR_SELECTOR) {
            let href = anchor.value().attr("href").unwrap_or_default();
            let title = anchor.value().attr("title").unwrap_or_default();
            let link = PageLink::new(href, &element_text(&anchor), title, LinkSource::Navigation);
            if !links.contains(&link) {
                links.push(link);
            }
        }
    }

    // 4. Footer links pointing at investor material
    for container in document.select(&FOOTER_SELECTOR) {
        for anchor in container.select(&ANCHOR_SELECTOR) {
            let href = anchor.value().attr("href").unwrap_or_default();
            let title = anchor.value().attr("title").unwrap_or_default();
            let link = PageLink::new(href, &element_text(&anchor), title, LinkSource::Footer);
            if FOOTER_KEEP_RE.is_match(&link.combined()) && !links.contains(&link) {
                links.push(link);
            }
        }
    }

    // 5. Script-driven links
    for element in document.select(&DATA_HREF_SELECTOR) {
        let href = element.value().attr("data-href").unwrap_or_default();
        let title = element.value().attr("data-title").unwrap_or_default();
        links.push(PageLink::new(href, &element_text(&element), title, LinkSource::DataAttribute));
    }

    links.retain(|link| !link.href.is_empty());
    links
}

/// Walks a JSON-LD value and records every absolute URL stored under a
/// url-like key, labelled with the sibling `name`/`headline`.
fn collect_json_ld_links(value: &Value, links: &mut Vec<PageLink>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                let is_url_key = matches!(
                    key.to_lowercase().as_str(),
                    "url" | "contenturl" | "link" | "href"
                );
                if is_url_key {
                    if let Some(href) = val.as_str().filter(|s| s.starts_with("http")) {
                        let text = map
                            .get("name")
                            .and_then(Value::as_str)
                            .or_else(|| map.get("headline").and_then(Value::as_str))
                            .unwrap_or_default();
                        let title = map.get("description").and_then(Value::as_str).unwrap_or_default();
                        links.push(PageLink::new(href, text, title, LinkSource::JsonLd));
                    }
                } else {
                    collect_json_ld_links(val, links);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_json_ld_links(item, links);
            }
        }
        _ => {}
    }
}

/// Resolves an href against the page URL, dropping the fragment. Returns
/// `None` for script, mail and phone links.
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    let lower = href.to_lowercase();
    if href.is_empty()
        || href.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
    {
        return None;
    }
    let mut resolved = base.join(href).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    resolved.set_fragment(None);
    Some(resolved)
}

/// Finds the annual-report PDF linked from an HTML landing page. Prefers a
/// link containing `year_hint`, else the first match.
pub fn pdf_link_on_page(html: &str, page_url: &str, year_hint: Option<i32>) -> Option<String> {
    let base = Url::parse(page_url).ok()?;
    let document = Html::parse_document(html);

    let mut pdf_links = Vec::new();
    for anchor in document.select(&ANCHOR_SELECTOR) {
        let href = anchor.value().attr("href").unwrap_or_default();
        let href_lower = href.to_lowercase();
        let text = element_text(&anchor).to_lowercase();

        if !(href_lower.contains(".pdf") || text.contains("pdf")) {
            continue;
        }
        let is_report = ["annual", "report", "entire", "full"]
            .iter()
            .any(|kw| text.contains(kw) || href_lower.contains(kw));
        if !is_report {
            continue;
        }
        if let Some(resolved) = resolve_link(&base, href) {
            let resolved = resolved.to_string();
            if !pdf_links.contains(&resolved) {
                pdf_links.push(resolved);
            }
        }
    }

    if let Some(year) = year_hint {
        let year = year.to_string();
        if let Some(found) = pdf_links.iter().find(|link| link.contains(&year)) {
            return Some(found.clone());
        }
    }
    pdf_links.into_iter().next()
}
