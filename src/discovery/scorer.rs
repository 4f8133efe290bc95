// src/discovery/scorer.rs
//! Heuristic scoring of IR-page URLs and report documents.
use crate::http::HttpClient;
use crate::names::{compact, SearchName};
use crate::utils::error::FetchError;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

// --- Word lists ---

const PATH_PATTERNS: &[&str] = &[
    "/investors",
    "/investor-relations",
    "/investerare",
    "/shareholders",
    "/investors-media",
    "/investerare-och-media",
    "/financial-data",
    "/investor",
];

const IR_KEYWORDS: &[&str] = &["investor", "ir", "investerare", "shareholder", "investors-media", "group"];

/// Terms that appear on genuine IR pages, English and Swedish.
const IR_PAGE_CONTENT_TERMS: &[&str] = &[
    "annual report", "financial report", "quarterly report", "investor relations",
    "shareholders", "stock", "share price", "dividend", "earnings", "financial statements",
    "corporate governance", "board of directors", "annual general meeting", "agm",
    "press release", "financial calendar", "reports and presentations",
    "årsredovisning", "kvartalsrapport", "investerare", "aktieägare", "aktiekurs",
    "utdelning", "bolagsstyrning", "styrelse", "årsstämma", "finansiell kalender",
    "rapporter", "pressmeddelande",
];

const PREFERRED_TLDS: &[&str] = &["se", "com"];
const ACCEPTABLE_TLDS: &[&str] = &["net", "org", "eu", "io"];
const SUSPICIOUS_TLDS: &[&str] = &[
    "cn", "ru", "fr", "de", "jp", "kr", "tw", "tr", "mx", "ar", "cl", "co", "in", "br", "hk",
    "pl", "ua", "it", "es", "pt", "nl", "be", "at", "ch", "cz", "hu", "ro", "bg", "gr", "th",
    "vn", "id", "my", "ph",
];

/// Aggregators, news sites, portals and other hosts that are never a
/// company's own IR page. Matched as substrings of the host.
const BAD_DOMAINS: &[&str] = &[
    // Financial aggregators and news
    "wikipedia.org", "quartr.com", "placera.se", "researchpool.com", "marketscreener.com",
    "bloomberg.com", "reuters.com", "yahoo.com", "morningstar.com", "nasdaq.com", "investing.com",
    "shareholdersfoundation.com", "alphaspread.com", "annualreports.com", "businesswirechina.com",
    "businesswire.com", "prnewswire.com", "globenewswire.com", "news.cision.com", "finanzen.net",
    "marketwatch.com", "thewallstreetjournal.com", "forbes.com", "ft.com", "financialtimes.com",
    "wsj.com", "barrons.com", "inderes.se", "capitoltrades.com", "seekingalpha.com",
    "financialreports.eu", "grokipedia.com", "slidegenius.com", "simplywall.st", "wallstreetzen.com",
    "tipranks.com", "zacks.com", "fool.com", "tracxn.com", "zaubacorp.com", "dnb.com",
    "tradingview.com", "allabolag.se", "hitta.se", "eniro.se", "proff.se", "bolagsfakta.se",
    "finanznachrichten.de", "advfn.com", "aum13f.com", "watchlistnews.com", "telegraph.co.uk",
    "marketwirenews.com", "trendspider.com", "investorshangout.com", "aktiedysten.dk", "esgnews.com",
    "stockopedia.com", "finanzen100.de", "nyemissioner.se", "trivano.com", "dagensps.se",
    "affarsvarlden.se", "webbinvestor.se", "borsvarlden.com", "nordnet.se", "rapidus.se",
    "daytrading.se", "borskollen.se", "centralcharts.com", "gurufocus.com", "stockinvest.us",
    "walletinvestor.com", "fiscal.ai", "etoro.com", "avanza.se", "di.se", "ariva.de",
    "stockpicker.se", "ir.financialhearings.com",
    // Search engines, portals and social media
    "bing.com", "duckduckgo.com", "baidu.com", "yandex.com", "yandex.ru", "facebook.com",
    "twitter.com", "x.com", "linkedin.com", "instagram.com", "youtube.com", "tiktok.com",
    // Forums and Q&A
    "zhihu.com", "reddit.com", "quora.com", "stackoverflow.com", "stackexchange.com",
    "forum.", "community.", "bbs.", "boards.",
    // App stores and support portals
    "apps.apple.com", "play.google.com", "support.google.com", "support.microsoft.com",
    "answers.microsoft.com", "support.apple.com", "office.com",
    // General media, travel and code hosting
    "bbc.com", "bbc.co.uk", "cnn.com", "nytimes.com", "theguardian.com", "britannica.com",
    "booking.com", "tripadvisor.com", "expedia.com", "github.com", "gitlab.com", "bitbucket.org",
];

const ADULT_DOMAINS: &[&str] = &[
    "onlyfans.com", "pornhub.com", "xvideos.com", "xnxx.com", "xhamster.com", "redtube.com",
    "youporn.com", "tube8.com", "spankbang.com", "chaturbate.com", "stripchat.com", "cam4.com",
    "livejasmin.com", "bongacams.com", "myfreecams.com", "fansly.com", "manyvids.com",
    "clips4sale.com", "iwantclips.com",
];

const PRESS_KEYWORDS: &[&str] = &[
    "/news/", "/press-release", "/pr/", "/press/", "/article/", "/stories/", "/media/", "/blog/",
    "/announcement/", "/medya/", "/hikayeler/", "/tiedotteet/",
];

const EVENT_KEYWORDS: &[&str] = &[
    "call", "webcast", "presentation", "q1", "q2", "q3", "q4", "2023", "2024", "2025", "agm",
    "egm", "nomination-committee", "contacts-information", "key-ratios", "financial-reports",
];

const IR_SUBDOMAINS: &[&str] = &["ir.", "investors.", "group.", "global."];

// --- Regex and selectors ---

static GOOGLE_HOST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(www\.)?google\.[a-z]{2,3}$").expect("Failed to compile GOOGLE_HOST_RE")
});

static ADULT_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)/r/\w*(porn|nsfw|xxx|nude|gonewild|sex|hentai)\w*").expect("Failed to compile ADULT_PATH_RE")
});

static DATE_SEGMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/\d{4}/").expect("Failed to compile DATE_SEGMENT_RE")
});

static LANGUAGE_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/(en|sv|en-gb|en-us)/").expect("Failed to compile LANGUAGE_PREFIX_RE")
});

static EXACT_IR_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    let alternatives = PATH_PATTERNS.join("|");
    Regex::new(&format!(r"^({})(\.html|\.aspx|\.php)?/?$", alternatives))
        .expect("Failed to compile EXACT_IR_PATH_RE")
});

static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("title").expect("Failed to compile TITLE_SELECTOR")
});

static DESCRIPTION_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("meta[name='description']").expect("Failed to compile DESCRIPTION_SELECTOR")
});

static OG_DESCRIPTION_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("meta[property='og:description']").expect("Failed to compile OG_DESCRIPTION_SELECTOR")
});

static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("body").expect("Failed to compile BODY_SELECTOR")
});

// --- IR URL scoring ---

/// Score of a candidate IR URL with the reasons that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlScore {
    pub score: i32,
    pub details: Vec<String>,
    /// Hard rejection (search engine, adult site); content is never fetched.
    pub rejected: bool,
}

impl UrlScore {
    fn new() -> Self {
        Self {
            score: 0,
            details: Vec::new(),
            rejected: false,
        }
    }

    fn add(&mut self, points: i32, reason: impl Into<String>) {
        self.score += points;
        self.details.push(format!("{} ({:+})", reason.into(), points));
    }
}

/// Scores a URL from its shape alone.
pub fn static_score(url: &str, name: &SearchName) -> UrlScore {
    let mut result = UrlScore::new();
    let Ok(parsed) = Url::parse(url) else {
        result.add(-100, "Unparsable URL");
        result.rejected = true;
        return result;
    };

    let host = parsed.host_str().unwrap_or_default().to_lowercase();
    let domain = host.replace("www.", "");
    let domain_simple = compact(&domain);
    let path = parsed.path().to_lowercase();
    let company = name.compact.as_str();

    if GOOGLE_HOST_RE.is_match(&host) {
        result.add(-500, "Google domain");
        result.rejected = true;
        return result;
    }
    if ADULT_DOMAINS.iter().any(|adult| domain.contains(adult)) {
        result.add(-200, format!("Adult site {}", domain));
        result.rejected = true;
        return result;
    }
    if ADULT_PATH_RE.is_match(&path) {
        result.add(-200, "Adult content path");
        result.rejected = true;
        return result;
    }

    if path.ends_with(".pdf") {
        result.add(-80, "PDF link");
    }
    if BAD_DOMAINS.iter().any(|bad| domain.contains(bad)) {
        result.add(-100, format!("Aggregator {}", domain));
    }

    let tld = domain.rsplit('.').next().unwrap_or_default();
    if PREFERRED_TLDS.contains(&tld) {
        result.add(50, format!("Preferred TLD .{}", tld));
        if tld == "se" {
            result.add(30, "Swedish .se TLD");
        }
    } else if ACCEPTABLE_TLDS.contains(&tld) {
        result.add(15, format!("Acceptable TLD .{}", tld));
    } else if SUSPICIOUS_TLDS.contains(&tld) {
        result.add(-80, format!("Suspicious TLD .{}", tld));
    }

    if domain.contains("group") || path.contains("/group/") {
        result.add(30, "Group site");
    }
    if IR_SUBDOMAINS.iter().any(|sub| domain.starts_with(sub)) {
        result.add(40, format!("IR subdomain {}", domain.split('.').next().unwrap_or_default()));
    }
    if PRESS_KEYWORDS.iter().any(|kw| path.contains(kw)) {
        result.add(-80, "Press/news path");
    }
    if EVENT_KEYWORDS.iter().any(|kw| path.contains(kw)) {
        result.add(-40, "Event/report specific path");
    }
    if DATE_SEGMENT_RE.is_match(&path) {
        result.add(-50, "Date in path");
    }

    if !company.is_empty() {
        if domain_simple == company {
            result.add(70, "Exact domain match");
        } else if domain_simple.starts_with(&format!("ir{}", company)) {
            result.add(60, "IR domain match");
        }
        // "Investor AB" would otherwise match every investor site
        if company == "investor" && domain.contains("investorab") {
            result.add(80, "Investor AB domain");
        }

        let segments: Vec<String> = domain.split('.').map(compact).collect();
        if segments.iter().any(|seg| seg == company) {
            result.add(45, "Domain segment exact match");
        } else if segments.iter().any(|seg| seg.contains(company)) {
            result.add(40, "Domain segment contains name");
        }
    }

    if PATH_PATTERNS.iter().any(|pat| path.contains(pat)) || domain.starts_with("ir.") {
        result.add(40, "IR path or subdomain");
        if path.contains("/shareholders") {
            result.add(30, "Shareholders path");
        }
        let clean_path = LANGUAGE_PREFIX_RE.replace(&path, "/");
        if EXACT_IR_PATH_RE.is_match(&clean_path) {
            result.add(60, "Exact IR path");
        }
    }

    if path.len() > 80 {
        result.add(-30, "Very long path");
    } else if path.len() > 60 {
        result.add(-20, "Long path");
    } else if path.len() > 40 || parsed.query().is_some() {
        result.add(-10, "Medium path or query");
    }

    result
}

/// Points for what a fetched HTML page says about itself.
pub fn content_score(html: &str, name: &SearchName) -> (i32, Vec<String>) {
    let document = Html::parse_document(html);
    let title = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|t| t.text().collect::<String>().to_lowercase())
        .unwrap_or_default();
    let description = document
        .select(&DESCRIPTION_SELECTOR)
        .chain(document.select(&OG_DESCRIPTION_SELECTOR))
        .filter_map(|meta| meta.value().attr("content"))
        .find(|content| !content.trim().is_empty())
        .map(str::to_lowercase)
        .unwrap_or_default();
    let page_text = format!(
        "{} {}",
        title,
        document
            .select(&BODY_SELECTOR)
            .next()
            .map(|body| body.text().collect::<Vec<_>>().join(" "))
            .unwrap_or_default()
    )
    .to_lowercase();

    let mut score = UrlScore::new();
    let company = name.compact.as_str();
    if !company.is_empty() {
        if compact(&title).contains(company) {
            score.add(20, "Company in title");
        }
        if compact(&description).contains(company) {
            score.add(10, "Company in description");
        }
    }
    if IR_KEYWORDS.iter().any(|kw| title.contains(kw)) {
        score.add(15, "IR keyword in title");
    }
    if IR_KEYWORDS.iter().any(|kw| description.contains(kw)) {
        score.add(10, "IR keyword in description");
    }

    let terms = IR_PAGE_CONTENT_TERMS
        .iter()
        .filter(|term| page_text.contains(*term))
        .count();
    match terms {
        n if n >= 5 => score.add(60, format!("Strong IR content, {} terms", n)),
        n if n >= 3 => score.add(30, format!("Moderate IR content, {} terms", n)),
        n if n >= 1 => score.add(10, format!("Weak IR content, {} terms", n)),
        _ => score.add(-80, "No IR content on page"),
    }

    (score.score, score.details)
}

/// Full score: URL shape plus fetched-page signals.
pub async fn score_url(client: &HttpClient, url: &str, name: &SearchName) -> UrlScore {
    let mut result = static_score(url, name);
    if result.rejected {
        return result;
    }

    match client.get_page(url).await {
        Ok(page) if page.is_html() => {
            let (points, details) = content_score(&page.body, name);
            result.score += points;
            result.details.extend(details);
        }
        Ok(page) => result.add(-20, format!("Non-HTML response ({})", page.content_type)),
        Err(FetchError::Http { status, .. }) => result.add(-20, format!("HTTP {}", status.as_u16())),
        Err(e) => {
            tracing::debug!("Scoring fetch failed for {}: {}", url, e);
            result.add(-10, "Fetch failed");
        }
    }
    result
}

// --- Report document classification ---

/// How likely a document is to be an annual report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportAssessment {
    /// 0.0 to 1.0.
    pub probability: f64,
    pub document_type: String,
    pub reasoning: String,
}

impl ReportAssessment {
    /// Probability on a 0-100 integer scale.
    pub fn percent(&self) -> i32 {
        (self.probability * 100.0).round() as i32
    }
}

const ANNUAL_INDICATORS: &[&str] = &[
    "annual report", "annual and sustainability", "årsredovisning", "annualreport",
    "annual-report", "arsredovisning",
];
const QUARTERLY_INDICATORS: &[&str] = &["q1", "q2", "q3", "q4", "quarter", "interim", "quarterly"];
const PRESS_INDICATORS: &[&str] = &["press release", "pr-", "news"];
const FORM_INDICATORS: &[&str] = &["form sd", "form 20-f", "10-k", "10-q"];
const CMD_INDICATORS: &[&str] = &["capital market", "cmd", "investor day"];

/// Estimates whether a document is an annual report from its title, URL and
/// page count. Starts neutral at 0.5; every matching indicator moves it.
pub fn classify_report_type(title: &str, url: &str, pages: Option<usize>) -> ReportAssessment {
    let title = title.to_lowercase();
    let url = url.to_lowercase();
    let mentions = |indicator: &str| title.contains(indicator) || url.contains(indicator);

    let mut score = 0.5_f64;
    let mut document_type = "Unknown";
    let mut reasons = Vec::new();

    let groups: [(&[&str], f64, &str); 5] = [
        (ANNUAL_INDICATORS, 0.3, "Annual Report"),
        (QUARTERLY_INDICATORS, -0.4, "Quarterly/Interim Report"),
        (PRESS_INDICATORS, -0.5, "Press Release"),
        (FORM_INDICATORS, 0.1, "SEC Form"),
        (CMD_INDICATORS, -0.5, "Capital Markets Day"),
    ];
    for (indicators, weight, kind) in groups {
        for indicator in indicators {
            if mentions(*indicator) {
                score += weight;
                document_type = kind;
                reasons.push(format!("Contains '{}'", indicator));
            }
        }
    }

    if let Some(pages) = pages {
        if pages >= 80 {
            score += 0.2;
            reasons.push(format!("{} pages (typical annual report)", pages));
        } else if pages >= 50 {
            score += 0.1;
            reasons.push(format!("{} pages (reasonable length)", pages));
        } else if pages < 30 {
            score -= 0.2;
            document_type = "Short Document";
            reasons.push(format!("Only {} pages (suspicious)", pages));
        }
    }

    ReportAssessment {
        probability: score.clamp(0.0, 1.0),
        document_type: document_type.to_string(),
        reasoning: if reasons.is_empty() {
            "No strong indicators".to_string()
        } else {
            reasons.join("; ")
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn volvo() -> SearchName {
        SearchName::new("Volvo AB B")
    }

    #[test]
    fn test_static_score_company_ir_page() {
        let score = static_score("https://www.volvogroup.com/en/investors.html", &volvo());
        // .com +50, group +30, segment contains name +40, IR path +40, exact IR path +60
        assert_eq!(score.score, 220, "details: {:?}", score.details);
        assert!(!score.rejected);
    }

    #[test]
    fn test_static_score_ir_subdomain_on_se() {
        let name = SearchName::new("Example AB");
        let score = static_score("https://investors.example.se/", &name);
        // .se +80, investors. subdomain +40, exact segment +45
        assert_eq!(score.score, 165, "details: {:?}", score.details);
    }

    #[test]
    fn test_google_and_adult_rejected() {
        let google = static_score("https://www.google.se/search?q=volvo", &volvo());
        assert_eq!(google.score, -500);
        assert!(google.rejected);

        let adult = static_score("https://www.reddit.com/r/somethingnsfw", &volvo());
        assert_eq!(adult.score, -200);
        assert!(adult.rejected);
    }

    #[test]
    fn test_aggregator_and_press_penalties() {
        let aggregator = static_score("https://www.marketscreener.com/quote/stock/VOLVO-AB/", &volvo());
        assert!(aggregator.score < 0, "aggregators must score negative: {:?}", aggregator);

        let press = static_score("https://www.volvogroup.com/en/news/2023/annual.html", &volvo());
        let clean = static_score("https://www.volvogroup.com/en/about.html", &volvo());
        assert!(press.score < clean.score - 100, "press {:?} vs clean {:?}", press, clean);
    }

    #[test]
    fn test_pdf_and_long_path_penalties() {
        let pdf = static_score("https://www.example.com/a.pdf", &SearchName::new("Other"));
        assert!(pdf.details.iter().any(|d| d.contains("PDF")));
        let long = static_score(
            &format!("https://www.example.com/{}", "x".repeat(90)),
            &SearchName::new("Other"),
        );
        assert!(long.details.iter().any(|d| d.contains("Very long path")));
    }

    #[test]
    fn test_content_score_strong_ir_page() {
        let html = r#"<html><head><title>Example Investors</title>
            <meta name="description" content="Shareholder information for Example"></head>
            <body><p>Annual report. Dividend. Share price. Corporate governance. Financial calendar.</p></body></html>"#;
        let (score, details) = content_score(html, &SearchName::new("Example AB"));
        // title +20, desc +10, keyword title +15, keyword desc +10, 5 terms +60
        assert_eq!(score, 115, "details: {:?}", details);
    }

    #[test]
    fn test_content_score_unrelated_page() {
        let html = "<html><head><title>Cooking</title></head><body>recipes</body></html>";
        let (score, _) = content_score(html, &SearchName::new("Example AB"));
        assert_eq!(score, -80);
    }

    #[tokio::test]
    async fn test_score_url_penalizes_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/investors"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpClient::new(&crate::config::HttpSettings::default()).unwrap();
        let url = format!("{}/investors", server.uri());
        let name = SearchName::new("Example");
        let static_only = static_score(&url, &name).score;
        let scored = score_url(&client, &url, &name).await;
        assert_eq!(scored.score, static_only - 20);
    }

    #[test]
    fn test_classify_annual_report() {
        let assessment = classify_report_type(
            "Annual Report 2023",
            "https://example.com/annual-report-2023.pdf",
            Some(180),
        );
        assert_eq!(assessment.probability, 1.0);
        assert_eq!(assessment.document_type, "Annual Report");
        assert!(assessment.reasoning.contains("180 pages"));
        assert_eq!(assessment.percent(), 100);
    }

    #[test]
    fn test_classify_quarterly_report() {
        let assessment = classify_report_type("Interim report Q3", "https://example.com/q3-2023.pdf", None);
        assert_eq!(assessment.probability, 0.0);
        assert_eq!(assessment.document_type, "Quarterly/Interim Report");
    }

    #[test]
    fn test_classify_neutral_and_short() {
        let neutral = classify_report_type("", "https://example.com/doc.pdf", None);
        assert_eq!(neutral.probability, 0.5);
        assert_eq!(neutral.reasoning, "No strong indicators");

        let short = classify_report_type("", "https://example.com/doc.pdf", Some(12));
        assert!((short.probability - 0.3).abs() < 1e-9);
        assert_eq!(short.document_type, "Short Document");
    }
}
