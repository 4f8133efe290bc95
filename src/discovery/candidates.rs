// src/discovery/candidates.rs
//! Static URL heuristics: known per-company file-name patterns, common IR
//! sub-paths and aggregator slugs.
use crate::names;
use url::Url;

/// Hosts whose annual reports live at a predictable address but are linked
/// only from script-rendered pages.
struct DirectPattern {
    host: &'static str,
    templates: &'static [&'static str],
}

const DIRECT_PATTERNS: &[DirectPattern] = &[DirectPattern {
    host: "assaabloy.com",
    // Capitalisation of "report" changed between years.
    templates: &[
        "https://www.assaabloy.com/group/en/documents/investors/annual-reports/{year}/Annual%20Report%20{year}.pdf",
        "https://www.assaabloy.com/group/en/documents/investors/annual-reports/{year}/Annual%20report%20{year}.pdf",
    ],
}];

/// IR sub-paths that usually hold an annual-report archive. Entries starting
/// with `{base}` are appended to the IR page path; the rest hang off the root.
const COMMON_REPORT_PATHS: &[&str] = &[
    "{base}/annual-reports",
    "{base}/annual-reporting-suite",
    "{base}/reports-and-publications",
    "{base}/arsredovisningar",
    "/annual-reports",
    "/annual-reporting-suite",
    "/reports-and-publications",
    "/financial-reports/annual-reports",
    "/investerare/finansiella-rapporter/arsredovisningar",
    "/investors/financial-reports/annual-reports",
    "/investerare/finansiella-rapporter",
    "{base}/annual-reports?lang=sv",
    "{base}/arsredovisningar?lang=sv",
];

/// Where the IR section usually lives relative to the site root.
pub const MAIN_SITE_IR_PATHS: &[&str] = &[
    "/investors",
    "/investor-relations",
    "/investerare",
    "/en/investors",
    "/group/en/investors",
];

/// Cision News slugs that differ from the plain company name.
const CISION_SLUGS: &[(&str, &str, bool)] = &[
    ("nordea bank abp", "nordea", false),
    ("nordea bank", "nordea", false),
    ("nordea", "nordea", false),
    ("seb a", "seb", false),
    ("seb", "seb", false),
    ("skandinaviska enskilda banken", "seb", false),
    ("sv. handelsbanken", "handelsbanken", false),
    ("svenska handelsbanken", "handelsbanken", false),
    ("handelsbanken", "handelsbanken", false),
    ("alfa laval", "alfa-laval", false),
    ("atlas copco", "atlas-copco", false),
    ("assa abloy", "assa-abloy", false),
    ("nibe industrier", "nibe-industrier", false),
    ("telia company", "telia-company", false),
    ("hexagon", "hexagon", false),
    ("volvo", "volvo", false),
    ("ericsson", "ericsson", true),
    ("sandvik", "sandvik", false),
    ("skf", "skf", false),
    ("electrolux", "electrolux", true),
    ("investor", "investor", true),
    ("swedbank", "swedbank", false),
    ("boliden", "boliden", true),
    ("epiroc", "epiroc", false),
    ("essity", "essity", false),
    ("getinge", "getinge", false),
    ("evolution", "evolution", false),
    ("eqt", "eqt", false),
    ("h & m", "h---m-hennes---mauritz-ab", true),
    ("h&m", "h---m-hennes---mauritz-ab", true),
    ("hennes & mauritz", "h---m-hennes---mauritz-ab", true),
    ("hennes mauritz", "h---m-hennes---mauritz-ab", true),
    ("h m", "h---m-hennes---mauritz-ab", true),
];

/// Slugs published under the Swedish `/se/` section of Cision News.
const CISION_SE_SLUGS: &[&str] = &[
    "h---m-hennes---mauritz-ab",
    "boliden",
    "electrolux",
    "ericsson",
    "investor",
];

/// Known direct PDF addresses for a year, if the IR host has a pattern.
pub fn direct_pattern_urls(ir_url: &str, year: i32) -> Vec<String> {
    let Some(host) = Url::parse(ir_url).ok().and_then(|u| u.host_str().map(str::to_lowercase)) else {
        return Vec::new();
    };
    DIRECT_PATTERNS
        .iter()
        .filter(|pattern| host.contains(pattern.host))
        .flat_map(|pattern| pattern.templates.iter())
        .map(|template| template.replace("{year}", &year.to_string()))
        .collect()
}

/// Absolute URLs of the common report archive paths for an IR page.
pub fn common_report_urls(ir_url: &str) -> Vec<String> {
    let Ok(parsed) = Url::parse(ir_url) else {
        return Vec::new();
    };
    let origin = parsed.origin().ascii_serialization();
    let base_path = parsed.path().trim_end_matches('/');

    let mut urls: Vec<String> = Vec::new();
    for path in COMMON_REPORT_PATHS {
        let path = path.replace("{base}", base_path);
        let url = format!("{}{}", origin, path);
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    urls
}

/// Candidate IR page URLs under a site root.
pub fn main_site_ir_urls(root: &str) -> Vec<String> {
    let Ok(parsed) = Url::parse(root) else {
        return Vec::new();
    };
    let origin = parsed.origin().ascii_serialization();
    MAIN_SITE_IR_PATHS
        .iter()
        .map(|path| format!("{}{}", origin, path))
        .collect()
}

/// Cision News slug for a company and whether it lives under `/se/`.
pub fn cision_slug(company_name: &str) -> (String, bool) {
    let stripped = names::strip_legal_suffix(&names::strip_share_class(company_name));
    let key = stripped.trim().to_lowercase();

    if let Some((_, slug, se)) = CISION_SLUGS.iter().find(|(name, _, _)| *name == key) {
        return (slug.to_string(), *se);
    }

    let slug = names::hyphen_slug(company_name);
    let uses_se = CISION_SE_SLUGS.contains(&slug.as_str());
    (slug, uses_se)
}

/// Cision company pages to try, most likely first.
pub fn cision_page_urls(base: &str, company_name: &str) -> Vec<String> {
    let base = base.trim_end_matches('/');
    let (slug, uses_se) = cision_slug(company_name);
    let first_word = names::first_word_slug(company_name);

    let mut urls = if uses_se {
        vec![format!("{}/se/{}", base, slug), format!("{}/{}", base, slug)]
    } else {
        vec![format!("{}/{}", base, slug), format!("{}/se/{}", base, slug)]
    };
    if !first_word.is_empty() && first_word != slug {
        urls.push(format!("{}/{}", base, first_word));
        urls.push(format!("{}/se/{}", base, first_word));
    }
    urls.dedup();
    urls
}

/// MFN company pages to try.
pub fn mfn_page_urls(base: &str, company_name: &str) -> Vec<String> {
    let base = base.trim_end_matches('/');
    let slug = names::first_word_slug(company_name);
    if slug.is_empty() {
        return Vec::new();
    }
    vec![format!("{}/all/a/{}", base, slug), format!("{}/all/{}", base, slug)]
}
