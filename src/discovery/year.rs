// src/discovery/year.rs
//! Fiscal-year detection for report links and announcements.
use once_cell::sync::Lazy;
use regex::Regex;

// Four-digit year delimited inside a path or file name: /2023/, _2023., -2023-
static URL_YEAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[-_/](20(?:1[0-9]|2[0-9]))[-_.]").expect("Failed to compile URL_YEAR_RE")
});

// Two-digit year in a file name: ar_24.pdf, -19-
static URL_SHORT_YEAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[-_/](1[5-9]|2[0-9])[-_.]").expect("Failed to compile URL_SHORT_YEAR_RE")
});

static TEXT_YEAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(201[0-9]|202[0-9])\b").expect("Failed to compile TEXT_YEAR_RE")
});

// "24" or "23/24"; the first number wins.
static TEXT_SHORT_YEAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(19|2[0-9])(?:[/-](19|2[0-9]))?\b").expect("Failed to compile TEXT_SHORT_YEAR_RE")
});

// Phrases that pin the year of an announcement ("annual report for 2023").
static ANNOUNCEMENT_YEAR_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"for\s+(20\d{2})",
        r"för\s+(20\d{2})",
        r"reports?\s+(20\d{2})",
        r"reporting\s+(20\d{2})",
        r"redovisning[en]?\s+(20\d{2})",
        r"redovisning[en]?\s+för\s+(20\d{2})",
        r"annual\s+reports?\s+(20\d{2})",
        r"year\s+(20\d{2})",
        r"financial\s+year\s+(20\d{2})",
        r"helår[et]?\s+(20\d{2})",
        r"[-/](20\d{2})\b",
    ]
    .iter()
    .filter_map(|pat| Regex::new(pat).ok())
    .collect()
});

fn capture_year(re: &Regex, haystack: &str) -> Option<i32> {
    re.captures(haystack)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok())
}

/// Year encoded in a link target. Four-digit years win over two-digit ones.
pub fn year_from_url(href: &str) -> Option<i32> {
    let href = href.to_lowercase();
    capture_year(&URL_YEAR_RE, &href)
        .or_else(|| capture_year(&URL_SHORT_YEAR_RE, &href).map(|y| 2000 + y))
}

/// Year mentioned in link text or title.
pub fn year_from_text(text: &str) -> Option<i32> {
    capture_year(&TEXT_YEAR_RE, text)
        .or_else(|| capture_year(&TEXT_SHORT_YEAR_RE, text).map(|y| 2000 + y))
}

/// Year of a report link. The URL is trusted over the surrounding text,
/// which often mentions neighbouring years.
pub fn detect_year(href: &str, text: &str) -> Option<i32> {
    year_from_url(href).or_else(|| year_from_text(text))
}

/// Reporting year of a press announcement, from its headline first and
/// then from its URL slug.
pub fn announcement_year(text: &str, href: &str) -> Option<i32> {
    let text = text.to_lowercase();
    let href = href.to_lowercase();
    ANNOUNCEMENT_YEAR_RES
        .iter()
        .find_map(|re| capture_year(re, &text))
        .or_else(|| ANNOUNCEMENT_YEAR_RES.iter().find_map(|re| capture_year(re, &href)))
}
