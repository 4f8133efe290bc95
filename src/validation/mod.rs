// src/validation/mod.rs
//! Checks that a downloaded PDF is the annual report it claims to be.
pub mod pdf;

use crate::config::ValidationSettings;
use crate::storage::StoredReport;
use crate::utils::error::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

static NAME_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s+(AB|Ltd|Group|Inc|Corp|Plc|A|B)$").expect("Failed to compile NAME_SUFFIX_RE")
});

/// Page count at which the page-count share of the confidence maxes out.
const FULL_PAGE_SCORE_AT: usize = 200;
const PAGE_WEIGHT: f64 = 40.0;
const COMPANY_WEIGHT: f64 = 30.0;
const YEAR_WEIGHT: f64 = 30.0;

/// Outcome of validating one PDF.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    /// 0 to 100, one decimal.
    pub confidence: f64,
    pub pages: usize,
    pub company_found: bool,
    pub year_found: bool,
    pub issues: Vec<String>,
}

impl ValidationResult {
    /// Result for a file that could not be examined at all.
    pub fn failed(issue: String) -> Self {
        Self {
            valid: false,
            confidence: 0.0,
            pages: 0,
            company_found: false,
            year_found: false,
            issues: vec![issue],
        }
    }
}

/// Ways a company name may appear in its report.
pub fn name_variations(company_name: &str) -> Vec<String> {
    let mut variations = vec![company_name.to_string()];
    let base = NAME_SUFFIX_RE.replace(company_name, "").to_string();
    if base != company_name && !base.trim().is_empty() {
        variations.push(base);
    }
    let upper = company_name.to_uppercase();
    if !variations.contains(&upper) {
        variations.push(upper);
    }
    variations
}

/// Ways a fiscal year may be written (2024, 2023/24, 2023-24, ...).
pub fn year_patterns(year: i32) -> Vec<String> {
    vec![
        year.to_string(),
        format!("{}/{:02}", year - 1, year % 100),
        format!("{}-{:02}", year - 1, year % 100),
        format!("annual report {}", year),
        format!("årsredovisning {}", year),
    ]
}

/// Page-count share of the confidence: 0 at `min_pages`, rising linearly to
/// 40 at 200 pages. Zero outside the configured bounds.
pub fn page_score(pages: usize, settings: &ValidationSettings) -> f64 {
    if pages < settings.min_pages || pages > settings.max_pages {
        return 0.0;
    }
    if FULL_PAGE_SCORE_AT <= settings.min_pages {
        return PAGE_WEIGHT;
    }
    let span = (FULL_PAGE_SCORE_AT - settings.min_pages) as f64;
    ((pages - settings.min_pages) as f64 / span * PAGE_WEIGHT).min(PAGE_WEIGHT)
}

/// Scores a document from its page count and sampled text.
pub fn assess(
    pages: usize,
    text: &str,
    company_name: &str,
    year: i32,
    settings: &ValidationSettings,
) -> ValidationResult {
    let mut issues = Vec::new();
    if pages < settings.min_pages {
        issues.push(format!("Too few pages ({} < {})", pages, settings.min_pages));
    } else if pages > settings.max_pages {
        issues.push(format!("Suspiciously many pages ({} > {})", pages, settings.max_pages));
    }

    let haystack = text.to_lowercase();
    let company_found = name_variations(company_name)
        .iter()
        .any(|name| haystack.contains(&name.to_lowercase()));
    if !company_found {
        issues.push(format!("Company name \"{}\" not found in PDF", company_name));
    }

    let year_found = year_patterns(year).iter().any(|p| haystack.contains(&p.to_lowercase()));
    if !year_found {
        issues.push(format!("Year {} not found in PDF", year));
    }

    let mut confidence = page_score(pages, settings);
    if company_found {
        confidence += COMPANY_WEIGHT;
    }
    if year_found {
        confidence += YEAR_WEIGHT;
    }
    let confidence = (confidence * 10.0).round() / 10.0;

    let in_bounds = pages >= settings.min_pages && pages <= settings.max_pages;
    ValidationResult {
        valid: confidence >= settings.confidence_threshold && company_found && year_found && in_bounds,
        confidence,
        pages,
        company_found,
        year_found,
        issues,
    }
}

pub struct PdfValidator {
    settings: ValidationSettings,
}

impl PdfValidator {
    pub fn new(settings: &ValidationSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    /// Opens the PDF and assesses it. Unextractable text is an issue on an
    /// invalid result; a missing or unreadable file is an error.
    pub fn validate(&self, path: &Path, company_name: &str, year: i32) -> Result<ValidationResult, ValidationError> {
        let (pages, text) = pdf::inspect_pdf(path, self.settings.max_pages_to_check)?;
        match text {
            Ok(text) => Ok(assess(pages, &text, company_name, year, &self.settings)),
            Err(e) => {
                tracing::warn!("Cannot extract text from {}: {}", path.display(), e);
                let mut result = ValidationResult::failed(e.to_string());
                result.pages = pages;
                Ok(result)
            }
        }
    }
}

/// One row of `validation_results.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    #[serde(rename = "CID")]
    pub cid: String,
    #[serde(rename = "Company_Name")]
    pub company_name: String,
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Filename")]
    pub file_name: String,
    #[serde(rename = "Valid")]
    pub valid: bool,
    #[serde(rename = "Confidence")]
    pub confidence: f64,
    #[serde(rename = "Pages")]
    pub pages: usize,
    #[serde(rename = "Company_Found")]
    pub company_found: bool,
    #[serde(rename = "Year_Found")]
    pub year_found: bool,
    #[serde(rename = "Issues")]
    pub issues: String,
    #[serde(rename = "Source_Path")]
    pub source_path: String,
    #[serde(rename = "Validated_Date")]
    pub validated_date: String,
    #[serde(rename = "IR_URL")]
    pub ir_url: String,
}

impl ValidationRecord {
    pub fn new(report: &StoredReport, company_name: &str, ir_url: &str, result: &ValidationResult, validated_date: &str) -> Self {
        Self {
            cid: report.cid.clone(),
            company_name: company_name.to_string(),
            year: report.year,
            file_name: report.file_name.clone(),
            valid: result.valid,
            confidence: result.confidence,
            pages: result.pages,
            company_found: result.company_found,
            year_found: result.year_found,
            issues: result.issues.join("; "),
            source_path: report.path.display().to_string(),
            validated_date: validated_date.to_string(),
            ir_url: ir_url.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ValidationSettings {
        ValidationSettings::default()
    }

    #[test]
    fn test_name_variations() {
        assert_eq!(
            name_variations("Volvo AB"),
            vec!["Volvo AB".to_string(), "Volvo".to_string(), "VOLVO AB".to_string()]
        );
        assert_eq!(name_variations("ABB"), vec!["ABB".to_string()], "upper-case duplicate dropped");
    }

    #[test]
    fn test_year_patterns() {
        let patterns = year_patterns(2024);
        assert!(patterns.contains(&"2023/24".to_string()));
        assert!(patterns.contains(&"2023-24".to_string()));
        assert_eq!(year_patterns(2010)[1], "2009/10");
    }

    #[test]
    fn test_page_score() {
        let s = settings();
        assert_eq!(page_score(50, &s), 0.0);
        assert_eq!(page_score(125, &s), 20.0);
        assert_eq!(page_score(200, &s), 40.0);
        assert_eq!(page_score(450, &s), 40.0);
        assert_eq!(page_score(49, &s), 0.0);
        assert_eq!(page_score(501, &s), 0.0);
    }

    #[test]
    fn test_assess_valid_report() {
        let text = "Volvo Group\nAnnual and Sustainability Report 2023";
        let result = assess(220, text, "Volvo AB", 2023, &settings());
        assert!(result.valid);
        assert_eq!(result.confidence, 100.0);
        assert!(result.issues.is_empty(), "{:?}", result.issues);
    }

    #[test]
    fn test_assess_split_fiscal_year() {
        let result = assess(140, "ACME LTD report for 2022/23", "Acme Ltd", 2023, &settings());
        assert!(result.year_found);
        assert!(result.company_found);
        assert_eq!(result.confidence, 84.0);
        assert!(result.valid);
    }

    #[test]
    fn test_assess_missing_name_and_short() {
        let result = assess(30, "Interim report 2023", "Volvo AB", 2023, &settings());
        assert!(!result.valid);
        assert_eq!(result.confidence, 30.0);
        assert_eq!(
            result.issues,
            vec![
                "Too few pages (30 < 50)".to_string(),
                "Company name \"Volvo AB\" not found in PDF".to_string(),
            ]
        );
    }

    #[test]
    fn test_assess_too_many_pages_invalid_despite_confidence() {
        let result = assess(640, "Volvo annual report 2023", "Volvo AB", 2023, &settings());
        assert_eq!(result.confidence, 60.0);
        assert!(!result.valid);
        assert_eq!(result.issues, vec!["Suspiciously many pages (640 > 500)".to_string()]);
    }

    #[test]
    fn test_assess_rounds_confidence() {
        let result = assess(51, "Volvo 2023", "Volvo AB", 2023, &settings());
        assert_eq!(result.confidence, 60.3);
    }

    #[test]
    fn test_validator_on_generated_pdf() {
        let dir = std::env::temp_dir().join(format!("report_fetcher_validate_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("annual_report_2023.pdf");
        std::fs::write(&path, pdf::sample_pdf(60, "Example AB Annual Report 2023")).unwrap();

        let validator = PdfValidator::new(&settings());
        let result = validator.validate(&path, "Example AB", 2023).unwrap();
        assert_eq!(result.pages, 60);
        assert!(result.company_found);
        assert!(result.year_found);
        assert!(result.valid, "{:?}", result);
        std::fs::remove_dir_all(&dir).ok();
    }
}
