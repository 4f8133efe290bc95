// src/download/mod.rs
//! Fetches report PDFs for discovered candidates and records what happened.
use crate::company::Company;
use crate::config::{DownloadSettings, ValidationSettings};
use crate::discovery::links::pdf_link_on_page;
use crate::discovery::ReportCandidate;
use crate::http::retry::{retry_with_backoff, Backoff};
use crate::http::{FetchedBytes, HttpClient};
use crate::storage::StorageManager;
use crate::utils::error::{DownloadError, FetchError};
use crate::validation::pdf::page_count_from_bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Success,
    Skipped,
    Failed,
}

/// Outcome for one (company, year) in the download summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub year: i32,
    pub status: DownloadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_page: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_mb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DownloadRecord {
    fn empty(year: i32, status: DownloadStatus) -> Self {
        Self {
            year,
            status,
            url: None,
            title: None,
            source_page: None,
            pages: None,
            size_mb: None,
            path: None,
            timestamp: None,
            error: None,
            reason: None,
        }
    }

    /// The file was already on disk.
    pub fn skipped(year: i32) -> Self {
        Self {
            reason: Some("already_exists".to_string()),
            ..Self::empty(year, DownloadStatus::Skipped)
        }
    }

    pub fn success(candidate: &ReportCandidate, outcome: &DownloadOutcome) -> Self {
        Self {
            url: Some(candidate.url.clone()),
            title: Some(candidate.title.clone()),
            source_page: Some(candidate.source_page.clone()),
            pages: Some(outcome.pages),
            size_mb: Some(outcome.size_mb),
            path: Some(outcome.path.display().to_string()),
            timestamp: Some(chrono::Local::now().to_rfc3339()),
            ..Self::empty(candidate.year, DownloadStatus::Success)
        }
    }

    /// Every candidate failed; the record names the first one.
    pub fn failed(first: &ReportCandidate, error: String) -> Self {
        Self {
            url: Some(first.url.clone()),
            title: Some(first.title.clone()),
            source_page: Some(first.source_page.clone()),
            error: Some(error),
            ..Self::empty(first.year, DownloadStatus::Failed)
        }
    }
}

/// Per-company entry of `download_summary_<timestamp>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanySummary {
    pub cid: String,
    pub company: String,
    pub found: usize,
    pub downloaded: usize,
    #[serde(default)]
    pub skipped: usize,
    pub failed: usize,
    #[serde(default)]
    pub downloads: Vec<DownloadRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl CompanySummary {
    pub fn new(company: &Company, found: usize, downloads: Vec<DownloadRecord>) -> Self {
        let count = |status: DownloadStatus| downloads.iter().filter(|d| d.status == status).count();
        Self {
            cid: company.cid.clone(),
            company: company.name.clone(),
            found,
            downloaded: count(DownloadStatus::Success),
            skipped: count(DownloadStatus::Skipped),
            failed: count(DownloadStatus::Failed),
            downloads,
            error: None,
            error_type: None,
        }
    }

    /// A company whose processing failed before any download was tried.
    pub fn errored(company: &Company, error: String, error_type: &str) -> Self {
        Self {
            error: Some(error),
            error_type: Some(error_type.to_string()),
            ..Self::new(company, 0, Vec::new())
        }
    }
}

/// A PDF saved to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOutcome {
    /// URL the PDF was fetched from, after HTML landing-page resolution.
    pub pdf_url: String,
    pub path: PathBuf,
    pub pages: usize,
    pub size_mb: f64,
}

fn is_pdf_payload(fetched: &FetchedBytes) -> bool {
    fetched.content_type.contains("application/pdf") || fetched.bytes.starts_with(b"%PDF")
}

fn temp_path(output: &Path) -> PathBuf {
    let mut name: OsString = output.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

pub struct Downloader {
    client: HttpClient,
    max_retries: u32,
    retry_pause: Duration,
    year_pause: Duration,
    min_pages: usize,
    max_pages: usize,
}

impl Downloader {
    pub fn new(client: HttpClient, download: &DownloadSettings, validation: &ValidationSettings) -> Self {
        Self {
            client,
            max_retries: download.max_retries.max(1),
            retry_pause: Duration::from_millis(download.retry_pause_ms),
            year_pause: Duration::from_millis(download.year_pause_ms),
            min_pages: validation.min_pages,
            max_pages: validation.max_pages,
        }
    }

    /// The PDF behind a candidate URL. URLs not ending in `.pdf` are fetched;
    /// a PDF response is taken as is, an HTML page is searched for its
    /// annual-report PDF link.
    pub async fn resolve_pdf_url(&self, url: &str, year_hint: Option<i32>) -> Result<String, DownloadError> {
        let path_is_pdf = url::Url::parse(url)
            .map(|u| u.path().to_lowercase().ends_with(".pdf"))
            .unwrap_or_else(|_| url.to_lowercase().ends_with(".pdf"));
        if path_is_pdf {
            return Ok(url.to_string());
        }

        tracing::info!("  URL doesn't end with .pdf, checking if it's an HTML page...");
        let page = self.client.get_page(url).await?;
        if page.is_pdf() {
            return Ok(url.to_string());
        }
        match pdf_link_on_page(&page.body, &page.url, year_hint) {
            Some(pdf_url) => {
                tracing::info!("    Found PDF link on HTML page: {}", pdf_url);
                Ok(pdf_url)
            }
            None => Err(DownloadError::NoPdfLink(url.to_string())),
        }
    }

    /// Downloads one PDF to `output`, rotating user agents between attempts.
    /// The file appears at `output` only once its page count is within
    /// bounds.
    pub async fn download_pdf(
        &self,
        url: &str,
        output: &Path,
        year_hint: Option<i32>,
    ) -> Result<DownloadOutcome, DownloadError> {
        let pdf_url = self.resolve_pdf_url(url, year_hint).await?;

        tracing::info!("  Downloading from: {}", pdf_url);
        let fetched = retry_with_backoff(
            self.max_retries - 1,
            Backoff::Fixed(self.retry_pause),
            |attempt| {
                let agent = self.client.user_agent(attempt).to_string();
                let pdf_url = pdf_url.clone();
                async move {
                    let fetched = self.client.get_bytes(&pdf_url, &agent).await?;
                    if !is_pdf_payload(&fetched) {
                        return Err(FetchError::NotPdf {
                            url: pdf_url,
                            content_type: fetched.content_type,
                        });
                    }
                    Ok(fetched)
                }
            },
        )
        .await?;

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = temp_path(output);
        fs::write(&tmp, &fetched.bytes)?;
        let size_mb = fetched.bytes.len() as f64 / BYTES_PER_MB;
        tracing::info!("  Downloaded: {:.1} MB", size_mb);

        let pages = match page_count_from_bytes(&fetched.bytes) {
            Ok(pages) => pages,
            Err(e) => {
                fs::remove_file(&tmp).ok();
                return Err(DownloadError::Unreadable(e.to_string()));
            }
        };
        tracing::info!("  PDF has {} pages", pages);
        if pages < self.min_pages {
            fs::remove_file(&tmp).ok();
            return Err(DownloadError::TooFewPages {
                pages,
                min: self.min_pages,
            });
        }
        if pages > self.max_pages {
            fs::remove_file(&tmp).ok();
            return Err(DownloadError::TooManyPages {
                pages,
                max: self.max_pages,
            });
        }

        if output.exists() {
            fs::remove_file(output)?;
        }
        fs::rename(&tmp, output)?;

        Ok(DownloadOutcome {
            pdf_url,
            path: output.to_path_buf(),
            pages,
            size_mb,
        })
    }

    /// Downloads the best candidate per year, newest year first. Candidates
    /// are tried in discovery order until one is accepted; an existing file
    /// is left alone.
    pub async fn download_company(
        &self,
        company: &Company,
        candidates: &[ReportCandidate],
        storage: &StorageManager,
    ) -> CompanySummary {
        let mut by_year: BTreeMap<i32, Vec<&ReportCandidate>> = BTreeMap::new();
        for candidate in candidates {
            by_year.entry(candidate.year).or_default().push(candidate);
        }

        let mut downloads = Vec::new();
        for (index, (&year, year_candidates)) in by_year.iter().rev().enumerate() {
            if index > 0 && !self.year_pause.is_zero() {
                tokio::time::sleep(self.year_pause).await;
            }

            let output = storage.report_path(&company.cid, year);
            if output.exists() {
                tracing::info!("{}: Already exists, skipping", year);
                downloads.push(DownloadRecord::skipped(year));
                continue;
            }

            let mut last_error = String::from("no candidates");
            let mut record = None;
            for (i, candidate) in year_candidates.iter().enumerate() {
                tracing::info!(
                    "  [{}] Trying candidate {}/{}: {}",
                    year,
                    i + 1,
                    year_candidates.len(),
                    candidate.title
                );
                match self.download_pdf(&candidate.url, &output, Some(year)).await {
                    Ok(outcome) => {
                        tracing::info!("    Downloaded: {} pages, {:.1} MB", outcome.pages, outcome.size_mb);
                        record = Some(DownloadRecord::success(candidate, &outcome));
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("    Download failed: {}", e);
                        last_error = e.to_string();
                    }
                }
            }

            match (record, year_candidates.first()) {
                (Some(record), _) => downloads.push(record),
                (None, Some(first)) => {
                    tracing::warn!(
                        "  [{}] All {} candidate(s) failed - no valid report downloaded",
                        year,
                        year_candidates.len()
                    );
                    downloads.push(DownloadRecord::failed(first, last_error));
                }
                (None, None) => {}
            }
        }

        let summary = CompanySummary::new(company, candidates.len(), downloads);
        tracing::info!(
            "Summary: {} downloaded, {} skipped, {} failed",
            summary.downloaded,
            summary.skipped,
            summary.failed
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpSettings;
    use crate::discovery::DiscoveryMethod;
    use crate::validation::pdf::sample_pdf;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn downloader(min_pages: usize, max_pages: usize) -> Downloader {
        let client = HttpClient::new(&HttpSettings::default()).unwrap();
        let download = DownloadSettings {
            max_retries: 2,
            retry_pause_ms: 0,
            year_pause_ms: 0,
            ..DownloadSettings::default()
        };
        let validation = ValidationSettings {
            min_pages,
            max_pages,
            ..ValidationSettings::default()
        };
        Downloader::new(client, &download, &validation)
    }

    fn company() -> Company {
        Company {
            cid: "C9".to_string(),
            name: "Example AB".to_string(),
            ir_url: None,
            validated: true,
        }
    }

    fn candidate(year: i32, url: String) -> ReportCandidate {
        ReportCandidate::new(&company(), year, &url, "Annual Report", "https://example.com/ir", DiscoveryMethod::IrPage)
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("report_fetcher_download_{}", uuid::Uuid::new_v4()))
    }

    async fn mount_pdf(server: &MockServer, route: &str, pages: usize) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sample_pdf(pages, "Example AB"), "application/pdf"))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_resolve_pdf_url_from_landing_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reports/2023"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"<a href="/files/annual-report-2022.pdf">Annual report 2022 (PDF)</a>
                   <a href="/files/annual-report-2023.pdf">Annual report 2023 (PDF)</a>"#,
                "text/html",
            ))
            .mount(&server)
            .await;

        let dl = downloader(1, 500);
        let resolved = dl
            .resolve_pdf_url(&format!("{}/reports/2023", server.uri()), Some(2023))
            .await
            .unwrap();
        assert_eq!(resolved, format!("{}/files/annual-report-2023.pdf", server.uri()));

        let direct = format!("{}/files/report.PDF?download=1", server.uri());
        assert_eq!(dl.resolve_pdf_url(&direct, None).await.unwrap(), direct);
    }

    #[tokio::test]
    async fn test_resolve_pdf_url_without_link() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/news"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<p>No files</p>", "text/html"))
            .mount(&server)
            .await;

        let err = downloader(1, 500)
            .resolve_pdf_url(&format!("{}/news", server.uri()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::NoPdfLink(_)));
    }

    #[tokio::test]
    async fn test_download_pdf_writes_file() {
        let server = MockServer::start().await;
        mount_pdf(&server, "/ar-2023.pdf", 12).await;

        let dir = temp_dir();
        let output = dir.join("C9").join("annual_report_2023.pdf");
        let outcome = downloader(10, 500)
            .download_pdf(&format!("{}/ar-2023.pdf", server.uri()), &output, Some(2023))
            .await
            .unwrap();

        assert_eq!(outcome.pages, 12);
        assert!(output.exists());
        assert!(!temp_path(&output).exists(), "temporary file is renamed");
        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_download_pdf_rejects_short_documents() {
        let server = MockServer::start().await;
        mount_pdf(&server, "/flyer.pdf", 3).await;

        let dir = temp_dir();
        let output = dir.join("annual_report_2023.pdf");
        let err = downloader(10, 500)
            .download_pdf(&format!("{}/flyer.pdf", server.uri()), &output, None)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::TooFewPages { pages: 3, min: 10 }));
        assert!(!output.exists());
        assert!(!temp_path(&output).exists());
        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_download_pdf_rejects_long_documents_before_rename() {
        let server = MockServer::start().await;
        mount_pdf(&server, "/bundle.pdf", 30).await;

        let dir = temp_dir();
        let output = dir.join("annual_report_2023.pdf");
        let err = downloader(10, 20)
            .download_pdf(&format!("{}/bundle.pdf", server.uri()), &output, None)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::TooManyPages { pages: 30, max: 20 }));
        assert!(!output.exists());
        assert!(!temp_path(&output).exists());
        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_download_pdf_retries_then_gives_up_on_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blocked.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<html>captcha</html>", "text/html"))
            .expect(2)
            .mount(&server)
            .await;

        let dir = temp_dir();
        let err = downloader(1, 500)
            .download_pdf(&format!("{}/blocked.pdf", server.uri()), &dir.join("x.pdf"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Fetch(FetchError::NotPdf { .. })));
    }

    #[tokio::test]
    async fn test_download_company_falls_back_and_skips_existing() {
        let server = MockServer::start().await;
        mount_pdf(&server, "/huge-2023.pdf", 30).await;
        mount_pdf(&server, "/good-2023.pdf", 12).await;

        let dir = temp_dir();
        let storage = StorageManager::new(dir.join("companies"), dir.join("validated")).unwrap();
        let existing = storage.report_path("C9", 2022);
        fs::create_dir_all(existing.parent().unwrap()).unwrap();
        fs::write(&existing, b"%PDF-1.5").unwrap();

        let candidates = vec![
            candidate(2023, format!("{}/huge-2023.pdf", server.uri())),
            candidate(2023, format!("{}/good-2023.pdf", server.uri())),
            candidate(2022, format!("{}/unused-2022.pdf", server.uri())),
            candidate(2021, format!("{}/missing-2021.pdf", server.uri())),
        ];
        let summary = downloader(10, 20).download_company(&company(), &candidates, &storage).await;

        assert_eq!(summary.found, 4);
        assert_eq!((summary.downloaded, summary.skipped, summary.failed), (1, 1, 1));
        let years: Vec<(i32, DownloadStatus)> = summary.downloads.iter().map(|d| (d.year, d.status)).collect();
        assert_eq!(
            years,
            vec![
                (2023, DownloadStatus::Success),
                (2022, DownloadStatus::Skipped),
                (2021, DownloadStatus::Failed),
            ]
        );
        assert!(summary.downloads[0].url.as_deref().unwrap().ends_with("/good-2023.pdf"));
        assert_eq!(summary.downloads[0].pages, Some(12));
        assert!(summary.downloads[2].error.as_deref().unwrap().contains("404"));
        assert!(storage.report_path("C9", 2023).exists());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_summary_json_shape() {
        let summary = CompanySummary::errored(&company(), "HTTP 403".to_string(), "download_error");
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["cid"], "C9");
        assert_eq!(json["found"], 0);
        assert_eq!(json["error_type"], "download_error");

        let record = serde_json::to_value(DownloadRecord::skipped(2020)).unwrap();
        assert_eq!(record, serde_json::json!({"year": 2020, "status": "skipped", "reason": "already_exists"}));
    }
}
