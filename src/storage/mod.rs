// src/storage/mod.rs
use crate::download::CompanySummary;
use crate::utils::error::StorageError;
use crate::validation::ValidationRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

static FILE_YEAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})").expect("Failed to compile FILE_YEAR_RE")
});

const SUMMARY_PREFIX: &str = "download_summary_";

/// A downloaded report found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredReport {
    pub cid: String,
    pub year: i32,
    pub path: PathBuf,
    pub file_name: String,
}

/// Owns the on-disk layout: `<companies>/<CID>/annual_report_<YEAR>.pdf`
/// plus validated copies under the same structure.
pub struct StorageManager {
    base_dir: PathBuf,
    validated_dir: PathBuf,
}

impl StorageManager {
    /// Creates a new StorageManager, creating the download directory if needed
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(base_dir: P, validated_dir: Q) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(StorageError::IoError)?;
        }

        Ok(Self {
            base_dir: base_path,
            validated_dir: validated_dir.as_ref().to_path_buf(),
        })
    }

    /// Where the report for a company and year is stored.
    pub fn report_path(&self, cid: &str, year: i32) -> PathBuf {
        self.base_dir
            .join(cid)
            .join(format!("annual_report_{}.pdf", year))
    }

    pub fn validated_path(&self, report: &StoredReport) -> PathBuf {
        self.validated_dir.join(&report.cid).join(&report.file_name)
    }

    /// All downloaded PDFs, one directory per company, ordered by CID and year.
    pub fn scan_reports(&self) -> Result<Vec<StoredReport>, StorageError> {
        let mut reports = Vec::new();
        if !self.base_dir.exists() {
            return Ok(reports);
        }

        for entry in fs::read_dir(&self.base_dir).map_err(StorageError::IoError)? {
            let company_dir = entry.map_err(StorageError::IoError)?.path();
            if !company_dir.is_dir() {
                continue;
            }
            let cid = company_dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            for file in fs::read_dir(&company_dir).map_err(StorageError::IoError)? {
                let path = file.map_err(StorageError::IoError)?.path();
                let is_pdf = path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                    .unwrap_or(false);
                if !is_pdf {
                    continue;
                }
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                let Some(year) = FILE_YEAR_RE
                    .captures(&file_name)
                    .and_then(|caps| caps[1].parse::<i32>().ok())
                else {
                    tracing::debug!("No year in file name {}, skipping", file_name);
                    continue;
                };
                reports.push(StoredReport {
                    cid: cid.clone(),
                    year,
                    path,
                    file_name,
                });
            }
        }

        reports.sort_by(|a, b| a.cid.cmp(&b.cid).then(a.year.cmp(&b.year)));
        Ok(reports)
    }

    /// Copies a report into the validated tree.
    pub fn copy_validated(&self, report: &StoredReport) -> Result<PathBuf, StorageError> {
        let target = self.validated_path(report);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(StorageError::IoError)?;
        }
        fs::copy(&report.path, &target).map_err(StorageError::IoError)?;
        tracing::info!("Copied validated report to {}", target.display());
        Ok(target)
    }
}

/// Writes a `download_summary_<timestamp>.json` file into `dir`.
pub fn save_download_summary(dir: &Path, summaries: &[CompanySummary]) -> Result<PathBuf, StorageError> {
    fs::create_dir_all(dir).map_err(StorageError::IoError)?;
    let file_name = format!(
        "{}{}.json",
        SUMMARY_PREFIX,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let file_path = dir.join(file_name);

    let json = serde_json::to_string_pretty(summaries)
        .map_err(|e| StorageError::SerializationError(e.to_string()))?;
    fs::write(&file_path, json).map_err(StorageError::IoError)?;

    tracing::info!("Saved download summary to {}", file_path.display());
    Ok(file_path)
}

/// Most recent download summary in `dir`. Timestamped names sort
/// chronologically.
pub fn latest_download_summary(dir: &Path) -> Result<Option<PathBuf>, StorageError> {
    if !dir.exists() {
        return Ok(None);
    }
    let mut summaries: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(StorageError::IoError)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .map(|n| n.starts_with(SUMMARY_PREFIX) && n.ends_with(".json"))
                .unwrap_or(false)
        })
        .collect();
    summaries.sort();
    Ok(summaries.pop())
}

pub fn load_download_summary(path: &Path) -> Result<Vec<CompanySummary>, StorageError> {
    let raw = fs::read_to_string(path).map_err(StorageError::IoError)?;
    serde_json::from_str(&raw).map_err(|e| StorageError::SerializationError(format!("{}: {}", path.display(), e)))
}

/// Folds this run's summaries into the previous ones: a company processed
/// again replaces its earlier entry, new companies are appended.
pub fn merge_summaries(previous: Vec<CompanySummary>, current: &[CompanySummary]) -> Vec<CompanySummary> {
    let mut merged = previous;
    for summary in current {
        match merged.iter_mut().find(|s| s.cid == summary.cid) {
            Some(existing) => *existing = summary.clone(),
            None => merged.push(summary.clone()),
        }
    }
    merged
}

/// Writes `validation_results.csv` (comma separated).
pub fn save_validation_results(path: &Path, records: &[ValidationRecord]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(StorageError::IoError)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush().map_err(StorageError::IoError)?;
    tracing::info!("Saved {} validation results to {}", records.len(), path.display());
    Ok(())
}
