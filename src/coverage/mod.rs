// src/coverage/mod.rs
//! The coverage table: one row per (company, target year) tracking how far
//! capture got and whether the result passed validation.
use crate::company::CompanyMaster;
use crate::discovery::scorer::classify_report_type;
use crate::download::{CompanySummary, DownloadRecord, DownloadStatus};
use crate::utils::error::StorageError;
use crate::validation::ValidationRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

pub const PRIORITY_COMPLETE: &str = "Complete ✓";
pub const PRIORITY_NEEDS_WORK: &str = "Needs Work ⚠";
pub const PRIORITY_PENDING: &str = "Pending Validation";
pub const PRIORITY_NOT_DOWNLOADED: &str = "Not Downloaded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Milestone {
    Pass,
    Failed,
    Skipped,
    NotAttempted,
    Unknown,
}

impl Milestone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Milestone::Pass => "Pass",
            Milestone::Failed => "Failed",
            Milestone::Skipped => "Skipped",
            Milestone::NotAttempted => "Not Attempted",
            Milestone::Unknown => "Unknown",
        }
    }
}

/// Connection, find, download and validation milestones for a capture
/// status.
fn milestones(status: &str) -> [Milestone; 4] {
    use Milestone::*;
    match status {
        "Error" => [Failed, NotAttempted, NotAttempted, NotAttempted],
        "Success" => [Pass, Pass, Pass, Pass],
        "Skipped" => [Pass, Pass, Skipped, Skipped],
        "Failed" => [Pass, Pass, Failed, NotAttempted],
        "Not Found" => [Pass, Failed, NotAttempted, NotAttempted],
        _ => [Pass, Unknown, Unknown, Unknown],
    }
}

/// Priority follows from capture and validation status; it is never set on
/// its own.
pub fn derive_priority(capture_status: &str, validation_status: &str) -> &'static str {
    match validation_status {
        "Valid" => PRIORITY_COMPLETE,
        "Invalid" => PRIORITY_NEEDS_WORK,
        _ => match capture_status {
            "Success" | "Skipped" | "Downloaded" => PRIORITY_PENDING,
            _ => PRIORITY_NOT_DOWNLOADED,
        },
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CoverageRow {
    #[serde(rename = "CompanyName")]
    pub company_name: String,
    #[serde(rename = "Company_Identifier")]
    pub cid: String,
    #[serde(rename = "What_to_capture")]
    pub what_to_capture: String,
    #[serde(rename = "FiscalYear")]
    pub fiscal_year: i32,
    #[serde(rename = "IR_URL")]
    pub ir_url: String,
    #[serde(rename = "Capture_attempt_date")]
    pub capture_attempt_date: String,
    #[serde(rename = "AgentId")]
    pub agent_id: String,
    #[serde(rename = "CaptureStatus")]
    pub capture_status: String,
    #[serde(rename = "CaptureStatusDetails")]
    pub capture_status_details: String,
    #[serde(rename = "milestone1_Establish_Connection")]
    pub milestone_connection: String,
    #[serde(rename = "milestone2_Find_object_to_capture")]
    pub milestone_find: String,
    #[serde(rename = "milestone3_download_object")]
    pub milestone_download: String,
    #[serde(rename = "Milestone4_object_passed_validation")]
    pub milestone_validation: String,
    #[serde(rename = "Report_URL")]
    pub report_url: String,
    #[serde(rename = "Source_Page")]
    pub source_page: String,
    #[serde(rename = "Pages")]
    pub pages: String,
    #[serde(rename = "Size_MB")]
    pub size_mb: String,
    #[serde(rename = "Probability_Annual_Report")]
    pub probability: String,
    #[serde(rename = "Document_Type")]
    pub document_type: String,
    #[serde(rename = "Classification_Reasoning")]
    pub classification_reasoning: String,
    #[serde(rename = "User_Agent_Used")]
    pub user_agent_used: String,
    #[serde(rename = "Validation_Status", default)]
    pub validation_status: String,
    #[serde(rename = "Validation_Confidence", default)]
    pub validation_confidence: String,
    #[serde(rename = "Validation_Issues", default)]
    pub validation_issues: String,
    #[serde(rename = "Validation_Date", default)]
    pub validation_date: String,
    #[serde(rename = "Priority", default)]
    pub priority: String,
    #[serde(rename = "Failure_Reason", default)]
    pub failure_reason: String,
}

impl CoverageRow {
    fn set_status(&mut self, status: &str, details: String) {
        let [connection, find, download, validation] = milestones(status);
        self.capture_status = status.to_string();
        self.capture_status_details = details;
        self.milestone_connection = connection.as_str().to_string();
        self.milestone_find = find.as_str().to_string();
        self.milestone_download = download.as_str().to_string();
        self.milestone_validation = validation.as_str().to_string();
    }

    fn apply_download(&mut self, record: &DownloadRecord) {
        match record.status {
            DownloadStatus::Success => {
                self.set_status("Success", "Successfully downloaded".to_string());
                let url = record.url.clone().unwrap_or_default();
                let title = record.title.clone().unwrap_or_default();
                let assessment = classify_report_type(&title, &url, record.pages);
                self.report_url = url;
                if let Some(source) = &record.source_page {
                    self.source_page = source.clone();
                }
                self.pages = record.pages.map(|p| p.to_string()).unwrap_or_default();
                self.size_mb = record.size_mb.map(|s| format!("{:.2}", s)).unwrap_or_default();
                self.probability = format!("{:.2}%", assessment.probability * 100.0);
                self.document_type = assessment.document_type;
                self.classification_reasoning = assessment.reasoning;
            }
            DownloadStatus::Skipped => {
                self.set_status(
                    "Skipped",
                    record.reason.clone().unwrap_or_else(|| "Already exists".to_string()),
                );
                self.report_url = "Already downloaded".to_string();
                self.document_type = "Previously Downloaded".to_string();
                self.classification_reasoning = "Skipped (file already exists)".to_string();
            }
            DownloadStatus::Failed => {
                let error = record.error.clone().unwrap_or_else(|| "Download failed".to_string());
                self.set_status("Failed", error.clone());
                self.report_url = record.url.clone().unwrap_or_default();
                if let Some(source) = &record.source_page {
                    self.source_page = source.clone();
                }
                self.probability = format!("{:.2}%", 0.0);
                self.document_type = "Failed".to_string();
                self.classification_reasoning = error;
            }
        }
    }

    fn apply_validation(&mut self, record: &ValidationRecord) {
        self.validation_status = if record.valid { "Valid" } else { "Invalid" }.to_string();
        self.validation_confidence = format!("{}%", record.confidence);
        self.validation_issues = record.issues.clone();
        self.validation_date = record.validated_date.clone();

        if record.valid {
            self.milestone_validation = Milestone::Pass.as_str().to_string();
            if self.capture_status != "Downloaded" {
                self.capture_status = "Downloaded".to_string();
                self.capture_status_details = format!(
                    "Successfully validated: {} pages, {}% confidence",
                    record.pages, record.confidence
                );
            }
            self.failure_reason.clear();
        } else {
            self.milestone_validation = Milestone::Failed.as_str().to_string();
            self.capture_status = "Validation Failed".to_string();
            self.capture_status_details = format!("Validation failed: {}", record.issues);
            self.failure_reason = format!("Validation failed: {}", record.issues);
        }
    }

    /// A skipped download leaves the file from an earlier run in place, so
    /// that run's validation verdict still describes it.
    fn carry_validation(&mut self, previous: &CoverageRow) {
        if self.capture_status != "Skipped" || previous.validation_status.is_empty() {
            return;
        }
        self.capture_status = previous.capture_status.clone();
        self.capture_status_details = previous.capture_status_details.clone();
        self.milestone_validation = previous.milestone_validation.clone();
        self.validation_status = previous.validation_status.clone();
        self.validation_confidence = previous.validation_confidence.clone();
        self.validation_issues = previous.validation_issues.clone();
        self.validation_date = previous.validation_date.clone();
        self.failure_reason = previous.failure_reason.clone();
    }

    fn refresh_priority(&mut self) {
        self.priority = derive_priority(&self.capture_status, &self.validation_status).to_string();
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoverageTable {
    rows: Vec<CoverageRow>,
}

impl CoverageTable {
    /// Builds rows for every company in `summaries` and every target year.
    pub fn from_summaries(
        summaries: &[CompanySummary],
        master: &CompanyMaster,
        years: &[i32],
        date: &str,
        user_agents: usize,
    ) -> Self {
        let mut rows = Vec::new();
        for summary in summaries {
            let ir_url = master
                .find(&summary.cid)
                .and_then(|c| c.ir_url)
                .unwrap_or_default();

            for &year in years {
                let mut row = CoverageRow {
                    company_name: summary.company.clone(),
                    cid: summary.cid.clone(),
                    what_to_capture: "Annual report".to_string(),
                    fiscal_year: year,
                    ir_url: ir_url.clone(),
                    capture_attempt_date: date.to_string(),
                    agent_id: "A1".to_string(),
                    source_page: ir_url.clone(),
                    user_agent_used: format!("Rotated ({} variants)", user_agents),
                    ..CoverageRow::default()
                };

                if let Some(error) = &summary.error {
                    row.set_status("Error", error.clone());
                    row.source_page.clear();
                    row.probability = format!("{:.2}%", 0.0);
                    row.document_type = "N/A".to_string();
                    row.classification_reasoning = error.clone();
                } else if let Some(record) = summary.downloads.iter().find(|d| d.year == year) {
                    row.apply_download(record);
                } else {
                    row.set_status("Not Found", "Report not found during search".to_string());
                    row.probability = format!("{:.2}%", 0.0);
                    row.document_type = "Not Found".to_string();
                    row.classification_reasoning = "No report found for this year".to_string();
                }
                row.refresh_priority();
                rows.push(row);
            }
        }
        Self { rows }
    }

    /// Loads a tab-separated coverage table.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(path.as_ref())?;
        let rows = reader
            .deserialize()
            .collect::<Result<Vec<CoverageRow>, csv::Error>>()?;
        Ok(Self { rows })
    }

    /// Writes the table as TSV. Priorities are re-derived on the way out.
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<(), StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path)?;
        for row in self.rows.iter_mut() {
            row.refresh_priority();
            writer.serialize(&*row)?;
        }
        writer.flush()?;
        tracing::info!("Coverage table updated: {} ({} records)", path.display(), self.rows.len());
        Ok(())
    }

    /// Replaces every row of `cid` with `rows`, keeping the company's
    /// position in the table. Other companies are untouched.
    pub fn replace_company(&mut self, cid: &str, mut rows: Vec<CoverageRow>) {
        for row in rows.iter_mut() {
            if let Some(previous) = self
                .rows
                .iter()
                .find(|old| old.cid == cid && old.fiscal_year == row.fiscal_year)
            {
                row.carry_validation(previous);
            }
            row.refresh_priority();
        }

        let at = self.rows.iter().position(|row| row.cid == cid);
        self.rows.retain(|row| row.cid != cid);
        match at {
            Some(index) => {
                self.rows.splice(index..index, rows);
            }
            None => self.rows.extend(rows),
        }
    }

    /// Folds a freshly built table into this one, company by company.
    pub fn merge(&mut self, update: CoverageTable) {
        let mut by_company: Vec<(String, Vec<CoverageRow>)> = Vec::new();
        for row in update.rows {
            match by_company.iter_mut().find(|(cid, _)| *cid == row.cid) {
                Some((_, rows)) => rows.push(row),
                None => by_company.push((row.cid.clone(), vec![row])),
            }
        }
        for (cid, rows) in by_company {
            self.replace_company(&cid, rows);
        }
    }

    pub fn rows(&self) -> &[CoverageRow] {
        &self.rows
    }

    /// (CID, year) pairs already validated and complete.
    pub fn completed(&self) -> HashSet<(String, i32)> {
        self.rows
            .iter()
            .filter(|row| row.validation_status == "Valid" && row.priority == PRIORITY_COMPLETE)
            .map(|row| (row.cid.clone(), row.fiscal_year))
            .collect()
    }

    /// Folds validation results into matching rows. Returns (passed, failed).
    pub fn apply_validation(&mut self, records: &[ValidationRecord]) -> (usize, usize) {
        let mut passed = 0;
        let mut failed = 0;
        for row in self.rows.iter_mut() {
            let matching = records
                .iter()
                .find(|r| r.cid == row.cid && r.year == row.fiscal_year);
            if let Some(record) = matching {
                row.apply_validation(record);
                if record.valid {
                    passed += 1;
                } else {
                    failed += 1;
                }
            }
            row.refresh_priority();
        }
        (passed, failed)
    }

    pub fn status_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for row in &self.rows {
            *counts.entry(row.capture_status.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn priority_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for row in &self.rows {
            *counts.entry(row.priority.clone()).or_insert(0) += 1;
        }
        counts
    }
}
