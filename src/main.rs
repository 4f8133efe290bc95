// src/main.rs
mod company;
mod config;
mod coverage;
mod diagnose;
mod discovery;
mod download;
mod http;
mod names;
mod storage;
mod utils;
mod validation;

use clap::{Parser, Subcommand};
use company::{Company, CompanyMaster};
use config::Settings;
use coverage::CoverageTable;
use discovery::ir_search::IrSearch;
use discovery::ReportFinder;
use download::{CompanySummary, Downloader};
use http::HttpClient;
use std::collections::HashSet;
use std::path::PathBuf;
use storage::StorageManager;
use utils::error::DiscoveryError;
use utils::AppError;
use validation::{PdfValidator, ValidationRecord, ValidationResult};

/// Finds, downloads and validates company annual reports
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration (defaults apply when missing)
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    /// Debug mode - save annotated HTML snapshots of crawled pages
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search IR URLs for companies not yet validated and write them back
    FindIr,
    /// Run report discovery and print the candidates
    Discover {
        /// Only this company
        #[arg(long)]
        cid: Option<String>,
    },
    /// Discover and download reports for validated companies
    Download {
        /// Only this company
        #[arg(long)]
        cid: Option<String>,
    },
    /// Validate downloaded PDFs and update the coverage table
    Validate,
    /// Rebuild the coverage table from the latest download summary
    Coverage,
    /// Check connectivity to each company's IR URL
    Diagnose,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging();

    // 2. Parse CLI arguments and load settings
    let cli = Cli::parse();
    tracing::info!("Starting with args: {:?}", cli);
    let settings = Settings::load(&cli.config)?;

    // 3. Shared HTTP client and company master
    let client = HttpClient::new(&settings.http)?;
    let master = CompanyMaster::load(&settings.paths.master)?;

    // 4. Dispatch
    match cli.command {
        Command::FindIr => find_ir(&settings, client, master).await,
        Command::Discover { cid } => {
            let companies = select_companies(&master, cid.as_deref(), false)?;
            let finder = report_finder(&settings, client, cli.debug);
            for company in companies {
                match finder.find_reports(&company, &settings.project.target_years).await {
                    Ok(candidates) => {
                        tracing::info!("{} ({}): {} candidates", company.name, company.cid, candidates.len());
                        for c in candidates {
                            println!("{}\t{}\t{}\t{}\t{}%\t{}", c.cid, c.year, c.method, c.url, c.score, c.title);
                        }
                    }
                    Err(e) => tracing::warn!("{} ({}): {}", company.name, company.cid, e),
                }
            }
            Ok(())
        }
        Command::Download { cid } => {
            let finder = report_finder(&settings, client.clone(), cli.debug);
            let downloader = Downloader::new(client.clone(), &settings.download, &settings.validation);
            download(&settings, &finder, &downloader, &master, cid.as_deref(), client.agent_count()).await
        }
        Command::Validate => validate(&settings, &master),
        Command::Coverage => {
            let Some(path) = storage::latest_download_summary(&settings.paths.summary_dir)? else {
                return Err(AppError::Processing(format!(
                    "No download summary found in {}",
                    settings.paths.summary_dir.display()
                )));
            };
            let summaries = storage::load_download_summary(&path)?;
            tracing::info!("Building coverage table from {}", path.display());
            let table = update_coverage(&settings, &master, &summaries, client.agent_count())?;
            for (status, count) in table.status_counts() {
                tracing::info!("  {}: {}", status, count);
            }
            Ok(())
        }
        Command::Diagnose => {
            let companies = master.companies();
            let results = diagnose::diagnose_companies(&client, &companies).await;
            println!("\nConnection diagnostics ({} companies)", results.len());
            for (kind, count) in diagnose::summarize(&results) {
                println!("  {:<24} {}", kind, count);
            }
            Ok(())
        }
    }
}

/// Companies to process: one CID, or every company (validated ones only
/// when `validated_only`).
fn select_companies(master: &CompanyMaster, cid: Option<&str>, validated_only: bool) -> Result<Vec<Company>, AppError> {
    match cid {
        Some(cid) => master
            .find(cid)
            .map(|c| vec![c])
            .ok_or_else(|| AppError::Processing(format!("Unknown CID {}", cid))),
        None => Ok(master
            .companies()
            .into_iter()
            .filter(|c| !validated_only || c.validated)
            .collect()),
    }
}

fn report_finder(settings: &Settings, client: HttpClient, debug: bool) -> ReportFinder {
    let mut finder = ReportFinder::new(client, &settings.download);
    if debug {
        finder = finder.with_debug_dir(settings.paths.debug_dir.clone());
    }
    #[cfg(feature = "browser")]
    {
        finder = finder.with_renderer(std::sync::Arc::new(discovery::browser::ChromeRenderer::new()));
    }
    finder
}

async fn find_ir(settings: &Settings, client: HttpClient, mut master: CompanyMaster) -> Result<(), AppError> {
    let search = IrSearch::new(client).with_max_retries(settings.download.max_retries);
    let pending: Vec<Company> = master.companies().into_iter().filter(|c| !c.validated).collect();
    tracing::info!("Searching IR URLs for {} unvalidated companies", pending.len());

    let mut updated = 0;
    for (i, company) in pending.iter().enumerate() {
        tracing::info!("[{}/{}] {} ({})", i + 1, pending.len(), company.name, company.cid);
        match search.find_ir_url(&company.name).await {
            Some(found) => {
                tracing::info!("  -> {} (score {})", found.url, found.score);
                if master.set_ir_url(&company.cid, &found.url) {
                    updated += 1;
                }
            }
            None => tracing::warn!("  No IR URL found for {}", company.name),
        }
    }

    master.save(&settings.paths.master)?;
    tracing::info!("Updated {} of {} companies", updated, pending.len());
    Ok(())
}

async fn download(
    settings: &Settings,
    finder: &ReportFinder,
    downloader: &Downloader,
    master: &CompanyMaster,
    cid: Option<&str>,
    agent_count: usize,
) -> Result<(), AppError> {
    let companies = select_companies(master, cid, true)?;
    let storage = StorageManager::new(&settings.paths.companies_dir, &settings.paths.validated_dir)?;
    let years = &settings.project.target_years;

    let mut summaries = Vec::with_capacity(companies.len());
    for (i, company) in companies.iter().enumerate() {
        tracing::info!("[{}/{}] Processing {} ({})", i + 1, companies.len(), company.name, company.cid);
        let summary = match finder.find_reports(company, years).await {
            Ok(candidates) => downloader.download_company(company, &candidates, &storage).await,
            Err(e) => discovery_failure_summary(company, e),
        };
        tracing::info!(
            "  {} downloaded, {} skipped, {} failed",
            summary.downloaded, summary.skipped, summary.failed
        );
        summaries.push(summary);
    }

    // Companies outside this run keep their entries from the previous summary
    let previous = match storage::latest_download_summary(&settings.paths.summary_dir)? {
        Some(path) => storage::load_download_summary(&path).unwrap_or_else(|e| {
            tracing::warn!("Ignoring unreadable download summary {}: {}", path.display(), e);
            Vec::new()
        }),
        None => Vec::new(),
    };
    let merged = storage::merge_summaries(previous, &summaries);
    storage::save_download_summary(&settings.paths.summary_dir, &merged)?;
    update_coverage(settings, master, &summaries, agent_count)?;

    let downloaded: usize = summaries.iter().map(|s| s.downloaded).sum();
    tracing::info!("Processing finished. {} reports downloaded for {} companies", downloaded, summaries.len());
    Ok(())
}

/// A company whose discovery found nothing is a normal outcome; any other
/// discovery failure is recorded as an error.
fn discovery_failure_summary(company: &Company, err: DiscoveryError) -> CompanySummary {
    match err {
        e @ DiscoveryError::Exhausted { .. } => {
            tracing::warn!("{}", e);
            CompanySummary::new(company, 0, Vec::new())
        }
        e => {
            tracing::error!("Discovery failed for {}: {}", company.name, e);
            CompanySummary::errored(company, e.to_string(), "download_error")
        }
    }
}

/// Rebuilds the rows of the companies in `summaries` and folds them into the
/// existing coverage table.
fn update_coverage(
    settings: &Settings,
    master: &CompanyMaster,
    summaries: &[CompanySummary],
    agent_count: usize,
) -> Result<CoverageTable, AppError> {
    let mut table = if settings.paths.coverage.exists() {
        CoverageTable::load(&settings.paths.coverage)?
    } else {
        CoverageTable::default()
    };
    let date = chrono::Local::now().format("%Y-%m-%d").to_string();
    table.merge(CoverageTable::from_summaries(
        summaries,
        master,
        &settings.project.target_years,
        &date,
        agent_count,
    ));
    table.save(&settings.paths.coverage)?;
    Ok(table)
}

fn validate(settings: &Settings, master: &CompanyMaster) -> Result<(), AppError> {
    let storage = StorageManager::new(&settings.paths.companies_dir, &settings.paths.validated_dir)?;
    let validator = PdfValidator::new(&settings.validation);
    let mut table = if settings.paths.coverage.exists() {
        Some(CoverageTable::load(&settings.paths.coverage)?)
    } else {
        tracing::warn!("No coverage table at {}, validating without it", settings.paths.coverage.display());
        None
    };
    let completed: HashSet<(String, i32)> = table.as_ref().map(|t| t.completed()).unwrap_or_default();

    let reports = storage.scan_reports()?;
    tracing::info!("Found {} downloaded reports", reports.len());
    let date = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

    let mut records = Vec::new();
    for report in &reports {
        if completed.contains(&(report.cid.clone(), report.year)) {
            tracing::debug!("Skipping {} {} (already validated)", report.cid, report.year);
            continue;
        }
        let company = master.find(&report.cid);
        let name = company.as_ref().map(|c| c.name.clone()).unwrap_or_else(|| report.cid.clone());
        let ir_url = company.and_then(|c| c.ir_url).unwrap_or_default();

        let result = validator
            .validate(&report.path, &name, report.year)
            .unwrap_or_else(|e| {
                tracing::error!("Validation error for {}: {}", report.path.display(), e);
                ValidationResult::failed(format!("Validation error: {}", e))
            });

        if result.valid {
            tracing::info!("✓ {} {}: {}% confidence", report.cid, report.year, result.confidence);
            storage.copy_validated(report)?;
        } else {
            tracing::warn!("✗ {} {}: {}", report.cid, report.year, result.issues.join("; "));
        }
        records.push(ValidationRecord::new(report, &name, &ir_url, &result, &date));
    }

    storage::save_validation_results(&settings.paths.validation_results, &records)?;

    if let Some(table) = table.as_mut() {
        let (passed, failed) = table.apply_validation(&records);
        table.save(&settings.paths.coverage)?;
        tracing::info!("Coverage updated: {} passed, {} failed validation", passed, failed);
        for (priority, count) in table.priority_counts() {
            tracing::info!("  {}: {}", priority, count);
        }
    }
    Ok(())
}
